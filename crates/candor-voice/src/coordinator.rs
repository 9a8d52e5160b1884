//! **Interview coordinator**: Runs one turn at a time per session:
//! answer → agent → dedup → synthesis → playback → re-arm capture.
//!
//! Per-session bookkeeping (start token, in-flight flag, chosen voice, reply playback)
//! lives in DashMaps and is checked and set synchronously before the first suspension
//! point of each call.

use crate::capture::{CaptureOutcome, CaptureRegistry, Utterance};
use crate::dedup::ResponseDeduplicator;
use crate::dispatch::{AgentTransport, DispatchOutcome, TurnDispatcher};
use crate::error::{TranscriptionCause, VoiceError, VoiceResult};
use crate::playback::Playback;
use crate::reply::ReplyText;
use crate::tts::{AudioHandle, TtsOrchestrator};
use async_trait::async_trait;
use candor_core::{
    detect_closing, resolve_voice_profile, ClosingSignal, CoreConfig, Directory, FinishOutcome,
    InterviewSession, SessionId, SessionLifecycle, SessionStatus, SessionTeardown, Turn, TurnOutput,
    VoiceProfile,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Sent on the candidate's behalf to make the agent greet and ask the first question.
pub const OPENING_REQUEST: &str = "Start the interview.";

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub transcription_timeout: Duration,
    /// Finish the session as completed when the agent clearly closes the interview.
    pub auto_finish_on_closing: bool,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            transcription_timeout: crate::capture::DEFAULT_TRANSCRIPTION_TIMEOUT,
            auto_finish_on_closing: false,
        }
    }
}

impl From<&CoreConfig> for CoordinatorSettings {
    fn from(config: &CoreConfig) -> Self {
        Self {
            transcription_timeout: config.transcription_timeout(),
            auto_finish_on_closing: config.auto_finish_on_closing,
        }
    }
}

#[derive(Debug, Default)]
struct SessionSlot {
    in_flight: bool,
    profile: Option<VoiceProfile>,
}

/// What a completed turn produced.
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub turn: Turn,
    pub reply: ReplyText,
    /// None when synthesis failed or there was nothing to say.
    pub audio: Option<AudioHandle>,
    pub closing: Option<ClosingSignal>,
    /// Set when the closing reply finished the session.
    pub finished: Option<SessionStatus>,
}

#[derive(Debug, Clone)]
pub enum TurnOutcome {
    Completed(Box<TurnReport>),
    /// The agent reply was a redelivery; no turn was recorded.
    Suppressed,
}

#[derive(Debug, Clone)]
pub enum StartOutcome {
    Started(TurnOutcome),
    /// A start for this session was already accepted.
    AlreadyStarted,
}

#[derive(Debug, Clone)]
pub enum VoiceTurn {
    Answered(TurnOutcome),
    /// Voice failed; collect typed input and call `typed_turn`.
    NeedsText { cause: TranscriptionCause },
}

/// Clears one session's voice-side resources when the lifecycle finishes it.
struct VoiceTeardown {
    captures: Arc<CaptureRegistry>,
    playback: Arc<dyn Playback>,
    dedup: Arc<ResponseDeduplicator>,
    slots: Arc<DashMap<SessionId, SessionSlot>>,
    started: Arc<DashMap<SessionId, ()>>,
    playing: Arc<DashMap<SessionId, CancellationToken>>,
}

#[async_trait]
impl SessionTeardown for VoiceTeardown {
    async fn teardown(&self, session_id: &SessionId) {
        self.captures.remove(session_id);
        if self.playback.is_playing(session_id) {
            self.playback.stop(session_id);
        }
        if let Some((_, reply)) = self.playing.remove(session_id) {
            reply.cancel();
        }
        self.dedup.clear(session_id);
        self.slots.remove(session_id);
        self.started.remove(session_id);
        debug!(session = %session_id, "voice resources released");
    }
}

/// Held for the whole turn. On drop, however the turn ended, it clears the in-flight flag
/// and, once an answer has been taken, readies the session's capture for the next one.
struct TurnGuard<'a> {
    slots: &'a DashMap<SessionId, SessionSlot>,
    captures: &'a CaptureRegistry,
    session_id: &'a SessionId,
    rearm: bool,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut slot) = self.slots.get_mut(self.session_id) {
            slot.in_flight = false;
        }
        if !self.rearm {
            return;
        }
        // Gone when the session finished during the turn.
        if let Some(capture) = self.captures.get(self.session_id) {
            if let Err(e) = capture.rearm() {
                debug!(session = %self.session_id, "capture not re-armed: {}", e);
            }
        }
    }
}

pub struct InterviewCoordinator {
    lifecycle: Arc<SessionLifecycle>,
    directory: Arc<dyn Directory>,
    dispatcher: TurnDispatcher,
    tts: Arc<TtsOrchestrator>,
    playback: Arc<dyn Playback>,
    captures: Arc<CaptureRegistry>,
    slots: Arc<DashMap<SessionId, SessionSlot>>,
    started: Arc<DashMap<SessionId, ()>>,
    /// Replies currently playing; teardown cancels the finishing session's entry only.
    playing: Arc<DashMap<SessionId, CancellationToken>>,
    settings: CoordinatorSettings,
}

impl InterviewCoordinator {
    /// Wire the turn pipeline and register its teardown with the lifecycle.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lifecycle: Arc<SessionLifecycle>,
        directory: Arc<dyn Directory>,
        transport: Arc<dyn AgentTransport>,
        default_endpoint: Option<String>,
        dedup: Arc<ResponseDeduplicator>,
        tts: Arc<TtsOrchestrator>,
        playback: Arc<dyn Playback>,
        captures: Arc<CaptureRegistry>,
        settings: CoordinatorSettings,
    ) -> Self {
        let slots = Arc::new(DashMap::new());
        let started = Arc::new(DashMap::new());
        let playing = Arc::new(DashMap::new());
        lifecycle.register_teardown(Arc::new(VoiceTeardown {
            captures: captures.clone(),
            playback: playback.clone(),
            dedup: dedup.clone(),
            slots: slots.clone(),
            started: started.clone(),
            playing: playing.clone(),
        }));
        let dispatcher = TurnDispatcher::new(transport, default_endpoint, dedup, lifecycle.clone());
        Self {
            lifecycle,
            directory,
            dispatcher,
            tts,
            playback,
            captures,
            slots,
            started,
            playing,
            settings,
        }
    }

    pub fn lifecycle(&self) -> &Arc<SessionLifecycle> {
        &self.lifecycle
    }

    pub fn captures(&self) -> &Arc<CaptureRegistry> {
        &self.captures
    }

    /// Ask the agent to open the interview. Only the first call per session does anything.
    pub async fn start_interview(&self, session_id: &SessionId) -> VoiceResult<StartOutcome> {
        match self.started.entry(session_id.clone()) {
            Entry::Occupied(_) => {
                info!(session = %session_id, "start ignored, interview already started");
                return Ok(StartOutcome::AlreadyStarted);
            }
            Entry::Vacant(slot) => {
                slot.insert(());
            }
        }
        info!(session = %session_id, "starting interview");
        match self.take_turn(session_id, Utterance::system(OPENING_REQUEST)).await {
            Ok(outcome) => Ok(StartOutcome::Started(outcome)),
            Err(e) => {
                // A finished session is rejected by the lifecycle on retry.
                self.started.remove(session_id);
                Err(e)
            }
        }
    }

    /// One full turn for an answer that is already in hand.
    pub async fn take_turn(&self, session_id: &SessionId, utterance: Utterance) -> VoiceResult<TurnOutcome> {
        let mut guard = self.enter_turn(session_id)?;
        guard.rearm = true;
        self.run_turn(session_id, utterance).await
    }

    /// Stop recording, transcribe, and run the turn; or hand back the text-entry fallback.
    pub async fn voice_turn(&self, session_id: &SessionId) -> VoiceResult<VoiceTurn> {
        let mut guard = self.enter_turn(session_id)?;
        let capture = self.captures.controller(session_id);
        let utterance = match capture.capture_utterance(self.settings.transcription_timeout).await? {
            CaptureOutcome::Utterance(utterance) => utterance,
            // Stays in text entry for `typed_turn`.
            CaptureOutcome::NeedsText { cause } => return Ok(VoiceTurn::NeedsText { cause }),
        };
        guard.rearm = true;
        Ok(VoiceTurn::Answered(self.run_turn(session_id, utterance).await?))
    }

    /// Run the turn with a typed answer, abandoning any open capture.
    pub async fn typed_turn(&self, session_id: &SessionId, text: &str) -> VoiceResult<TurnOutcome> {
        let mut guard = self.enter_turn(session_id)?;
        let utterance = self.captures.controller(session_id).submit_manual_text(text)?;
        guard.rearm = true;
        self.run_turn(session_id, utterance).await
    }

    /// The turn body. Callers hold the session's [`TurnGuard`].
    async fn run_turn(&self, session_id: &SessionId, utterance: Utterance) -> VoiceResult<TurnOutcome> {
        let session = self.lifecycle.get(session_id).await?;
        if session.status.is_terminal() {
            return Err(VoiceError::InvalidState(format!(
                "session {} is already {}",
                session_id, session.status
            )));
        }

        let reply = match self.dispatcher.dispatch(&session, &utterance).await? {
            DispatchOutcome::Suppressed => return Ok(TurnOutcome::Suppressed),
            DispatchOutcome::Reply(reply) => reply,
        };

        let audio = match reply.text.text() {
            Some(text) => {
                let profile = self.profile_for(&session).await;
                match self.tts.synthesize(text, &profile).await {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        warn!(session = %session_id, "turn continues without audio: {}", e);
                        None
                    }
                }
            }
            None => None,
        };

        let output = TurnOutput {
            text: reply.text.text().map(str::to_string),
            audio: audio.as_ref().map(AudioHandle::summary),
        };
        let turn = self
            .lifecycle
            .record_turn(session_id, utterance.into(), output)
            .await?;
        debug!(session = %session_id, sequence = turn.sequence, "turn recorded");

        if let Some(handle) = &audio {
            self.play_reply(session_id, handle).await;
        }

        let closing = reply.text.text().and_then(detect_closing);
        let mut finished = None;
        if let Some(signal) = &closing {
            info!(session = %session_id, confidence = signal.confidence, "agent is closing the interview");
            if self.settings.auto_finish_on_closing && signal.should_auto_finish() {
                let done = self.finish_interview(session_id, FinishOutcome::Completed).await?;
                finished = Some(done.status);
            }
        }

        Ok(TurnOutcome::Completed(Box::new(TurnReport {
            turn,
            reply: reply.text,
            audio,
            closing,
            finished,
        })))
    }

    /// Swap the interviewer voice. Rejected while a turn is in flight.
    pub fn set_voice_profile(&self, session_id: &SessionId, profile: VoiceProfile) -> VoiceResult<()> {
        let mut slot = self.slots.entry(session_id.clone()).or_default();
        if slot.in_flight {
            warn!(session = %session_id, "voice change rejected during a turn");
            return Err(VoiceError::InvalidState(
                "cannot change voice while a turn is in flight".to_string(),
            ));
        }
        info!(session = %session_id, voice = %profile.name, "voice profile set");
        slot.profile = Some(profile);
        Ok(())
    }

    pub async fn finish_interview(
        &self,
        session_id: &SessionId,
        outcome: FinishOutcome,
    ) -> VoiceResult<InterviewSession> {
        Ok(self.lifecycle.finish(session_id, outcome).await?)
    }

    /// Play the reply unless the session finished in the meantime. Teardown cuts it short.
    async fn play_reply(&self, session_id: &SessionId, handle: &AudioHandle) {
        let token = CancellationToken::new();
        self.playing.insert(session_id.clone(), token.clone());
        // Registered first: a finish that lands after this check cancels the token instead.
        let live = matches!(self.lifecycle.get(session_id).await, Ok(s) if !s.status.is_terminal());
        if live {
            let played = tokio::select! {
                biased;
                _ = token.cancelled() => Ok(()),
                r = self.playback.play(session_id, handle) => r,
            };
            if let Err(e) = played {
                warn!(session = %session_id, "playback failed: {}", e);
            }
        } else {
            debug!(session = %session_id, "session finished before playback, reply not played");
        }
        self.playing.remove(session_id);
    }

    fn enter_turn<'a>(&'a self, session_id: &'a SessionId) -> VoiceResult<TurnGuard<'a>> {
        let mut slot = self.slots.entry(session_id.clone()).or_default();
        if slot.in_flight {
            warn!(session = %session_id, "turn rejected, another turn is in flight");
            return Err(VoiceError::InvalidState(
                "a turn is already in flight for this session".to_string(),
            ));
        }
        slot.in_flight = true;
        Ok(TurnGuard {
            slots: &self.slots,
            captures: &self.captures,
            session_id,
            rearm: false,
        })
    }

    /// The session's voice, resolved from its job on first use and then kept.
    async fn profile_for(&self, session: &InterviewSession) -> VoiceProfile {
        if let Some(profile) = self.slots.get(&session.id).and_then(|s| s.profile.clone()) {
            return profile;
        }
        let resolved = match self.directory.context(&session.context_id).await {
            Ok(Some(context)) => resolve_voice_profile(&context),
            Ok(None) => VoiceProfile::default(),
            Err(e) => {
                warn!(session = %session.id, "voice lookup failed, using default: {}", e);
                VoiceProfile::default()
            }
        };
        let mut slot = self.slots.entry(session.id.clone()).or_default();
        slot.profile.get_or_insert(resolved).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureState, RecognitionOptions};
    use crate::dispatch::AgentRequest;
    use crate::playback::NullPlayback;
    use crate::scripted::{ScriptedMicrophone, ScriptedRecognizer};
    use crate::tts::tests::ScriptedProvider;
    use crate::tts::{LocalFallbackTts, SpeechProvider};
    use candor_core::{ContextRecord, InMemoryStore, ParticipantRecord, SessionStore, VoicePreset};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::Ordering;

    /// Answers from a queue; the last answer repeats. Optionally waits before answering.
    struct QueueTransport {
        replies: Mutex<VecDeque<String>>,
        delay: Duration,
        calls: Mutex<Vec<AgentRequest>>,
    }

    #[async_trait]
    impl AgentTransport for QueueTransport {
        async fn send(&self, _endpoint: &str, request: &AgentRequest) -> VoiceResult<String> {
            self.calls.lock().push(request.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let mut q = self.replies.lock();
            let reply = if q.len() > 1 { q.pop_front() } else { q.front().cloned() };
            Ok(reply.unwrap_or_default())
        }
    }

    struct Harness {
        coordinator: Arc<InterviewCoordinator>,
        transport: Arc<QueueTransport>,
        playback: Arc<NullPlayback>,
        store: Arc<InMemoryStore>,
        session: InterviewSession,
    }

    async fn harness(replies: &[&str], delay: Duration, settings: CoordinatorSettings) -> Harness {
        let local = vec![Arc::new(LocalFallbackTts::new()) as Arc<dyn SpeechProvider>];
        harness_speaking(replies, delay, settings, local).await
    }

    async fn harness_speaking(
        replies: &[&str],
        delay: Duration,
        settings: CoordinatorSettings,
        providers: Vec<Arc<dyn SpeechProvider>>,
    ) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        store.add_participant(ParticipantRecord {
            id: "cand".into(),
            name: "Meera".into(),
            email: None,
        });
        store.add_context(ContextRecord {
            id: "job".into(),
            title: "Customer Support Specialist".into(),
            department: None,
            agent_endpoint: Some("http://job/agent".into()),
            prefer_indian_accent: false,
        });
        let lifecycle = Arc::new(SessionLifecycle::new(store.clone(), store.clone()));
        let session = lifecycle.create("cand", "job").await.unwrap();
        let transport = Arc::new(QueueTransport {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            delay,
            calls: Mutex::new(Vec::new()),
        });
        let playback = Arc::new(NullPlayback::new());
        let captures = Arc::new(CaptureRegistry::new(
            ScriptedMicrophone::granting(),
            ScriptedRecognizer::replying("I enjoy helping customers.", 0.9),
            RecognitionOptions::default(),
        ));
        let coordinator = Arc::new(InterviewCoordinator::new(
            lifecycle,
            store.clone(),
            transport.clone(),
            None,
            Arc::new(ResponseDeduplicator::default()),
            Arc::new(TtsOrchestrator::new(providers)),
            playback.clone(),
            captures,
            settings,
        ));
        Harness {
            coordinator,
            transport,
            playback,
            store,
            session,
        }
    }

    fn report(outcome: TurnOutcome) -> TurnReport {
        match outcome {
            TurnOutcome::Completed(r) => *r,
            TurnOutcome::Suppressed => panic!("turn was suppressed"),
        }
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let h = harness(&[r#"{"greeting":"Hello Meera!"}"#], Duration::ZERO, Default::default()).await;
        let first = h.coordinator.start_interview(&h.session.id).await.unwrap();
        let StartOutcome::Started(outcome) = first else {
            panic!("expected start");
        };
        let r = report(outcome);
        assert_eq!(r.reply.text(), Some("Hello Meera!"));
        assert_eq!(h.transport.calls.lock()[0].candidate_response, OPENING_REQUEST);

        let second = h.coordinator.start_interview(&h.session.id).await.unwrap();
        assert!(matches!(second, StartOutcome::AlreadyStarted));
        assert_eq!(h.transport.calls.lock().len(), 1);
        // Opening request is not a candidate answer.
        let s = h.coordinator.lifecycle().get(&h.session.id).await.unwrap();
        assert_eq!(s.questions_answered, 0);
        assert_eq!(s.questions_asked, 1);
    }

    #[tokio::test]
    async fn concurrent_starts_dispatch_once() {
        let h = harness(&["Welcome!"], Duration::from_millis(20), Default::default()).await;
        let (a, b) = tokio::join!(
            h.coordinator.start_interview(&h.session.id),
            h.coordinator.start_interview(&h.session.id)
        );
        let started = [a.unwrap(), b.unwrap()]
            .iter()
            .filter(|o| matches!(o, StartOutcome::Started(_)))
            .count();
        assert_eq!(started, 1);
        assert_eq!(h.transport.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn overlapping_turns_are_rejected() {
        let h = harness(&["Q1", "Q2"], Duration::from_millis(20), Default::default()).await;
        let (a, b) = tokio::join!(
            h.coordinator.take_turn(&h.session.id, Utterance::typed("one")),
            h.coordinator.take_turn(&h.session.id, Utterance::typed("two"))
        );
        assert!(a.is_ok());
        assert!(matches!(b, Err(VoiceError::InvalidState(_))));
        // The guard is released afterwards.
        assert!(h
            .coordinator
            .take_turn(&h.session.id, Utterance::typed("three"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn reply_is_synthesized_recorded_and_played() {
        let h = harness(&["Tell me about a difficult customer."], Duration::ZERO, Default::default()).await;
        let r = report(
            h.coordinator
                .typed_turn(&h.session.id, "Hi, I am ready.")
                .await
                .unwrap(),
        );
        let audio = r.audio.expect("audio");
        assert_eq!(audio.provider, "local");
        assert_eq!(h.playback.plays(), 1);
        let turns = h.store.list_turns(&h.session.id).await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].input.text, "Hi, I am ready.");
        assert_eq!(
            turns[0].output.text.as_deref(),
            Some("Tell me about a difficult customer.")
        );
        assert!(turns[0].output.audio.as_ref().unwrap().direct_playback);
    }

    #[tokio::test]
    async fn suppressed_reply_records_nothing() {
        let h = harness(&["Same question"], Duration::ZERO, Default::default()).await;
        h.coordinator
            .take_turn(&h.session.id, Utterance::typed("a"))
            .await
            .unwrap();
        let second = h
            .coordinator
            .take_turn(&h.session.id, Utterance::typed("a"))
            .await
            .unwrap();
        assert!(matches!(second, TurnOutcome::Suppressed));
        assert_eq!(h.store.list_turns(&h.session.id).await.unwrap().len(), 1);
        assert_eq!(h.playback.plays(), 1);
    }

    #[tokio::test]
    async fn voice_turn_uses_transcript_and_rearms() {
        let h = harness(&["Great. Next question."], Duration::ZERO, Default::default()).await;
        let capture = h.coordinator.captures().controller(&h.session.id);
        capture.request_permission().await;
        capture.start_capture().await.unwrap();
        let VoiceTurn::Answered(outcome) = h.coordinator.voice_turn(&h.session.id).await.unwrap() else {
            panic!("expected an answer");
        };
        let r = report(outcome);
        assert_eq!(r.turn.input.text, "I enjoy helping customers.");
        assert_eq!(capture.state(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn capture_is_rearmed_after_a_suppressed_voice_turn() {
        let h = harness(&["Same question"], Duration::ZERO, Default::default()).await;
        let capture = h.coordinator.captures().controller(&h.session.id);
        capture.request_permission().await;

        capture.start_capture().await.unwrap();
        let first = h.coordinator.voice_turn(&h.session.id).await.unwrap();
        assert!(matches!(first, VoiceTurn::Answered(TurnOutcome::Completed(_))));

        capture.start_capture().await.unwrap();
        let second = h.coordinator.voice_turn(&h.session.id).await.unwrap();
        assert!(matches!(second, VoiceTurn::Answered(TurnOutcome::Suppressed)));
        assert_eq!(capture.state(), CaptureState::Idle);

        // The candidate can answer again.
        capture.start_capture().await.unwrap();
        assert_eq!(capture.state(), CaptureState::Recording);
    }

    #[tokio::test]
    async fn voice_turn_during_a_turn_keeps_the_recording() {
        let h = harness(&["Q1", "Q2"], Duration::from_millis(20), Default::default()).await;
        let capture = h.coordinator.captures().controller(&h.session.id);
        capture.request_permission().await;
        capture.start_capture().await.unwrap();

        let (typed, voice) = tokio::join!(
            h.coordinator.take_turn(&h.session.id, Utterance::typed("typed first")),
            h.coordinator.voice_turn(&h.session.id)
        );
        assert!(typed.is_ok());
        assert!(matches!(voice, Err(VoiceError::InvalidState(_))));
        assert_eq!(capture.state(), CaptureState::Recording);

        let VoiceTurn::Answered(outcome) = h.coordinator.voice_turn(&h.session.id).await.unwrap() else {
            panic!("expected an answer");
        };
        assert_eq!(report(outcome).turn.input.text, "I enjoy helping customers.");
        assert_eq!(capture.state(), CaptureState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn same_reply_after_the_window_is_a_new_turn() {
        let tts = ScriptedProvider::new("primary", false);
        let h = harness_speaking(
            &["Tell me about yourself."],
            Duration::ZERO,
            Default::default(),
            vec![tts.clone() as Arc<dyn SpeechProvider>],
        )
        .await;

        let first = h.coordinator.typed_turn(&h.session.id, "Hello").await.unwrap();
        assert!(matches!(first, TurnOutcome::Completed(_)));
        tokio::time::advance(Duration::from_secs(31)).await;
        let second = h.coordinator.typed_turn(&h.session.id, "Hello").await.unwrap();
        assert!(matches!(second, TurnOutcome::Completed(_)));

        assert_eq!(h.store.list_turns(&h.session.id).await.unwrap().len(), 2);
        assert_eq!(tts.calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.playback.plays(), 2);
    }

    #[tokio::test]
    async fn closing_reply_auto_finishes_when_enabled() {
        let settings = CoordinatorSettings {
            auto_finish_on_closing: true,
            ..Default::default()
        };
        let h = harness(
            &["That concludes our interview. Thank you for your time today!"],
            Duration::ZERO,
            settings,
        )
        .await;
        let r = report(
            h.coordinator
                .take_turn(&h.session.id, Utterance::typed("Thanks"))
                .await
                .unwrap(),
        );
        assert!(r.closing.unwrap().should_auto_finish());
        assert_eq!(r.finished, Some(SessionStatus::Completed));
        assert!(matches!(
            h.coordinator
                .take_turn(&h.session.id, Utterance::typed("more"))
                .await,
            Err(VoiceError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn closing_reply_only_flags_when_disabled() {
        let h = harness(&["Thank you for your time today."], Duration::ZERO, Default::default()).await;
        let r = report(
            h.coordinator
                .take_turn(&h.session.id, Utterance::typed("bye"))
                .await
                .unwrap(),
        );
        assert!(r.closing.is_some());
        assert_eq!(r.finished, None);
    }

    #[tokio::test]
    async fn voice_profile_resolves_from_job_and_can_be_swapped() {
        let h = harness(&["Q"], Duration::ZERO, Default::default()).await;
        let resolved = h.coordinator.profile_for(&h.session).await;
        assert_eq!(resolved, VoicePreset::SupportFriendly.profile());
        h.coordinator
            .set_voice_profile(&h.session.id, VoicePreset::ProfessionalMale.profile())
            .unwrap();
        assert_eq!(
            h.coordinator.profile_for(&h.session).await,
            VoicePreset::ProfessionalMale.profile()
        );
    }

    #[tokio::test]
    async fn finish_tears_down_voice_state() {
        let h = harness(&["Q"], Duration::ZERO, Default::default()).await;
        h.coordinator.start_interview(&h.session.id).await.unwrap();
        let capture = h.coordinator.captures().controller(&h.session.id);
        capture.request_permission().await;
        capture.start_capture().await.unwrap();

        h.coordinator
            .finish_interview(&h.session.id, FinishOutcome::Cancelled)
            .await
            .unwrap();
        assert!(h.coordinator.captures().get(&h.session.id).is_none());
        assert_eq!(capture.state(), CaptureState::Idle);
        assert!(h.coordinator.slots.get(&h.session.id).is_none());
    }
}
