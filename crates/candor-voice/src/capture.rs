//! **Audio capture**: Microphone permission, recording, and time-boxed transcription
//! for one interview session, with typed input as the fallback.
//!
//! ```text
//!            ┌────────── permission denied ──────────┐
//!            ▼                                        │
//!  idle ──start──▶ recording ◀──pause/resume──▶ paused │
//!   ▲                 │                                │
//!   │               stop                               │
//!   │                 ▼                                │
//!   │            transcribing ──ok──▶ ready-for-review ──accept──▶ submitted
//!   │                 │                                              │
//!   │              failure ──▶ text-entry ──submit_manual_text──▶ submitted
//!   └──────────────────────── rearm (after playback) ────────────────┘
//! ```
//!
//! State is validated and updated synchronously under a short lock; the lock is never
//! held across device or recognizer calls. Every cancelling operation bumps a
//! generation counter so a recognition result that lands late is discarded.

use crate::error::{PermissionReason, TranscriptionCause, VoiceError, VoiceResult};
use async_trait::async_trait;
use candor_core::{InputModality, SessionId, TurnInput};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_TRANSCRIPTION_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureState {
    Idle,
    PermissionChecking,
    PermissionDenied,
    Recording,
    Paused,
    Transcribing,
    ReadyForReview,
    /// Voice input failed or is unavailable; the candidate types the answer.
    TextEntry,
    Submitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionState {
    Granted,
    Denied(PermissionReason),
    /// Not decided yet; `request_permission` will prompt.
    Prompt,
    /// The platform cannot report permission without prompting.
    Unknown,
}

/// Platform-level microphone failure, before it is folded into a [`PermissionReason`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceFault {
    NotAllowed,
    NotFound,
    NotReadable,
    Overconstrained,
    Security,
    Unsupported,
}

impl From<DeviceFault> for PermissionReason {
    fn from(fault: DeviceFault) -> Self {
        match fault {
            DeviceFault::NotAllowed => PermissionReason::Blocked,
            DeviceFault::NotFound => PermissionReason::NoDevice,
            DeviceFault::NotReadable | DeviceFault::Overconstrained => PermissionReason::DeviceBusy,
            DeviceFault::Security => PermissionReason::InsecureContext,
            DeviceFault::Unsupported => PermissionReason::Unsupported,
        }
    }
}

/// Captured audio handed from `stop_capture` to `transcribe`.
#[derive(Debug, Clone, Default)]
pub struct RecordedAudio {
    /// PCM samples (f32, -1.0..1.0), mono.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Recording time excluding pauses.
    pub duration: Duration,
}

/// An open microphone. Dropping it must release the device.
pub trait CaptureStream: Send {
    fn pause(&mut self) {}

    fn resume(&mut self) {}

    /// Stop recording, release the device, and return what was captured.
    fn finish(self: Box<Self>) -> RecordedAudio;
}

#[async_trait]
pub trait MicrophoneBackend: Send + Sync {
    /// Current permission without prompting.
    async fn query_permission(&self) -> PermissionState;

    /// Prompt for access.
    async fn request(&self) -> Result<(), DeviceFault>;

    async fn open(&self) -> Result<Box<dyn CaptureStream>, DeviceFault>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionOptions {
    pub continuous: bool,
    pub interim_results: bool,
    pub language: String,
}

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self {
            continuous: false,
            interim_results: false,
            language: "en-US".to_string(),
        }
    }
}

impl RecognitionOptions {
    pub fn for_language(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    pub confidence: f32,
}

#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn recognize(
        &self,
        audio: &RecordedAudio,
        options: &RecognitionOptions,
    ) -> Result<Transcript, TranscriptionCause>;
}

/// The candidate's answer for one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub confidence: f32,
    pub modality: InputModality,
}

impl Utterance {
    pub fn typed(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: 1.0,
            modality: InputModality::Typed,
        }
    }

    pub fn voice(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
            modality: InputModality::Voice,
        }
    }

    pub(crate) fn system(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: 1.0,
            modality: InputModality::System,
        }
    }
}

impl From<Utterance> for TurnInput {
    fn from(u: Utterance) -> Self {
        TurnInput {
            text: u.text,
            confidence: u.confidence,
            modality: u.modality,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    Utterance(Utterance),
    /// Voice failed; the controller is in text entry and waits for typed input.
    NeedsText { cause: TranscriptionCause },
}

struct CaptureInner {
    state: CaptureState,
    permission: PermissionState,
    stream: Option<Box<dyn CaptureStream>>,
    opening: bool,
    started_at: Option<Instant>,
    paused_at: Option<Instant>,
    paused_total: Duration,
    review: Option<Transcript>,
    recognition: Option<CancellationToken>,
    generation: u64,
}

impl CaptureInner {
    fn elapsed(&self, now: Instant) -> Duration {
        let Some(started) = self.started_at else {
            return Duration::ZERO;
        };
        let end = self.paused_at.unwrap_or(now);
        end.saturating_duration_since(started)
            .saturating_sub(self.paused_total)
    }

    /// Cancel recognition and take the open stream; the caller releases it outside the lock.
    fn interrupt(&mut self) -> Option<Box<dyn CaptureStream>> {
        self.generation += 1;
        if let Some(token) = self.recognition.take() {
            token.cancel();
        }
        self.opening = false;
        self.started_at = None;
        self.paused_at = None;
        self.paused_total = Duration::ZERO;
        self.review = None;
        self.stream.take()
    }
}

/// Capture state machine for one session.
pub struct AudioCaptureController {
    session_id: SessionId,
    microphone: Arc<dyn MicrophoneBackend>,
    recognizer: Arc<dyn SpeechRecognizer>,
    options: RecognitionOptions,
    inner: Mutex<CaptureInner>,
}

impl AudioCaptureController {
    pub fn new(
        session_id: SessionId,
        microphone: Arc<dyn MicrophoneBackend>,
        recognizer: Arc<dyn SpeechRecognizer>,
        options: RecognitionOptions,
    ) -> Self {
        Self {
            session_id,
            microphone,
            recognizer,
            options,
            inner: Mutex::new(CaptureInner {
                state: CaptureState::Idle,
                permission: PermissionState::Unknown,
                stream: None,
                opening: false,
                started_at: None,
                paused_at: None,
                paused_total: Duration::ZERO,
                review: None,
                recognition: None,
                generation: 0,
            }),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.inner.lock().state
    }

    pub fn permission(&self) -> PermissionState {
        self.inner.lock().permission
    }

    /// Recording time so far, excluding pauses.
    pub fn elapsed(&self) -> Duration {
        self.inner.lock().elapsed(Instant::now())
    }

    /// Read the current permission without prompting.
    pub async fn check_permission(&self) -> PermissionState {
        {
            let mut inner = self.inner.lock();
            if matches!(inner.state, CaptureState::Idle | CaptureState::PermissionDenied) {
                inner.state = CaptureState::PermissionChecking;
            }
        }
        let current = self.microphone.query_permission().await;
        self.settle_permission(current);
        debug!(session = %self.session_id, permission = ?current, "microphone permission checked");
        current
    }

    /// Prompt for microphone access.
    pub async fn request_permission(&self) -> PermissionState {
        {
            let mut inner = self.inner.lock();
            if matches!(inner.state, CaptureState::Idle | CaptureState::PermissionDenied) {
                inner.state = CaptureState::PermissionChecking;
            }
        }
        let permission = match self.microphone.request().await {
            Ok(()) => PermissionState::Granted,
            Err(fault) => PermissionState::Denied(fault.into()),
        };
        self.settle_permission(permission);
        match permission {
            PermissionState::Denied(reason) => {
                warn!(session = %self.session_id, reason = %reason, "microphone permission denied")
            }
            _ => info!(session = %self.session_id, "microphone permission granted"),
        }
        permission
    }

    fn settle_permission(&self, permission: PermissionState) {
        let mut inner = self.inner.lock();
        inner.permission = permission;
        if matches!(
            inner.state,
            CaptureState::PermissionChecking | CaptureState::PermissionDenied
        ) {
            inner.state = match permission {
                PermissionState::Denied(_) => CaptureState::PermissionDenied,
                _ => CaptureState::Idle,
            };
        }
    }

    /// Open the microphone and start recording.
    pub async fn start_capture(&self) -> VoiceResult<()> {
        let generation = {
            let mut inner = self.inner.lock();
            match inner.permission {
                PermissionState::Granted => {}
                PermissionState::Denied(reason) => return Err(VoiceError::Permission(reason)),
                PermissionState::Prompt | PermissionState::Unknown => {
                    return Err(VoiceError::Permission(PermissionReason::NotRequested))
                }
            }
            if inner.state != CaptureState::Idle || inner.opening {
                warn!(session = %self.session_id, state = ?inner.state, "start_capture rejected");
                return Err(VoiceError::InvalidState(format!(
                    "cannot start capture while {:?}",
                    inner.state
                )));
            }
            inner.opening = true;
            inner.generation
        };

        let opened = self.microphone.open().await;

        let mut inner = self.inner.lock();
        if inner.generation != generation {
            // Cancelled or overridden while the device was opening; release it.
            drop(inner);
            if let Ok(stream) = opened {
                stream.finish();
            }
            return Err(VoiceError::InvalidState("capture cancelled while opening".to_string()));
        }
        inner.opening = false;
        match opened {
            Ok(stream) => {
                inner.stream = Some(stream);
                inner.state = CaptureState::Recording;
                inner.started_at = Some(Instant::now());
                inner.paused_at = None;
                inner.paused_total = Duration::ZERO;
                info!(session = %self.session_id, "recording");
                Ok(())
            }
            Err(fault) => {
                let reason: PermissionReason = fault.into();
                inner.permission = PermissionState::Denied(reason);
                inner.state = CaptureState::PermissionDenied;
                warn!(session = %self.session_id, reason = %reason, "microphone could not be opened");
                Err(VoiceError::Permission(reason))
            }
        }
    }

    pub fn pause_capture(&self) -> VoiceResult<()> {
        let mut inner = self.inner.lock();
        if inner.state != CaptureState::Recording {
            return Err(VoiceError::InvalidState(format!("cannot pause while {:?}", inner.state)));
        }
        if let Some(stream) = inner.stream.as_mut() {
            stream.pause();
        }
        inner.paused_at = Some(Instant::now());
        inner.state = CaptureState::Paused;
        Ok(())
    }

    pub fn resume_capture(&self) -> VoiceResult<()> {
        let mut inner = self.inner.lock();
        if inner.state != CaptureState::Paused {
            return Err(VoiceError::InvalidState(format!("cannot resume while {:?}", inner.state)));
        }
        if let Some(stream) = inner.stream.as_mut() {
            stream.resume();
        }
        if let Some(paused) = inner.paused_at.take() {
            inner.paused_total += Instant::now().saturating_duration_since(paused);
        }
        inner.state = CaptureState::Recording;
        Ok(())
    }

    /// Stop recording and release the device. The controller moves to `transcribing`.
    pub fn stop_capture(&self) -> VoiceResult<RecordedAudio> {
        let (stream, duration) = {
            let mut inner = self.inner.lock();
            if !matches!(inner.state, CaptureState::Recording | CaptureState::Paused) {
                return Err(VoiceError::InvalidState(format!(
                    "cannot stop capture while {:?}",
                    inner.state
                )));
            }
            let duration = inner.elapsed(Instant::now());
            inner.started_at = None;
            inner.paused_at = None;
            inner.paused_total = Duration::ZERO;
            inner.state = CaptureState::Transcribing;
            (inner.stream.take(), duration)
        };
        let mut audio = stream.map(|s| s.finish()).unwrap_or_default();
        audio.duration = duration;
        debug!(session = %self.session_id, samples = audio.samples.len(), "capture stopped");
        Ok(audio)
    }

    /// Recognize `audio`, giving up after `timeout`. Any failure moves to text entry.
    pub async fn transcribe(&self, audio: &RecordedAudio, timeout: Duration) -> VoiceResult<Transcript> {
        let (generation, token) = {
            let mut inner = self.inner.lock();
            if inner.state != CaptureState::Transcribing {
                return Err(VoiceError::InvalidState(format!(
                    "cannot transcribe while {:?}",
                    inner.state
                )));
            }
            let token = CancellationToken::new();
            inner.recognition = Some(token.clone());
            (inner.generation, token)
        };

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(TranscriptionCause::Cancelled),
            _ = tokio::time::sleep(timeout) => Err(TranscriptionCause::Timeout),
            r = self.recognizer.recognize(audio, &self.options) => r,
        };

        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return Err(VoiceError::Transcription(TranscriptionCause::Cancelled));
        }
        inner.recognition = None;
        let result = result.and_then(|t| {
            if t.text.trim().is_empty() {
                Err(TranscriptionCause::NoSpeech)
            } else {
                Ok(Transcript {
                    text: t.text.trim().to_string(),
                    confidence: t.confidence.clamp(0.0, 1.0),
                })
            }
        });
        match result {
            Ok(transcript) => {
                inner.state = CaptureState::ReadyForReview;
                inner.review = Some(transcript.clone());
                Ok(transcript)
            }
            Err(cause) => {
                inner.state = CaptureState::TextEntry;
                warn!(session = %self.session_id, cause = %cause, "transcription failed, falling back to text entry");
                Err(VoiceError::Transcription(cause))
            }
        }
    }

    /// Submit the transcript under review, optionally as edited by the candidate.
    pub fn accept_transcript(&self, edited: Option<String>) -> VoiceResult<Utterance> {
        let mut inner = self.inner.lock();
        if inner.state != CaptureState::ReadyForReview {
            return Err(VoiceError::InvalidState(format!(
                "no transcript to accept while {:?}",
                inner.state
            )));
        }
        let review = inner
            .review
            .take()
            .ok_or_else(|| VoiceError::InvalidState("transcript missing".to_string()))?;
        let text = match edited.map(|e| e.trim().to_string()) {
            Some(e) if !e.is_empty() => e,
            _ => review.text,
        };
        inner.state = CaptureState::Submitted;
        Ok(Utterance::voice(text, review.confidence))
    }

    /// Submit typed text. Allowed from any state; open capture and running recognition are abandoned.
    pub fn submit_manual_text(&self, text: &str) -> VoiceResult<Utterance> {
        let text = text.trim();
        if text.is_empty() {
            return Err(VoiceError::InvalidInput("answer is empty".to_string()));
        }
        let stream = {
            let mut inner = self.inner.lock();
            let stream = inner.interrupt();
            inner.state = CaptureState::Submitted;
            stream
        };
        if let Some(stream) = stream {
            stream.finish();
        }
        info!(session = %self.session_id, "typed answer submitted");
        Ok(Utterance::typed(text))
    }

    /// Ready the controller for the next answer once the reply has played.
    pub fn rearm(&self) -> VoiceResult<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            CaptureState::Idle => Ok(()),
            CaptureState::Submitted | CaptureState::TextEntry | CaptureState::ReadyForReview => {
                inner.review = None;
                inner.state = CaptureState::Idle;
                Ok(())
            }
            other => Err(VoiceError::InvalidState(format!("cannot re-arm while {:?}", other))),
        }
    }

    /// Abandon whatever is in progress and return to idle. Used on session teardown.
    pub fn cancel(&self) {
        let stream = {
            let mut inner = self.inner.lock();
            let stream = inner.interrupt();
            if inner.state != CaptureState::PermissionDenied {
                inner.state = CaptureState::Idle;
            }
            stream
        };
        if let Some(stream) = stream {
            stream.finish();
        }
        debug!(session = %self.session_id, "capture cancelled");
    }

    /// Stop, transcribe, and accept in one step. Recognition failures degrade to text entry.
    pub async fn capture_utterance(&self, timeout: Duration) -> VoiceResult<CaptureOutcome> {
        let audio = self.stop_capture()?;
        match self.transcribe(&audio, timeout).await {
            Ok(_) => Ok(CaptureOutcome::Utterance(self.accept_transcript(None)?)),
            Err(VoiceError::Transcription(TranscriptionCause::Cancelled)) => {
                Err(VoiceError::Transcription(TranscriptionCause::Cancelled))
            }
            Err(VoiceError::Transcription(cause)) => Ok(CaptureOutcome::NeedsText { cause }),
            Err(e) => Err(e),
        }
    }
}

/// One capture controller per session.
pub struct CaptureRegistry {
    microphone: Arc<dyn MicrophoneBackend>,
    recognizer: Arc<dyn SpeechRecognizer>,
    options: RecognitionOptions,
    controllers: DashMap<SessionId, Arc<AudioCaptureController>>,
}

impl CaptureRegistry {
    pub fn new(
        microphone: Arc<dyn MicrophoneBackend>,
        recognizer: Arc<dyn SpeechRecognizer>,
        options: RecognitionOptions,
    ) -> Self {
        Self {
            microphone,
            recognizer,
            options,
            controllers: DashMap::new(),
        }
    }

    pub fn controller(&self, session_id: &SessionId) -> Arc<AudioCaptureController> {
        self.controllers
            .entry(session_id.clone())
            .or_insert_with(|| {
                Arc::new(AudioCaptureController::new(
                    session_id.clone(),
                    self.microphone.clone(),
                    self.recognizer.clone(),
                    self.options.clone(),
                ))
            })
            .clone()
    }

    pub fn get(&self, session_id: &SessionId) -> Option<Arc<AudioCaptureController>> {
        self.controllers.get(session_id).map(|c| c.clone())
    }

    /// Cancel and forget the session's controller.
    pub fn remove(&self, session_id: &SessionId) {
        if let Some((_, controller)) = self.controllers.remove(session_id) {
            controller.cancel();
        }
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::{ScriptedMicrophone, ScriptedRecognizer};

    fn controller(
        mic: Arc<ScriptedMicrophone>,
        recognizer: Arc<ScriptedRecognizer>,
    ) -> AudioCaptureController {
        AudioCaptureController::new(
            SessionId::from("s1"),
            mic,
            recognizer,
            RecognitionOptions::default(),
        )
    }

    async fn recording(c: &AudioCaptureController) {
        assert_eq!(c.request_permission().await, PermissionState::Granted);
        c.start_capture().await.unwrap();
        assert_eq!(c.state(), CaptureState::Recording);
    }

    #[test]
    fn device_faults_fold_into_closed_reasons() {
        assert_eq!(PermissionReason::from(DeviceFault::NotAllowed), PermissionReason::Blocked);
        assert_eq!(PermissionReason::from(DeviceFault::NotFound), PermissionReason::NoDevice);
        assert_eq!(PermissionReason::from(DeviceFault::NotReadable), PermissionReason::DeviceBusy);
        assert_eq!(PermissionReason::from(DeviceFault::Overconstrained), PermissionReason::DeviceBusy);
        assert_eq!(PermissionReason::from(DeviceFault::Security), PermissionReason::InsecureContext);
    }

    #[test]
    fn recognition_defaults() {
        let o = RecognitionOptions::default();
        assert!(!o.continuous && !o.interim_results);
        assert_eq!(o.language, "en-US");
    }

    #[tokio::test]
    async fn check_reports_unknown_without_prompting() {
        let mic = ScriptedMicrophone::granting();
        mic.set_permission(PermissionState::Unknown);
        let c = controller(mic.clone(), ScriptedRecognizer::replying("hi", 0.9));
        assert_eq!(c.check_permission().await, PermissionState::Unknown);
        assert_eq!(c.state(), CaptureState::Idle);
        assert_eq!(mic.requests(), 0);
    }

    #[tokio::test]
    async fn denied_permission_blocks_capture_without_state_change() {
        let mic = ScriptedMicrophone::denying(DeviceFault::NotAllowed);
        let c = controller(mic, ScriptedRecognizer::replying("hi", 0.9));
        assert_eq!(
            c.request_permission().await,
            PermissionState::Denied(PermissionReason::Blocked)
        );
        assert_eq!(c.state(), CaptureState::PermissionDenied);
        let err = c.start_capture().await.unwrap_err();
        assert_eq!(err, VoiceError::Permission(PermissionReason::Blocked));
        assert_eq!(c.state(), CaptureState::PermissionDenied);
    }

    #[tokio::test]
    async fn unrequested_permission_asks_for_a_prompt() {
        let mic = ScriptedMicrophone::granting();
        mic.set_permission(PermissionState::Unknown);
        let c = controller(mic.clone(), ScriptedRecognizer::replying("hi", 0.9));
        c.check_permission().await;
        let err = c.start_capture().await.unwrap_err();
        assert_eq!(err, VoiceError::Permission(PermissionReason::NotRequested));
        assert!(!err.user_message().contains("denied"));
        assert_eq!(c.state(), CaptureState::Idle);
        assert_eq!(mic.opens(), 0);

        // After the prompt the same controller records.
        c.request_permission().await;
        c.start_capture().await.unwrap();
        assert_eq!(c.state(), CaptureState::Recording);
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let mic = ScriptedMicrophone::granting();
        let c = controller(mic.clone(), ScriptedRecognizer::replying("hi", 0.9));
        recording(&c).await;
        assert!(matches!(c.start_capture().await, Err(VoiceError::InvalidState(_))));
        assert_eq!(c.state(), CaptureState::Recording);
        assert_eq!(mic.opens(), 1);
    }

    #[tokio::test]
    async fn busy_device_surfaces_as_permission_error() {
        let mic = ScriptedMicrophone::granting();
        mic.fail_open(DeviceFault::NotReadable);
        let c = controller(mic, ScriptedRecognizer::replying("hi", 0.9));
        c.request_permission().await;
        assert_eq!(
            c.start_capture().await,
            Err(VoiceError::Permission(PermissionReason::DeviceBusy))
        );
        assert_eq!(c.state(), CaptureState::PermissionDenied);
    }

    #[tokio::test(start_paused = true)]
    async fn paused_time_is_excluded_from_elapsed() {
        let c = controller(ScriptedMicrophone::granting(), ScriptedRecognizer::replying("hi", 0.9));
        recording(&c).await;
        tokio::time::advance(Duration::from_secs(3)).await;
        c.pause_capture().unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(c.elapsed(), Duration::from_secs(3));
        c.resume_capture().unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        let audio = c.stop_capture().unwrap();
        assert_eq!(audio.duration, Duration::from_secs(5));
        assert_eq!(c.state(), CaptureState::Transcribing);
    }

    #[tokio::test]
    async fn stop_releases_the_device() {
        let mic = ScriptedMicrophone::granting();
        let c = controller(mic.clone(), ScriptedRecognizer::replying("hi", 0.9));
        recording(&c).await;
        assert_eq!(mic.open_streams(), 1);
        c.stop_capture().unwrap();
        assert_eq!(mic.open_streams(), 0);
    }

    #[tokio::test]
    async fn successful_transcription_goes_to_review_then_submitted() {
        let c = controller(
            ScriptedMicrophone::granting(),
            ScriptedRecognizer::replying(" I led the payments migration. ", 0.92),
        );
        recording(&c).await;
        let outcome = c.capture_utterance(DEFAULT_TRANSCRIPTION_TIMEOUT).await.unwrap();
        let CaptureOutcome::Utterance(u) = outcome else {
            panic!("expected an utterance");
        };
        assert_eq!(u.text, "I led the payments migration.");
        assert_eq!(u.modality, InputModality::Voice);
        assert_eq!(c.state(), CaptureState::Submitted);
        c.rearm().unwrap();
        assert_eq!(c.state(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn edited_transcript_replaces_recognized_text() {
        let c = controller(ScriptedMicrophone::granting(), ScriptedRecognizer::replying("helo", 0.4));
        recording(&c).await;
        let audio = c.stop_capture().unwrap();
        c.transcribe(&audio, DEFAULT_TRANSCRIPTION_TIMEOUT).await.unwrap();
        assert_eq!(c.state(), CaptureState::ReadyForReview);
        let u = c.accept_transcript(Some("hello".into())).unwrap();
        assert_eq!(u.text, "hello");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_degrades_to_text_entry() {
        let recognizer = ScriptedRecognizer::replying("too late", 0.9);
        recognizer.set_delay(Duration::from_secs(30));
        let c = controller(ScriptedMicrophone::granting(), recognizer);
        recording(&c).await;
        let audio = c.stop_capture().unwrap();
        let started = Instant::now();
        let err = c.transcribe(&audio, Duration::from_millis(5000)).await.unwrap_err();
        assert_eq!(err, VoiceError::Transcription(TranscriptionCause::Timeout));
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(5000) && waited < Duration::from_secs(6));
        assert_eq!(c.state(), CaptureState::TextEntry);

        let u = c.submit_manual_text("My answer").unwrap();
        assert_eq!(u.confidence, 1.0);
        assert_eq!(u.modality, InputModality::Typed);
        assert_eq!(c.state(), CaptureState::Submitted);
    }

    #[tokio::test]
    async fn recognizer_failures_degrade_to_text_entry() {
        for cause in [
            TranscriptionCause::NoSpeech,
            TranscriptionCause::Network,
            TranscriptionCause::Device,
            TranscriptionCause::PermissionDenied,
        ] {
            let c = controller(ScriptedMicrophone::granting(), ScriptedRecognizer::failing(cause));
            recording(&c).await;
            let outcome = c.capture_utterance(DEFAULT_TRANSCRIPTION_TIMEOUT).await.unwrap();
            assert_eq!(outcome, CaptureOutcome::NeedsText { cause });
            assert_eq!(c.state(), CaptureState::TextEntry);
        }
    }

    #[tokio::test]
    async fn blank_recognition_is_no_speech() {
        let c = controller(ScriptedMicrophone::granting(), ScriptedRecognizer::replying("   ", 0.9));
        recording(&c).await;
        let outcome = c.capture_utterance(DEFAULT_TRANSCRIPTION_TIMEOUT).await.unwrap();
        assert_eq!(
            outcome,
            CaptureOutcome::NeedsText {
                cause: TranscriptionCause::NoSpeech
            }
        );
    }

    #[tokio::test]
    async fn manual_text_overrides_open_capture() {
        let mic = ScriptedMicrophone::granting();
        let c = controller(mic.clone(), ScriptedRecognizer::replying("hi", 0.9));
        recording(&c).await;
        c.submit_manual_text("typed instead").unwrap();
        assert_eq!(mic.open_streams(), 0);
        assert_eq!(c.state(), CaptureState::Submitted);
        assert!(matches!(c.submit_manual_text("  "), Err(VoiceError::InvalidInput(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_running_recognition() {
        let recognizer = ScriptedRecognizer::replying("late", 0.9);
        recognizer.set_delay(Duration::from_secs(3));
        let c = Arc::new(controller(ScriptedMicrophone::granting(), recognizer));
        recording(&c).await;
        let audio = c.stop_capture().unwrap();

        let task = {
            let c = c.clone();
            tokio::spawn(async move { c.transcribe(&audio, Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        c.cancel();
        let result = task.await.unwrap();
        assert_eq!(result, Err(VoiceError::Transcription(TranscriptionCause::Cancelled)));
        assert_eq!(c.state(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn registry_keeps_one_controller_per_session() {
        let registry = CaptureRegistry::new(
            ScriptedMicrophone::granting(),
            ScriptedRecognizer::replying("hi", 0.9),
            RecognitionOptions::default(),
        );
        let sid = SessionId::from("s1");
        let a = registry.controller(&sid);
        let b = registry.controller(&sid);
        assert!(Arc::ptr_eq(&a, &b));
        registry.remove(&sid);
        assert!(registry.get(&sid).is_none());
    }
}
