//! Scripted microphone, recognizer and speaker. Used headless (text-only interviews) and by tests.

use crate::capture::{
    CaptureStream, DeviceFault, MicrophoneBackend, PermissionState, RecognitionOptions, RecordedAudio,
    SpeechRecognizer, Transcript,
};
use crate::error::{TranscriptionCause, VoiceResult};
use crate::playback::Playback;
use crate::tts::AudioHandle;
use async_trait::async_trait;
use candor_core::SessionId;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Microphone whose permission and open results are set up front.
pub struct ScriptedMicrophone {
    permission: Mutex<PermissionState>,
    request: Mutex<Result<(), DeviceFault>>,
    open: Mutex<Result<(), DeviceFault>>,
    requests: AtomicUsize,
    opens: AtomicUsize,
    open_streams: Arc<AtomicUsize>,
}

impl ScriptedMicrophone {
    pub fn granting() -> Arc<Self> {
        Arc::new(Self {
            permission: Mutex::new(PermissionState::Granted),
            request: Mutex::new(Ok(())),
            open: Mutex::new(Ok(())),
            requests: AtomicUsize::new(0),
            opens: AtomicUsize::new(0),
            open_streams: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn denying(fault: DeviceFault) -> Arc<Self> {
        let mic = Self::granting();
        *mic.permission.lock() = PermissionState::Denied(fault.clone().into());
        *mic.request.lock() = Err(fault.clone());
        *mic.open.lock() = Err(fault);
        mic
    }

    pub fn set_permission(&self, state: PermissionState) {
        *self.permission.lock() = state;
    }

    pub fn fail_open(&self, fault: DeviceFault) {
        *self.open.lock() = Err(fault);
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Streams opened and not yet released.
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MicrophoneBackend for ScriptedMicrophone {
    async fn query_permission(&self) -> PermissionState {
        *self.permission.lock()
    }

    async fn request(&self) -> Result<(), DeviceFault> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.request.lock().clone()
    }

    async fn open(&self) -> Result<Box<dyn CaptureStream>, DeviceFault> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.open.lock().clone()?;
        self.open_streams.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedStream {
            open_streams: self.open_streams.clone(),
        }))
    }
}

struct ScriptedStream {
    open_streams: Arc<AtomicUsize>,
}

impl CaptureStream for ScriptedStream {
    fn finish(self: Box<Self>) -> RecordedAudio {
        RecordedAudio {
            samples: vec![0.0; 1600],
            sample_rate: 16_000,
            duration: Duration::from_millis(100),
        }
    }
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        self.open_streams.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Recognizer that answers with a fixed transcript or failure, optionally after a delay.
pub struct ScriptedRecognizer {
    result: Mutex<Result<Transcript, TranscriptionCause>>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
}

impl ScriptedRecognizer {
    pub fn replying(text: impl Into<String>, confidence: f32) -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(Ok(Transcript {
                text: text.into(),
                confidence,
            })),
            delay: Mutex::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(cause: TranscriptionCause) -> Arc<Self> {
        let r = Self::replying("", 0.0);
        *r.result.lock() = Err(cause);
        r
    }

    pub fn set_reply(&self, text: impl Into<String>, confidence: f32) {
        *self.result.lock() = Ok(Transcript {
            text: text.into(),
            confidence,
        });
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechRecognizer for ScriptedRecognizer {
    async fn recognize(
        &self,
        _audio: &RecordedAudio,
        _options: &RecognitionOptions,
    ) -> Result<Transcript, TranscriptionCause> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.result.lock().clone()
    }
}

/// Speaker that keeps each reply "audible" for a fixed hold, or until the session is stopped.
pub struct ScriptedPlayback {
    hold: Duration,
    active: DashMap<SessionId, Arc<Notify>>,
    plays: AtomicUsize,
    stops: DashMap<SessionId, usize>,
}

impl ScriptedPlayback {
    pub fn holding(hold: Duration) -> Arc<Self> {
        Arc::new(Self {
            hold,
            active: DashMap::new(),
            plays: AtomicUsize::new(0),
            stops: DashMap::new(),
        })
    }

    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn stops_for(&self, session_id: &SessionId) -> usize {
        self.stops.get(session_id).map(|n| *n).unwrap_or(0)
    }
}

/// Drops the session's entry when its `play` ends, unless a newer play replaced it.
struct Audible<'a> {
    active: &'a DashMap<SessionId, Arc<Notify>>,
    session_id: &'a SessionId,
    stopped: Arc<Notify>,
}

impl Drop for Audible<'_> {
    fn drop(&mut self) {
        self.active
            .remove_if(self.session_id, |_, n| Arc::ptr_eq(n, &self.stopped));
    }
}

#[async_trait]
impl Playback for ScriptedPlayback {
    async fn play(&self, session_id: &SessionId, _handle: &AudioHandle) -> VoiceResult<()> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        let stopped = Arc::new(Notify::new());
        let notified = stopped.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        self.active.insert(session_id.clone(), stopped.clone());
        let _audible = Audible {
            active: &self.active,
            session_id,
            stopped: stopped.clone(),
        };
        tokio::select! {
            _ = &mut notified => {}
            _ = tokio::time::sleep(self.hold) => {}
        }
        Ok(())
    }

    fn stop(&self, session_id: &SessionId) {
        *self.stops.entry(session_id.clone()).or_insert(0) += 1;
        if let Some((_, stopped)) = self.active.remove(session_id) {
            stopped.notify_waiters();
        }
    }

    fn is_playing(&self, session_id: &SessionId) -> bool {
        self.active.contains_key(session_id)
    }
}
