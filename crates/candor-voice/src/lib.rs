//! # Candor Voice - Interview Turn Coordination
//!
//! Runs the request/response cycle between a candidate and the job's AI agent during a
//! live voice interview.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Interview Coordinator                      │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐        │
//! │  │ Audio Capture│→ │    Turn      │→ │    Reply     │        │
//! │  │ (mic + STT)  │  │  Dispatcher  │  │ Deduplicator │        │
//! │  └──────────────┘  └──────────────┘  └──────────────┘        │
//! │         ↑                                    ↓                │
//! │  ┌──────────────┐                   ┌──────────────┐         │
//! │  │   Re-arm     │←──── playback ────│     TTS      │         │
//! │  │   capture    │      finished     │   fallback   │         │
//! │  └──────────────┘                   └──────────────┘         │
//! └──────────────────────────────────────────────────────────────┘
//!                 SessionLifecycle (candor-core) wraps every turn
//! ```

pub mod capture;
pub mod coordinator;
pub mod dedup;
pub mod dispatch;
pub mod error;
#[cfg(feature = "hardware")]
pub mod microphone;
pub mod playback;
pub mod reply;
pub mod scripted;
pub mod stt;
pub mod tts;

pub use capture::{
    AudioCaptureController, CaptureOutcome, CaptureRegistry, CaptureState, CaptureStream, DeviceFault,
    MicrophoneBackend, PermissionState, RecognitionOptions, RecordedAudio, SpeechRecognizer,
    Transcript, Utterance, DEFAULT_TRANSCRIPTION_TIMEOUT,
};
pub use coordinator::{
    CoordinatorSettings, InterviewCoordinator, StartOutcome, TurnOutcome, TurnReport, VoiceTurn,
    OPENING_REQUEST,
};
pub use dedup::{ResponseDeduplicator, DEFAULT_DEDUP_WINDOW};
pub use dispatch::{
    AgentReply, AgentRequest, AgentTransport, DispatchOutcome, HttpAgentTransport, TurnDispatcher,
};
pub use error::{DispatchCause, PermissionReason, TranscriptionCause, VoiceError, VoiceResult};
#[cfg(feature = "hardware")]
pub use microphone::CpalMicrophone;
#[cfg(feature = "hardware")]
pub use playback::SpeakerPlayback;
pub use playback::{NullPlayback, Playback};
pub use reply::{normalize_reply, ReplyText};
pub use scripted::{ScriptedMicrophone, ScriptedPlayback, ScriptedRecognizer};
pub use stt::OpenAiCompatibleStt;
pub use tts::{
    estimate_duration, AudioHandle, AudioSource, ElevenLabsTts, LocalFallbackTts,
    OpenAiCompatibleTts, SpeechProvider, TtsOrchestrator,
};
