//! candor-core: interview session records, the lifecycle state machine, and the
//! persistence/notification collaborators the turn coordinator depends on.

pub mod closing;
mod config;
mod error;
mod lifecycle;
mod model;
pub mod notify;
pub mod store;
pub mod voice_profile;

pub use closing::{detect_closing, ClosingSignal};
pub use config::{env_first, env_opt_string, CoreConfig};
pub use error::{CoreError, CoreResult};
pub use lifecycle::{SessionLifecycle, SessionTeardown};
pub use model::{
    AudioSummary, ContextRecord, FinishOutcome, InputModality, InterviewSession, ParticipantRecord,
    SessionId, SessionStatus, Turn, TurnInput, TurnOutput,
};
pub use notify::{SessionHook, WebhookNotifier};
pub use store::{Directory, InMemoryStore, SessionStore, SledStore};
pub use voice_profile::{resolve_voice_profile, VoiceGender, VoicePreset, VoiceProfile, VoiceSettings};
