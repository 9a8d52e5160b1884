//! Error types for the turn coordinator

use candor_core::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Why the microphone cannot be used. Closed set so UI guidance stays uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionReason {
    /// The user or a policy refused access.
    Blocked,
    NoDevice,
    /// Another application holds the device, or it cannot satisfy the requested format.
    DeviceBusy,
    /// Capture is only allowed from a secure origin.
    InsecureContext,
    Unsupported,
    /// Access was never asked for; `request_permission` must run before capture.
    NotRequested,
}

impl PermissionReason {
    pub fn guidance(self) -> &'static str {
        match self {
            PermissionReason::Blocked => {
                "Microphone access denied. Allow microphone access in your browser settings, or type your answer."
            }
            PermissionReason::NoDevice => {
                "No microphone found. Connect a microphone and try again, or type your answer."
            }
            PermissionReason::DeviceBusy => {
                "Microphone is being used by another application. Close it and try again, or type your answer."
            }
            PermissionReason::InsecureContext => {
                "Microphone access is blocked on insecure connections. Use HTTPS, or type your answer."
            }
            PermissionReason::Unsupported => {
                "Microphone access is not supported here. Please type your answer."
            }
            PermissionReason::NotRequested => {
                "Allow microphone access when prompted to answer by voice, or type your answer."
            }
        }
    }
}

impl fmt::Display for PermissionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PermissionReason::Blocked => "blocked",
            PermissionReason::NoDevice => "no-device",
            PermissionReason::DeviceBusy => "device-busy",
            PermissionReason::InsecureContext => "insecure-context",
            PermissionReason::Unsupported => "unsupported",
            PermissionReason::NotRequested => "not-requested",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TranscriptionCause {
    Timeout,
    NoSpeech,
    Device,
    Network,
    PermissionDenied,
    /// The session ended while recognition was running.
    Cancelled,
}

impl fmt::Display for TranscriptionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TranscriptionCause::Timeout => "timeout",
            TranscriptionCause::NoSpeech => "no-speech",
            TranscriptionCause::Device => "device",
            TranscriptionCause::Network => "network",
            TranscriptionCause::PermissionDenied => "permission-denied",
            TranscriptionCause::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DispatchCause {
    /// Endpoint missing, unconfigured, or answered 404.
    NotFound,
    /// Endpoint refused the caller (401/403/405).
    CrossOrigin,
    /// Connection, DNS, or timeout failure.
    Network,
    /// Any other non-success answer.
    Server,
}

impl DispatchCause {
    /// Rejections that justify one retry against the default endpoint.
    pub fn is_retryable(self) -> bool {
        matches!(self, DispatchCause::NotFound | DispatchCause::CrossOrigin)
    }

    /// Classify an HTTP status from the agent endpoint.
    pub fn from_status(status: u16) -> Self {
        match status {
            404 => DispatchCause::NotFound,
            401 | 403 | 405 => DispatchCause::CrossOrigin,
            _ => DispatchCause::Server,
        }
    }
}

impl fmt::Display for DispatchCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DispatchCause::NotFound => "not-found",
            DispatchCause::CrossOrigin => "cross-origin",
            DispatchCause::Network => "network",
            DispatchCause::Server => "server",
        };
        f.write_str(s)
    }
}

/// Errors that can occur while coordinating a turn
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VoiceError {
    #[error("Microphone permission error: {0}")]
    Permission(PermissionReason),

    #[error("Transcription error: {0}")]
    Transcription(TranscriptionCause),

    #[error("Agent dispatch error ({cause}): {message}")]
    Dispatch { cause: DispatchCause, message: String },

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl VoiceError {
    /// Text safe to show the candidate.
    pub fn user_message(&self) -> String {
        match self {
            VoiceError::Permission(reason) => reason.guidance().to_string(),
            VoiceError::Transcription(TranscriptionCause::Timeout) => {
                "We couldn't hear you in time. Please type your answer.".to_string()
            }
            VoiceError::Transcription(TranscriptionCause::NoSpeech) => {
                "No speech was detected. Please try again or type your answer.".to_string()
            }
            VoiceError::Transcription(_) => {
                "Voice input is unavailable right now. Please type your answer.".to_string()
            }
            VoiceError::Dispatch { .. } => {
                "The interview could not continue. Please retry the interview.".to_string()
            }
            _ => "Something went wrong. Please try again.".to_string(),
        }
    }
}

/// Core errors keep their class (not-found / invalid-state) across the crate boundary.
impl From<CoreError> for VoiceError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound(m) => VoiceError::NotFound(m),
            CoreError::InvalidState(m) => VoiceError::InvalidState(m),
            CoreError::Storage(m) => VoiceError::Storage(m),
            CoreError::Config(m) => VoiceError::Config(m),
        }
    }
}
