//! Records shared by the coordinator: sessions, turns, and directory entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque interview session token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Allocate a fresh random token.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Interview status. Terminal states never change once reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }

    /// pending → in_progress → {completed, failed, cancelled}, plus pending → cancelled.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishOutcome {
    Completed,
    Failed,
    Cancelled,
}

impl From<FinishOutcome> for SessionStatus {
    fn from(outcome: FinishOutcome) -> Self {
        match outcome {
            FinishOutcome::Completed => SessionStatus::Completed,
            FinishOutcome::Failed => SessionStatus::Failed,
            FinishOutcome::Cancelled => SessionStatus::Cancelled,
        }
    }
}

/// One interview attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewSession {
    pub id: SessionId,
    /// Candidate reference.
    pub participant_id: String,
    /// Job description reference.
    pub context_id: String,
    /// Agent webhook configured for the job's AI agent, if any.
    #[serde(default)]
    pub agent_endpoint: Option<String>,
    pub status: SessionStatus,
    #[serde(default)]
    pub questions_asked: u32,
    #[serde(default)]
    pub questions_answered: u32,
    #[serde(default)]
    pub turns_recorded: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl InterviewSession {
    pub fn new(
        participant_id: impl Into<String>,
        context_id: impl Into<String>,
        agent_endpoint: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::generate(),
            participant_id: participant_id.into(),
            context_id: context_id.into(),
            agent_endpoint,
            status: SessionStatus::Pending,
            questions_asked: 0,
            questions_answered: 0,
            turns_recorded: 0,
            created_at: now,
            started_at: None,
            ended_at: None,
            updated_at: now,
        }
    }
}

/// Where the candidate's words came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputModality {
    Voice,
    Typed,
    /// Coordinator-generated trigger (e.g. the opening request); not a candidate answer.
    System,
}

/// Candidate side of a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnInput {
    pub text: String,
    /// Recognition confidence in 0.0..=1.0 (typed input is always 1.0).
    pub confidence: f32,
    pub modality: InputModality,
}

/// Summary of the rendered reply audio. The audio bytes themselves are never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSummary {
    pub provider: String,
    pub duration_ms: u64,
    /// True when the provider spoke directly instead of returning an asset.
    pub direct_playback: bool,
}

/// Agent side of a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutput {
    /// None when the agent acknowledged without content.
    pub text: Option<String>,
    pub audio: Option<AudioSummary>,
}

/// One candidate-utterance / agent-reply exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub session_id: SessionId,
    /// 1-based position within the session.
    pub sequence: u32,
    pub input: TurnInput,
    pub output: TurnOutput,
    pub created_at: DateTime<Utc>,
}

/// Candidate record as seen by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Job description record as seen by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub department: Option<String>,
    /// Webhook of the AI agent assigned to this job.
    #[serde(default)]
    pub agent_endpoint: Option<String>,
    #[serde(default)]
    pub prefer_indian_accent: bool,
}
