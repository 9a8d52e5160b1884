//! Session lifecycle: the only component that mutates and persists interview status.
//!
//! ```text
//! pending ──activate──▶ in_progress ──finish──▶ completed | failed | cancelled
//!    └──────────────finish(cancelled)──────────▶ cancelled
//! ```
//!
//! Status checks and updates happen synchronously on an in-process table; the guard
//! is released before any persistence write or teardown runs, so overlapping calls
//! observe each other's transitions and the losing call is rejected.

use crate::error::{CoreError, CoreResult};
use crate::model::{
    FinishOutcome, InputModality, InterviewSession, SessionId, SessionStatus, Turn, TurnInput,
    TurnOutput,
};
use crate::notify::SessionHook;
use crate::store::{Directory, SessionStore};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Per-session cleanup run by `finish` before it returns (cancel capture, stop audio, clear dedup).
#[async_trait]
pub trait SessionTeardown: Send + Sync {
    async fn teardown(&self, session_id: &SessionId);
}

pub struct SessionLifecycle {
    store: Arc<dyn SessionStore>,
    directory: Arc<dyn Directory>,
    /// Authoritative in-process view; the store is written through.
    sessions: DashMap<SessionId, InterviewSession>,
    teardowns: RwLock<Vec<Arc<dyn SessionTeardown>>>,
    hooks: RwLock<Vec<Arc<dyn SessionHook>>>,
}

impl SessionLifecycle {
    pub fn new(store: Arc<dyn SessionStore>, directory: Arc<dyn Directory>) -> Self {
        Self {
            store,
            directory,
            sessions: DashMap::new(),
            teardowns: RwLock::new(Vec::new()),
            hooks: RwLock::new(Vec::new()),
        }
    }

    pub fn register_teardown(&self, teardown: Arc<dyn SessionTeardown>) {
        self.teardowns.write().push(teardown);
    }

    pub fn register_hook(&self, hook: Arc<dyn SessionHook>) {
        self.hooks.write().push(hook);
    }

    /// Allocate a pending session for a candidate and job.
    pub async fn create(&self, participant_id: &str, context_id: &str) -> CoreResult<InterviewSession> {
        if self.directory.participant(participant_id).await?.is_none() {
            return Err(CoreError::NotFound(format!("participant {}", participant_id)));
        }
        let context = self
            .directory
            .context(context_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("context {}", context_id)))?;

        let agent_endpoint = context.agent_endpoint.filter(|u| !u.trim().is_empty());
        let session = InterviewSession::new(participant_id, context_id, agent_endpoint);
        self.sessions.insert(session.id.clone(), session.clone());
        self.store.put_session(&session).await?;
        info!(session = %session.id, context = %context_id, "interview session created");
        Ok(session)
    }

    /// Current record; falls back to the store for sessions created by another process.
    pub async fn get(&self, id: &SessionId) -> CoreResult<InterviewSession> {
        if let Some(s) = self.sessions.get(id) {
            return Ok(s.clone());
        }
        let loaded = self
            .store
            .get_session(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("session {}", id)))?;
        let entry = self.sessions.entry(id.clone()).or_insert(loaded);
        Ok(entry.clone())
    }

    /// pending → in_progress. No-op when already in progress.
    pub async fn activate(&self, id: &SessionId) -> CoreResult<InterviewSession> {
        self.get(id).await?;
        let snapshot = {
            let mut entry = self
                .sessions
                .get_mut(id)
                .ok_or_else(|| CoreError::NotFound(format!("session {}", id)))?;
            match entry.status {
                SessionStatus::InProgress => return Ok(entry.clone()),
                SessionStatus::Pending => {
                    let now = Utc::now();
                    entry.status = SessionStatus::InProgress;
                    entry.started_at = Some(now);
                    entry.updated_at = now;
                    entry.clone()
                }
                terminal => {
                    warn!(session = %id, status = %terminal, "activate rejected on finished session");
                    return Err(CoreError::InvalidState(format!(
                        "session {} is already {}",
                        id, terminal
                    )));
                }
            }
        };
        self.persist(&snapshot).await?;
        info!(session = %id, "interview in progress");
        Ok(snapshot)
    }

    /// Move to a terminal state, tear down per-session resources, then notify hooks once.
    pub async fn finish(&self, id: &SessionId, outcome: FinishOutcome) -> CoreResult<InterviewSession> {
        self.get(id).await?;
        let next: SessionStatus = outcome.into();
        let snapshot = {
            let mut entry = self
                .sessions
                .get_mut(id)
                .ok_or_else(|| CoreError::NotFound(format!("session {}", id)))?;
            let current = entry.status;
            if !current.can_transition_to(next) {
                warn!(session = %id, from = %current, to = %next, "transition rejected");
                return Err(CoreError::InvalidState(format!(
                    "session {} cannot move from {} to {}",
                    id, current, next
                )));
            }
            let now = Utc::now();
            entry.status = next;
            entry.ended_at = Some(now);
            entry.updated_at = now;
            entry.clone()
        };

        let teardowns: Vec<_> = self.teardowns.read().clone();
        for teardown in teardowns {
            teardown.teardown(id).await;
        }

        let persisted = self.persist(&snapshot).await;

        let hooks: Vec<_> = self.hooks.read().clone();
        for hook in hooks {
            hook.on_session_finished(&snapshot).await;
        }
        info!(session = %id, status = %next, "interview finished");

        persisted.map(|_| snapshot)
    }

    /// Append a turn and bump the question counters. Rejected once the session is finished.
    pub async fn record_turn(
        &self,
        id: &SessionId,
        input: TurnInput,
        output: TurnOutput,
    ) -> CoreResult<Turn> {
        self.get(id).await?;
        let (turn, snapshot) = {
            let mut entry = self
                .sessions
                .get_mut(id)
                .ok_or_else(|| CoreError::NotFound(format!("session {}", id)))?;
            if entry.status.is_terminal() {
                return Err(CoreError::InvalidState(format!(
                    "session {} is already {}",
                    id, entry.status
                )));
            }
            entry.turns_recorded += 1;
            if input.modality != InputModality::System {
                entry.questions_answered += 1;
            }
            if output.text.is_some() {
                entry.questions_asked += 1;
            }
            let now = Utc::now();
            entry.updated_at = now;
            let turn = Turn {
                id: uuid::Uuid::new_v4().to_string(),
                session_id: id.clone(),
                sequence: entry.turns_recorded,
                input,
                output,
                created_at: now,
            };
            (turn, entry.clone())
        };
        self.store.append_turn(&turn).await?;
        self.persist(&snapshot).await?;
        Ok(turn)
    }

    async fn persist(&self, session: &InterviewSession) -> CoreResult<()> {
        self.store.put_session(session).await.map_err(|e| {
            error!(session = %session.id, "failed to persist session: {}", e);
            e
        })
    }
}
