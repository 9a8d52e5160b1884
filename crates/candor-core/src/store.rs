//! Persistence collaborators: session/turn records and the participant/context directory.
//!
//! The coordinator needs only read-by-id and append/update with last-write-wins
//! semantics; no transactions are assumed. Two backends are provided: an in-memory
//! store (tests, single-process demos) and a sled store with a DashMap hot cache.

use crate::error::{CoreError, CoreResult};
use crate::model::{ContextRecord, InterviewSession, ParticipantRecord, SessionId, Turn};
use async_trait::async_trait;
use dashmap::DashMap;
use sled::Db;
use std::path::Path;
use std::sync::Arc;

/// Session and turn records.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_session(&self, id: &SessionId) -> CoreResult<Option<InterviewSession>>;

    /// Insert or overwrite (last write wins).
    async fn put_session(&self, session: &InterviewSession) -> CoreResult<()>;

    async fn append_turn(&self, turn: &Turn) -> CoreResult<()>;

    /// Turns of one session ordered by sequence.
    async fn list_turns(&self, id: &SessionId) -> CoreResult<Vec<Turn>>;
}

/// Lookup of the records a session references.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn participant(&self, id: &str) -> CoreResult<Option<ParticipantRecord>>;

    async fn context(&self, id: &str) -> CoreResult<Option<ContextRecord>>;
}

/// Process-local store. Also serves as a directory seeded through `add_*`.
#[derive(Default)]
pub struct InMemoryStore {
    sessions: DashMap<SessionId, InterviewSession>,
    turns: DashMap<SessionId, Vec<Turn>>,
    participants: DashMap<String, ParticipantRecord>,
    contexts: DashMap<String, ContextRecord>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_participant(&self, record: ParticipantRecord) {
        self.participants.insert(record.id.clone(), record);
    }

    pub fn add_context(&self, record: ContextRecord) {
        self.contexts.insert(record.id.clone(), record);
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn get_session(&self, id: &SessionId) -> CoreResult<Option<InterviewSession>> {
        Ok(self.sessions.get(id).map(|s| s.clone()))
    }

    async fn put_session(&self, session: &InterviewSession) -> CoreResult<()> {
        self.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn append_turn(&self, turn: &Turn) -> CoreResult<()> {
        self.turns
            .entry(turn.session_id.clone())
            .or_default()
            .push(turn.clone());
        Ok(())
    }

    async fn list_turns(&self, id: &SessionId) -> CoreResult<Vec<Turn>> {
        let mut turns = self.turns.get(id).map(|t| t.clone()).unwrap_or_default();
        turns.sort_by_key(|t| t.sequence);
        Ok(turns)
    }
}

#[async_trait]
impl Directory for InMemoryStore {
    async fn participant(&self, id: &str) -> CoreResult<Option<ParticipantRecord>> {
        Ok(self.participants.get(id).map(|p| p.clone()))
    }

    async fn context(&self, id: &str) -> CoreResult<Option<ContextRecord>> {
        Ok(self.contexts.get(id).map(|c| c.clone()))
    }
}

const SESSION_PREFIX: &str = "session/";
const TURN_PREFIX: &str = "turn/";
const PARTICIPANT_PREFIX: &str = "participant/";
const CONTEXT_PREFIX: &str = "context/";

fn session_key(id: &SessionId) -> String {
    format!("{}{}", SESSION_PREFIX, id)
}

/// Zero-padded sequence keeps turns in order under sled's lexicographic scan.
fn turn_key(id: &SessionId, sequence: u32) -> String {
    format!("{}{}/{:010}", TURN_PREFIX, id, sequence)
}

/// Sled-backed store with a hot cache for session records (JSON values).
pub struct SledStore {
    db: Db,
    /// Hot cache: session id -> record. Checked before sled.
    cache: Arc<DashMap<SessionId, InterviewSession>>,
}

impl SledStore {
    /// Opens or creates the store at `path` (see `CoreConfig::storage_path`).
    pub fn open_path<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let db = sled::open(path)?;
        Ok(Self {
            db,
            cache: Arc::new(DashMap::new()),
        })
    }

    pub fn put_participant(&self, record: &ParticipantRecord) -> CoreResult<()> {
        let key = format!("{}{}", PARTICIPANT_PREFIX, record.id);
        self.db.insert(key.as_bytes(), serde_json::to_vec(record)?)?;
        Ok(())
    }

    pub fn put_context(&self, record: &ContextRecord) -> CoreResult<()> {
        let key = format!("{}{}", CONTEXT_PREFIX, record.id);
        self.db.insert(key.as_bytes(), serde_json::to_vec(record)?)?;
        Ok(())
    }

    pub fn flush(&self) -> CoreResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> CoreResult<Option<T>> {
        match self.db.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SessionStore for SledStore {
    async fn get_session(&self, id: &SessionId) -> CoreResult<Option<InterviewSession>> {
        if let Some(s) = self.cache.get(id) {
            return Ok(Some(s.clone()));
        }
        let out: Option<InterviewSession> = self.get_json(&session_key(id))?;
        if let Some(ref session) = out {
            self.cache.insert(id.clone(), session.clone());
        }
        Ok(out)
    }

    async fn put_session(&self, session: &InterviewSession) -> CoreResult<()> {
        let bytes = serde_json::to_vec(session)?;
        self.db.insert(session_key(&session.id).as_bytes(), bytes)?;
        self.cache.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn append_turn(&self, turn: &Turn) -> CoreResult<()> {
        let key = turn_key(&turn.session_id, turn.sequence);
        let bytes = serde_json::to_vec(turn)?;
        self.db.insert(key.as_bytes(), bytes)?;
        Ok(())
    }

    async fn list_turns(&self, id: &SessionId) -> CoreResult<Vec<Turn>> {
        let prefix = format!("{}{}/", TURN_PREFIX, id);
        self.db
            .scan_prefix(prefix.as_bytes())
            .values()
            .map(|v| {
                let bytes = v?;
                serde_json::from_slice::<Turn>(&bytes).map_err(CoreError::from)
            })
            .collect()
    }
}

#[async_trait]
impl Directory for SledStore {
    async fn participant(&self, id: &str) -> CoreResult<Option<ParticipantRecord>> {
        self.get_json(&format!("{}{}", PARTICIPANT_PREFIX, id))
    }

    async fn context(&self, id: &str) -> CoreResult<Option<ContextRecord>> {
        self.get_json(&format!("{}{}", CONTEXT_PREFIX, id))
    }
}
