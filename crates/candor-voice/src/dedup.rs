//! Guards the dispatcher against processing the same agent reply twice.
//!
//! Webhook workflows can deliver a reply more than once, and UI re-mounts can fire the
//! same request twice. Replies that normalize to the same key for a session inside the
//! window are redeliveries. Entries are swept lazily on every call.

use crate::reply::PRIMARY_TEXT_FIELDS;
use candor_core::SessionId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(30);

/// Injectable dedup store: `new`, `clear(session)`, `dispose`.
pub struct ResponseDeduplicator {
    window: Duration,
    entries: DashMap<(SessionId, String), Instant>,
}

impl Default for ResponseDeduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}

impl ResponseDeduplicator {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: DashMap::new(),
        }
    }

    /// True when an equal reply was seen for this session inside the window.
    /// Non-duplicates are recorded; duplicates do not refresh the original timestamp.
    pub fn is_duplicate(&self, session_id: &SessionId, payload: &Value) -> bool {
        let now = Instant::now();
        self.sweep(now);

        let key = (session_id.clone(), normalized_key(payload));
        match self.entries.entry(key) {
            Entry::Occupied(mut seen) => {
                if now.duration_since(*seen.get()) < self.window {
                    debug!(session = %session_id, "duplicate agent reply suppressed");
                    true
                } else {
                    seen.insert(now);
                    false
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                false
            }
        }
    }

    /// Forget every entry of one session (fresh attempt or teardown).
    pub fn clear(&self, session_id: &SessionId) {
        self.entries.retain(|(sid, _), _| sid != session_id);
    }

    /// Drop all entries.
    pub fn dispose(&self) {
        self.entries.clear();
        info!("dedup store disposed");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn sweep(&self, now: Instant) {
        let window = self.window;
        self.entries
            .retain(|_, seen| now.duration_since(*seen) < window);
    }
}

/// Trim strings; for objects trim only the primary text field; arrays key on their first element.
fn normalize(payload: &Value) -> Value {
    match payload {
        Value::String(s) => Value::String(s.trim().to_string()),
        Value::Array(items) => items.first().map(normalize).unwrap_or(Value::Null),
        Value::Object(map) => {
            let mut map = map.clone();
            if let Some(field) = PRIMARY_TEXT_FIELDS
                .iter()
                .find(|f| map.get(**f).and_then(Value::as_str).is_some())
            {
                if let Some(Value::String(text)) = map.get_mut(*field) {
                    *text = text.trim().to_string();
                }
            }
            Value::Object(map)
        }
        other => other.clone(),
    }
}

fn normalized_key(payload: &Value) -> String {
    normalize(payload).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn second_delivery_inside_window_is_duplicate() {
        let dedup = ResponseDeduplicator::default();
        let sid = SessionId::from("s1");
        let reply = json!({"output": "Hello! Tell me about your experience."});
        assert!(!dedup.is_duplicate(&sid, &reply));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(dedup.is_duplicate(&sid, &reply));
    }

    #[tokio::test(start_paused = true)]
    async fn delivery_after_window_is_new() {
        let dedup = ResponseDeduplicator::new(Duration::from_secs(30));
        let sid = SessionId::from("s1");
        let reply = json!("Next question?");
        assert!(!dedup.is_duplicate(&sid, &reply));
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(!dedup.is_duplicate(&sid, &reply));
    }

    #[tokio::test(start_paused = true)]
    async fn duplicates_do_not_extend_the_window() {
        let dedup = ResponseDeduplicator::new(Duration::from_secs(30));
        let sid = SessionId::from("s1");
        let reply = json!("Same");
        assert!(!dedup.is_duplicate(&sid, &reply));
        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(dedup.is_duplicate(&sid, &reply));
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(!dedup.is_duplicate(&sid, &reply));
    }

    #[tokio::test]
    async fn whitespace_in_primary_field_does_not_defeat_dedup() {
        let dedup = ResponseDeduplicator::default();
        let sid = SessionId::from("s1");
        assert!(!dedup.is_duplicate(&sid, &json!({"output": "Hi there", "run": 1})));
        assert!(dedup.is_duplicate(&sid, &json!({"output": "  Hi there\n", "run": 1})));
        assert!(dedup.is_duplicate(&sid, &json!([{"output": "Hi there ", "run": 1}])));
        // other fields still distinguish payloads
        assert!(!dedup.is_duplicate(&sid, &json!({"output": "Hi there", "run": 2})));
    }

    #[tokio::test]
    async fn sessions_do_not_interfere() {
        let dedup = ResponseDeduplicator::default();
        let reply = json!("Welcome!");
        assert!(!dedup.is_duplicate(&SessionId::from("a"), &reply));
        assert!(!dedup.is_duplicate(&SessionId::from("b"), &reply));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_purges_every_session() {
        let dedup = ResponseDeduplicator::new(Duration::from_secs(30));
        dedup.is_duplicate(&SessionId::from("a"), &json!("one"));
        dedup.is_duplicate(&SessionId::from("b"), &json!("two"));
        assert_eq!(dedup.len(), 2);
        tokio::time::advance(Duration::from_secs(40)).await;
        dedup.is_duplicate(&SessionId::from("c"), &json!("three"));
        assert_eq!(dedup.len(), 1);
    }

    #[tokio::test]
    async fn clear_unblocks_a_fresh_attempt() {
        let dedup = ResponseDeduplicator::default();
        let sid = SessionId::from("s1");
        let other = SessionId::from("s2");
        let reply = json!({"output": "Hi"});
        dedup.is_duplicate(&sid, &reply);
        dedup.is_duplicate(&other, &reply);
        dedup.clear(&sid);
        assert!(!dedup.is_duplicate(&sid, &reply));
        assert!(dedup.is_duplicate(&other, &reply));
        dedup.dispose();
        assert!(dedup.is_empty());
    }
}
