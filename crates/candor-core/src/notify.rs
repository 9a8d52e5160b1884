//! Notification collaborator: "session finished" hooks.
//!
//! The lifecycle invokes every registered hook exactly once per terminal transition.
//! Hooks must not fail the transition, so they return nothing; implementations log.

use crate::model::InterviewSession;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

#[async_trait]
pub trait SessionHook: Send + Sync {
    async fn on_session_finished(&self, session: &InterviewSession);
}

/// Posts a report trigger to an external workflow webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            url: url.into(),
            client,
        }
    }

    fn payload(session: &InterviewSession) -> serde_json::Value {
        serde_json::json!({
            "action": "interview_finished",
            "session_id": session.id.as_str(),
            "candidate_id": session.participant_id,
            "job_description_id": session.context_id,
            "status": session.status.as_str(),
            "questions_asked": session.questions_asked,
            "questions_answered": session.questions_answered,
            "started_at": session.started_at,
            "ended_at": session.ended_at,
        })
    }
}

#[async_trait]
impl SessionHook for WebhookNotifier {
    async fn on_session_finished(&self, session: &InterviewSession) {
        let body = Self::payload(session);
        match self.client.post(&self.url).json(&body).send().await {
            Ok(res) if res.status().is_success() => {
                info!(session = %session.id, "report webhook notified");
            }
            Ok(res) => {
                warn!(session = %session.id, status = %res.status(), "report webhook rejected notification");
            }
            Err(e) => {
                warn!(session = %session.id, "report webhook unreachable: {}", e);
            }
        }
    }
}
