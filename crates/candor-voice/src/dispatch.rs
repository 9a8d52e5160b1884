//! **Turn dispatch**: Send the candidate's answer to the job's AI agent and bring back
//! its reply.
//!
//! The session's own agent endpoint is tried first. When it is missing, or rejects the
//! call as not-found or cross-origin, the process-wide default endpoint is tried once.
//! A transport failure after that marks the session failed.

use crate::capture::Utterance;
use crate::dedup::ResponseDeduplicator;
use crate::error::{DispatchCause, VoiceError, VoiceResult};
use crate::reply::{normalize_reply, ReplyText};
use async_trait::async_trait;
use candor_core::{FinishOutcome, InterviewSession, SessionLifecycle, SessionStatus};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// JSON body posted to the agent endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    pub action: String,
    pub session_id: String,
    pub candidate_id: String,
    pub job_description_id: String,
    pub candidate_response: String,
    /// RFC 3339.
    pub timestamp: String,
}

impl AgentRequest {
    pub fn candidate_response(session: &InterviewSession, utterance: &Utterance) -> Self {
        Self {
            action: "candidate_response".to_string(),
            session_id: session.id.to_string(),
            candidate_id: session.participant_id.clone(),
            job_description_id: session.context_id.clone(),
            candidate_response: utterance.text.clone(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Delivers one request to one endpoint and returns the raw response body.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    async fn send(&self, endpoint: &str, request: &AgentRequest) -> VoiceResult<String>;
}

/// reqwest transport with a per-request timeout.
pub struct HttpAgentTransport {
    client: reqwest::Client,
}

impl HttpAgentTransport {
    pub fn new(timeout: Duration) -> VoiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VoiceError::Config(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AgentTransport for HttpAgentTransport {
    async fn send(&self, endpoint: &str, request: &AgentRequest) -> VoiceResult<String> {
        let res = self
            .client
            .post(endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| VoiceError::Dispatch {
                cause: DispatchCause::Network,
                message: format!("agent endpoint unreachable: {}", e),
            })?;
        let status = res.status();
        if !status.is_success() {
            let cause = DispatchCause::from_status(status.as_u16());
            let body = res.text().await.unwrap_or_default();
            debug!(endpoint, %status, "agent error body: {}", body);
            return Err(VoiceError::Dispatch {
                cause,
                message: format!("agent endpoint answered {}", status),
            });
        }
        res.text().await.map_err(|e| VoiceError::Dispatch {
            cause: DispatchCause::Network,
            message: format!("agent reply could not be read: {}", e),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentReply {
    pub text: ReplyText,
    /// Parsed payload as received.
    pub payload: Value,
    /// Endpoint that answered.
    pub endpoint: String,
    /// 1 when the first endpoint answered, 2 after the fallback.
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Reply(AgentReply),
    /// Redelivery of a reply already processed inside the dedup window.
    Suppressed,
}

pub struct TurnDispatcher {
    transport: Arc<dyn AgentTransport>,
    default_endpoint: Option<String>,
    dedup: Arc<ResponseDeduplicator>,
    lifecycle: Arc<SessionLifecycle>,
}

fn usable(endpoint: Option<&str>) -> Option<&str> {
    endpoint.map(str::trim).filter(|e| !e.is_empty())
}

impl TurnDispatcher {
    pub fn new(
        transport: Arc<dyn AgentTransport>,
        default_endpoint: Option<String>,
        dedup: Arc<ResponseDeduplicator>,
        lifecycle: Arc<SessionLifecycle>,
    ) -> Self {
        Self {
            transport,
            default_endpoint,
            dedup,
            lifecycle,
        }
    }

    pub async fn dispatch(
        &self,
        session: &InterviewSession,
        utterance: &Utterance,
    ) -> VoiceResult<DispatchOutcome> {
        let request = AgentRequest::candidate_response(session, utterance);
        let (body, endpoint, attempts) = match self.send_with_fallback(session, &request).await {
            Ok(sent) => sent,
            Err(e) => {
                warn!(session = %session.id, "agent dispatch failed: {}", e);
                self.mark_failed(session).await;
                return Err(e);
            }
        };

        self.lifecycle.activate(&session.id).await?;

        let (text, payload) = normalize_reply(&body);
        match &text {
            ReplyText::Malformed(raw) => {
                warn!(session = %session.id, "agent reply has no recognizable text: {}", raw)
            }
            ReplyText::Empty => debug!(session = %session.id, "agent acknowledged without content"),
            ReplyText::Text(_) => {}
        }
        if !payload.is_null() && self.dedup.is_duplicate(&session.id, &payload) {
            info!(session = %session.id, "duplicate agent reply suppressed");
            return Ok(DispatchOutcome::Suppressed);
        }
        Ok(DispatchOutcome::Reply(AgentReply {
            text,
            payload,
            endpoint,
            attempts,
        }))
    }

    async fn send_with_fallback(
        &self,
        session: &InterviewSession,
        request: &AgentRequest,
    ) -> VoiceResult<(String, String, u32)> {
        let primary = usable(session.agent_endpoint.as_deref());
        let fallback = usable(self.default_endpoint.as_deref());

        let first_error = match primary {
            Some(endpoint) => match self.transport.send(endpoint, request).await {
                Ok(body) => return Ok((body, endpoint.to_string(), 1)),
                Err(e) => e,
            },
            None => VoiceError::Dispatch {
                cause: DispatchCause::NotFound,
                message: "no agent endpoint configured for this job".to_string(),
            },
        };

        let retryable = matches!(&first_error, VoiceError::Dispatch { cause, .. } if cause.is_retryable());
        let fallback = match fallback {
            Some(f) if retryable && Some(f) != primary => f,
            _ => return Err(first_error),
        };
        warn!(session = %session.id, fallback, "primary agent endpoint rejected the call ({}), retrying", first_error);
        let attempts = if primary.is_some() { 2 } else { 1 };
        let body = self.transport.send(fallback, request).await?;
        Ok((body, fallback.to_string(), attempts))
    }

    /// Failed dispatch ends the session. A pending session is started first so the
    /// transition stays pending → in_progress → failed.
    async fn mark_failed(&self, session: &InterviewSession) {
        if let Ok(current) = self.lifecycle.get(&session.id).await {
            if current.status == SessionStatus::Pending {
                if let Err(e) = self.lifecycle.activate(&session.id).await {
                    warn!(session = %session.id, "could not start session before failing it: {}", e);
                }
            }
        }
        if let Err(e) = self.lifecycle.finish(&session.id, FinishOutcome::Failed).await {
            warn!(session = %session.id, "could not mark session failed: {}", e);
        }
    }
}
