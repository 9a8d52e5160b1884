//! Coordinator configuration loaded from TOML and environment.
//!
//! Precedence: env `CANDOR__*` > file at `CANDOR_CONFIG` (default `config/candor`) > defaults.

use crate::error::CoreResult;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

fn default_dedup_window_secs() -> u64 {
    30
}

fn default_dispatch_timeout_secs() -> u64 {
    30
}

fn default_transcription_timeout_ms() -> u64 {
    5000
}

fn default_recognition_language() -> String {
    "en-US".to_string()
}

fn default_storage_path() -> String {
    "./data/candor".to_string()
}

/// Coordinator configuration.
///
/// | Key | Default | Description |
/// |-----|---------|-------------|
/// | default_agent_endpoint | none | Process-wide agent webhook used when a session has none or its own is rejected. |
/// | report_webhook | none | Receives a POST when a session reaches a terminal state. |
/// | storage_path | ./data/candor | Sled directory for the persistent store. |
/// | dedup_window_secs | 30 | Replies equal within this window are redeliveries. |
/// | dispatch_timeout_secs | 30 | Per-request timeout for the agent endpoint. |
/// | transcription_timeout_ms | 5000 | Hard cap on one recognition call. |
/// | recognition_language | en-US | Language passed to the recognizer. |
/// | auto_finish_on_closing | false | Complete the session when the agent clearly closes the interview. |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub default_agent_endpoint: Option<String>,
    #[serde(default)]
    pub report_webhook: Option<String>,
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,
    #[serde(default = "default_dispatch_timeout_secs")]
    pub dispatch_timeout_secs: u64,
    #[serde(default = "default_transcription_timeout_ms")]
    pub transcription_timeout_ms: u64,
    #[serde(default = "default_recognition_language")]
    pub recognition_language: String,
    #[serde(default)]
    pub auto_finish_on_closing: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            default_agent_endpoint: None,
            report_webhook: None,
            storage_path: default_storage_path(),
            dedup_window_secs: default_dedup_window_secs(),
            dispatch_timeout_secs: default_dispatch_timeout_secs(),
            transcription_timeout_ms: default_transcription_timeout_ms(),
            recognition_language: default_recognition_language(),
            auto_finish_on_closing: false,
        }
    }
}

impl CoreConfig {
    /// Load from file and environment.
    pub fn load() -> CoreResult<Self> {
        let config_path =
            std::env::var("CANDOR_CONFIG").unwrap_or_else(|_| "config/candor.toml".to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Load from a specific file (skipped when missing) layered under `CANDOR__*` env vars.
    pub fn load_from(path: &Path) -> CoreResult<Self> {
        let builder = config::Config::builder()
            .set_default("storage_path", default_storage_path())?
            .set_default("dedup_window_secs", default_dedup_window_secs() as i64)?
            .set_default("dispatch_timeout_secs", default_dispatch_timeout_secs() as i64)?
            .set_default(
                "transcription_timeout_ms",
                default_transcription_timeout_ms() as i64,
            )?
            .set_default("recognition_language", default_recognition_language())?
            .set_default("auto_finish_on_closing", false)?;

        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("CANDOR").separator("__"))
            .build()?;

        let mut cfg: CoreConfig = built.try_deserialize()?;
        cfg.default_agent_endpoint = cfg.default_agent_endpoint.filter(|s| !s.trim().is_empty());
        cfg.report_webhook = cfg.report_webhook.filter(|s| !s.trim().is_empty());
        Ok(cfg)
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window_secs)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }

    pub fn transcription_timeout(&self) -> Duration {
        Duration::from_millis(self.transcription_timeout_ms)
    }
}

/// Read a trimmed, non-empty string.
pub fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// First non-empty value among `names`.
pub fn env_first(names: &[&str]) -> Option<String> {
    names.iter().find_map(|n| env_opt_string(n))
}
