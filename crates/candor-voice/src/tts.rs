//! **Speech synthesis**: Render the interviewer's reply with a provider fallback chain.
//!
//! Providers are tried in order: OpenAI-compatible neural TTS, ElevenLabs, then the local
//! fallback which never fails. Which providers exist is decided once, from environment
//! presence, when the orchestrator is built.

use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use candor_core::{env_first, env_opt_string, AudioSummary, VoiceGender, VoiceProfile};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const WORDS_PER_MINUTE: u64 = 150;
const MIN_DURATION: Duration = Duration::from_secs(1);

/// Spoken duration of `text` at 150 words per minute, never below one second.
pub fn estimate_duration(text: &str) -> Duration {
    let words = text.split_whitespace().count() as u64;
    let ms = words * 60_000 / WORDS_PER_MINUTE;
    Duration::from_millis(ms).max(MIN_DURATION)
}

#[derive(Debug, Clone, PartialEq)]
pub enum AudioSource {
    /// Encoded audio owned by the caller (dropping the handle frees it).
    Asset { bytes: Vec<u8>, mime: String },
    /// The provider speaks directly; there is nothing to play.
    DirectPlayback,
}

/// Result of a successful synthesis.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioHandle {
    pub source: AudioSource,
    pub duration: Duration,
    pub provider: String,
}

impl AudioHandle {
    pub fn asset(bytes: Vec<u8>, mime: impl Into<String>, duration: Duration, provider: impl Into<String>) -> Self {
        Self {
            source: AudioSource::Asset {
                bytes,
                mime: mime.into(),
            },
            duration,
            provider: provider.into(),
        }
    }

    /// True for direct playback: the audio started when synthesis returned.
    pub fn already_playing(&self) -> bool {
        matches!(self.source, AudioSource::DirectPlayback)
    }

    pub fn summary(&self) -> AudioSummary {
        AudioSummary {
            provider: self.provider.clone(),
            duration_ms: self.duration.as_millis() as u64,
            direct_playback: self.already_playing(),
        }
    }
}

/// One synthesis backend.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn synthesize(&self, text: &str, profile: &VoiceProfile) -> VoiceResult<AudioHandle>;
}

/// Map a profile onto an OpenAI voice name.
fn openai_voice(profile: &VoiceProfile) -> &'static str {
    match (profile.gender, profile.settings.stability >= 0.8) {
        (VoiceGender::Female, false) => "shimmer",
        (VoiceGender::Female, true) => "nova",
        (VoiceGender::Male, false) => "echo",
        (VoiceGender::Male, true) => "onyx",
    }
}

fn http_client(timeout: Duration) -> VoiceResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| VoiceError::Synthesis(e.to_string()))
}

/// Primary neural TTS over an OpenAI-compatible `/audio/speech` API (OpenAI, OpenRouter, ...).
/// Uses `TTS_API_URL` (default https://api.openai.com/v1), `TTS_API_KEY` and `TTS_MODEL` (default tts-1).
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleTts {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleTts {
    pub fn from_env() -> VoiceResult<Self> {
        let api_key = env_first(&["TTS_API_KEY", "OPENAI_API_KEY"])
            .ok_or_else(|| VoiceError::Config("TTS requires TTS_API_KEY or OPENAI_API_KEY".to_string()))?;
        let base_url =
            env_opt_string("TTS_API_URL").unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        let model = env_opt_string("TTS_MODEL").unwrap_or_else(|| "tts-1".to_string());
        Self::new(base_url, api_key, model)
    }

    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> VoiceResult<Self> {
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            client: http_client(Duration::from_secs(60))?,
        })
    }
}

#[async_trait]
impl SpeechProvider for OpenAiCompatibleTts {
    fn name(&self) -> &str {
        "openai-tts"
    }

    async fn synthesize(&self, text: &str, profile: &VoiceProfile) -> VoiceResult<AudioHandle> {
        let url = format!("{}/audio/speech", self.base_url.trim_end_matches('/'));
        let voice = openai_voice(profile);
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": voice,
            "response_format": "mp3",
        });
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| VoiceError::Synthesis(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(VoiceError::Synthesis(format!("TTS API error {}: {}", status, body)));
        }
        let bytes = res
            .bytes()
            .await
            .map_err(|e| VoiceError::Synthesis(e.to_string()))?;
        if bytes.is_empty() {
            return Err(VoiceError::Synthesis("TTS API returned no audio".to_string()));
        }
        Ok(AudioHandle::asset(
            bytes.to_vec(),
            "audio/mpeg",
            estimate_duration(text),
            self.name(),
        ))
    }
}

/// Voice-cloning TTS via ElevenLabs. Uses `ELEVENLABS_API_KEY` and `ELEVENLABS_MODEL`
/// (default eleven_monolingual_v1); the profile's `voice_id` and settings are sent as-is.
#[derive(Debug, Clone)]
pub struct ElevenLabsTts {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    client: reqwest::Client,
}

impl ElevenLabsTts {
    pub fn from_env() -> VoiceResult<Self> {
        let api_key = env_opt_string("ELEVENLABS_API_KEY")
            .ok_or_else(|| VoiceError::Config("ElevenLabs requires ELEVENLABS_API_KEY".to_string()))?;
        let model =
            env_opt_string("ELEVENLABS_MODEL").unwrap_or_else(|| "eleven_monolingual_v1".to_string());
        Self::new("https://api.elevenlabs.io", api_key, model)
    }

    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> VoiceResult<Self> {
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            client: http_client(Duration::from_secs(60))?,
        })
    }
}

#[async_trait]
impl SpeechProvider for ElevenLabsTts {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    async fn synthesize(&self, text: &str, profile: &VoiceProfile) -> VoiceResult<AudioHandle> {
        let url = format!(
            "{}/v1/text-to-speech/{}",
            self.base_url.trim_end_matches('/'),
            profile.voice_id
        );
        let settings = &profile.settings;
        let body = serde_json::json!({
            "text": text,
            "model_id": self.model,
            "voice_settings": {
                "stability": settings.stability,
                "similarity_boost": settings.similarity_boost,
                "style": settings.style.unwrap_or(0.0),
                "use_speaker_boost": settings.speaker_boost,
            },
        });
        let res = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/mpeg")
            .json(&body)
            .send()
            .await
            .map_err(|e| VoiceError::Synthesis(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(VoiceError::Synthesis(format!(
                "ElevenLabs API error {}: {}",
                status, body
            )));
        }
        let bytes = res
            .bytes()
            .await
            .map_err(|e| VoiceError::Synthesis(e.to_string()))?;
        if bytes.is_empty() {
            return Err(VoiceError::Synthesis("ElevenLabs returned no audio".to_string()));
        }
        Ok(AudioHandle::asset(
            bytes.to_vec(),
            "audio/mpeg",
            estimate_duration(text),
            self.name(),
        ))
    }
}

/// Last link in the chain. There is no local speech engine, so the reply is rendered as a
/// caption (the text the caller already shows) and the turn is held for its spoken length.
#[derive(Debug, Default)]
pub struct LocalFallbackTts;

impl LocalFallbackTts {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SpeechProvider for LocalFallbackTts {
    fn name(&self) -> &str {
        "local"
    }

    async fn synthesize(&self, text: &str, profile: &VoiceProfile) -> VoiceResult<AudioHandle> {
        info!(voice = %profile.name, "caption only: {}", text);
        Ok(AudioHandle {
            source: AudioSource::DirectPlayback,
            duration: estimate_duration(text),
            provider: self.name().to_string(),
        })
    }
}

/// Try each candidate in order and return the first success.
/// Every failure is logged; the collected `(name, error)` list is returned when all fail.
pub async fn first_success<C, T, F, Fut>(
    candidates: &[C],
    name: impl Fn(&C) -> String,
    mut attempt: F,
) -> Result<T, Vec<(String, VoiceError)>>
where
    C: Clone,
    F: FnMut(C) -> Fut,
    Fut: Future<Output = VoiceResult<T>>,
{
    let mut failures = Vec::new();
    for candidate in candidates {
        let label = name(candidate);
        match attempt(candidate.clone()).await {
            Ok(value) => {
                if !failures.is_empty() {
                    info!("{} succeeded after {} failure(s)", label, failures.len());
                }
                return Ok(value);
            }
            Err(e) => {
                warn!("{} failed, trying next: {}", label, e);
                failures.push((label, e));
            }
        }
    }
    Err(failures)
}

/// Ordered provider chain.
pub struct TtsOrchestrator {
    providers: Vec<Arc<dyn SpeechProvider>>,
}

impl TtsOrchestrator {
    pub fn new(providers: Vec<Arc<dyn SpeechProvider>>) -> Self {
        Self { providers }
    }

    /// Configured providers from the environment, always ending with the local fallback.
    pub fn from_env() -> Self {
        let mut providers: Vec<Arc<dyn SpeechProvider>> = Vec::new();
        match OpenAiCompatibleTts::from_env() {
            Ok(p) => providers.push(Arc::new(p)),
            Err(e) => debug!("neural TTS not configured: {}", e),
        }
        match ElevenLabsTts::from_env() {
            Ok(p) => providers.push(Arc::new(p)),
            Err(e) => debug!("ElevenLabs not configured: {}", e),
        }
        providers.push(Arc::new(LocalFallbackTts::new()));
        let orchestrator = Self::new(providers);
        info!(providers = ?orchestrator.provider_status(), "TTS chain ready");
        orchestrator
    }

    /// Provider names in fallback order.
    pub fn provider_status(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    pub async fn synthesize(&self, text: &str, profile: &VoiceProfile) -> VoiceResult<AudioHandle> {
        let text = text.trim();
        if text.is_empty() {
            return Err(VoiceError::InvalidInput("nothing to synthesize".to_string()));
        }
        let result = first_success(
            &self.providers,
            |p| p.name().to_string(),
            |p| async move { p.synthesize(text, profile).await },
        )
        .await;
        match result {
            Ok(handle) => {
                debug!(provider = %handle.provider, duration_ms = handle.duration.as_millis() as u64, "synthesized reply");
                Ok(handle)
            }
            Err(failures) => {
                let detail = failures
                    .iter()
                    .map(|(name, e)| format!("{}: {}", name, e))
                    .collect::<Vec<_>>()
                    .join("; ");
                warn!("all TTS providers failed: {}", detail);
                Err(VoiceError::Synthesis(if detail.is_empty() {
                    "no TTS providers configured".to_string()
                } else {
                    detail
                }))
            }
        }
    }
}
