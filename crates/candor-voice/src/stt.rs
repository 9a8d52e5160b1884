//! **Speech-to-Text**: Recognize captured audio through an OpenAI-compatible
//! transcription API (OpenAI Whisper, OpenRouter, ...).

use crate::capture::{RecognitionOptions, RecordedAudio, SpeechRecognizer, Transcript};
use crate::error::{TranscriptionCause, VoiceError, VoiceResult};
use async_trait::async_trait;
use candor_core::{env_first, env_opt_string};
use std::io::Cursor;
use std::time::Duration;
use tracing::{debug, warn};

/// Encode mono f32 PCM as 16-bit WAV for upload.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &s in samples {
            writer.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Uses `STT_API_URL` (default https://api.openai.com/v1), `STT_API_KEY` and `STT_MODEL` (default whisper-1).
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleStt {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleStt {
    pub fn from_env() -> VoiceResult<Self> {
        let api_key = env_first(&["STT_API_KEY", "OPENAI_API_KEY"])
            .ok_or_else(|| VoiceError::Config("STT requires STT_API_KEY or OPENAI_API_KEY".to_string()))?;
        let base_url =
            env_opt_string("STT_API_URL").unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        let model = env_opt_string("STT_MODEL").unwrap_or_else(|| "whisper-1".to_string());
        Self::new(base_url, api_key, model)
    }

    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> VoiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| VoiceError::Config(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }
}

/// "en-US" -> "en"; the API takes ISO-639-1 codes.
fn iso_language(tag: &str) -> &str {
    tag.split(['-', '_']).next().unwrap_or(tag)
}

#[async_trait]
impl SpeechRecognizer for OpenAiCompatibleStt {
    async fn recognize(
        &self,
        audio: &RecordedAudio,
        options: &RecognitionOptions,
    ) -> Result<Transcript, TranscriptionCause> {
        if audio.samples.is_empty() {
            return Err(TranscriptionCause::NoSpeech);
        }
        let wav = encode_wav(&audio.samples, audio.sample_rate).map_err(|e| {
            warn!("WAV encoding failed: {}", e);
            TranscriptionCause::Device
        })?;
        let url = format!("{}/audio/transcriptions", self.base_url.trim_end_matches('/'));
        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|_| TranscriptionCause::Device)?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("language", iso_language(&options.language).to_string());
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                warn!("STT request failed: {}", e);
                TranscriptionCause::Network
            })?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!("STT API error {}: {}", status, body);
            return Err(TranscriptionCause::Network);
        }
        let json: serde_json::Value = res.json().await.map_err(|e| {
            warn!("STT response unreadable: {}", e);
            TranscriptionCause::Network
        })?;
        let text = json
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        debug!(chars = text.len(), "transcribed");
        if text.is_empty() {
            return Err(TranscriptionCause::NoSpeech);
        }
        // Whisper reports no confidence for plain-text responses.
        Ok(Transcript {
            text,
            confidence: 1.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};

    #[test]
    fn wav_round_trips_through_hound() {
        let samples = vec![0.0, 0.5, -0.5, 1.0];
        let bytes = encode_wav(&samples, 16_000).unwrap();
        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len(), 4);
    }

    #[test]
    fn language_tags_are_shortened() {
        assert_eq!(iso_language("en-US"), "en");
        assert_eq!(iso_language("hi_IN"), "hi");
        assert_eq!(iso_language("en"), "en");
    }

    async fn serve(reply: serde_json::Value) -> String {
        let app = Router::new().route(
            "/v1/audio/transcriptions",
            post(move || {
                let reply = reply.clone();
                async move { Json(reply) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    fn audio() -> RecordedAudio {
        RecordedAudio {
            samples: vec![0.1; 1600],
            sample_rate: 16_000,
            duration: Duration::from_millis(100),
        }
    }

    #[tokio::test]
    async fn transcribes_through_the_api() {
        let base = serve(serde_json::json!({"text": " I have five years of Rust. "})).await;
        let stt = OpenAiCompatibleStt::new(base, "key", "whisper-1").unwrap();
        let t = stt.recognize(&audio(), &RecognitionOptions::default()).await.unwrap();
        assert_eq!(t.text, "I have five years of Rust.");
    }

    #[tokio::test]
    async fn empty_text_is_no_speech() {
        let base = serve(serde_json::json!({"text": ""})).await;
        let stt = OpenAiCompatibleStt::new(base, "key", "whisper-1").unwrap();
        assert_eq!(
            stt.recognize(&audio(), &RecognitionOptions::default()).await,
            Err(TranscriptionCause::NoSpeech)
        );
    }

    #[tokio::test]
    async fn unreachable_api_is_a_network_failure() {
        let stt = OpenAiCompatibleStt::new("http://127.0.0.1:9/v1", "key", "whisper-1").unwrap();
        assert_eq!(
            stt.recognize(&audio(), &RecognitionOptions::default()).await,
            Err(TranscriptionCause::Network)
        );
    }
}
