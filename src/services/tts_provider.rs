// Speech Synthesis Provider
// OpenAI-compatible /audio/speech client used for voice substitution

use crate::services::delivery::SpeechSynthesizer;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::env;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use tracing::debug;

const TTS_DEFAULT_URL: &str = "https://api.openai.com/v1/audio/speech";
const TTS_DEFAULT_MODEL: &str = "tts-1";
const TTS_DEFAULT_VOICE: &str = "alloy";

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Response carried no audio")]
    MissingAudio,
    #[error("Failed to write audio file: {0}")]
    Io(#[from] std::io::Error),
    #[error("API key not configured")]
    MissingApiKey,
}

#[derive(Debug, Clone, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
}

pub struct HttpSpeechSynthesizer {
    client: Client,
    url: String,
    api_key: Option<String>,
    model: String,
    voice: String,
    audio_dir: PathBuf,
}

impl HttpSpeechSynthesizer {
    /// Client writing audio into `audio_dir`. Endpoint and key come from
    /// `REPLY_SPLITTER_TTS_URL` and `REPLY_SPLITTER_TTS_API_KEY`.
    pub fn new(audio_dir: PathBuf) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self::with_client(client, audio_dir)
    }

    pub fn with_proxy(audio_dir: PathBuf, proxy_url: &str) -> Result<Self, SynthesisError> {
        let proxy = reqwest::Proxy::all(proxy_url)?;
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .proxy(proxy)
            .build()?;
        Ok(Self::with_client(client, audio_dir))
    }

    fn with_client(client: Client, audio_dir: PathBuf) -> Self {
        let url = env::var("REPLY_SPLITTER_TTS_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| TTS_DEFAULT_URL.to_string());

        Self {
            client,
            url,
            api_key: get_api_key(),
            model: TTS_DEFAULT_MODEL.to_string(),
            voice: TTS_DEFAULT_VOICE.to_string(),
            audio_dir,
        }
    }

    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.url
    }

    async fn request_audio(&self, text: &str) -> Result<Vec<u8>, SynthesisError> {
        let api_key = self.api_key.as_deref().ok_or(SynthesisError::MissingApiKey)?;
        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
        };

        let start = Instant::now();
        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let bytes = response.bytes().await?;
        debug!(
            latency_ms = start.elapsed().as_millis() as u64,
            bytes = bytes.len(),
            "[tts] speech received"
        );
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Option<PathBuf>, SynthesisError> {
        let audio = self.request_audio(text).await?;
        if audio.is_empty() {
            return Err(SynthesisError::MissingAudio);
        }

        tokio::fs::create_dir_all(&self.audio_dir).await?;
        let path = self
            .audio_dir
            .join(format!("{}.mp3", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, &audio).await?;
        Ok(Some(path))
    }
}

/// API key from the environment, first non-empty wins.
pub fn get_api_key() -> Option<String> {
    ["REPLY_SPLITTER_TTS_API_KEY", "OPENAI_API_KEY"]
        .iter()
        .filter_map(|key| env::var(key).ok())
        .map(|val| val.trim().to_string())
        .find(|val| !val.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio_dir() -> PathBuf {
        std::env::temp_dir().join(format!("reply-splitter-tts-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(SpeechRequest {
            model: "tts-1",
            input: "hello",
            voice: "alloy",
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"model": "tts-1", "input": "hello", "voice": "alloy"})
        );
    }

    #[test]
    fn test_builder_overrides() {
        let synth = HttpSpeechSynthesizer::new(audio_dir())
            .with_endpoint("http://localhost:8000/v1/audio/speech")
            .with_voice("nova");
        assert_eq!(synth.endpoint(), "http://localhost:8000/v1/audio/speech");
        assert_eq!(synth.voice, "nova");
        assert_eq!(synth.model, TTS_DEFAULT_MODEL);
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_request() {
        let synth = HttpSpeechSynthesizer::new(audio_dir()).with_api_key(None);
        let err = synth.synthesize("hello").await.unwrap_err();
        assert!(matches!(err, SynthesisError::MissingApiKey));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_http_error() {
        let synth = HttpSpeechSynthesizer::new(audio_dir())
            .with_endpoint("http://127.0.0.1:9/v1/audio/speech")
            .with_api_key(Some("test-key".to_string()));
        let err = synth.synthesize("hello").await.unwrap_err();
        assert!(matches!(err, SynthesisError::HttpError(_)));
    }
}
