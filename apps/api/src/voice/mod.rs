//! Voice Adapter — Lemonfox text-to-speech and speech-to-text bridge.
//!
//! Strictly optional: the credential may be absent, in which case every call
//! fails eagerly with `NotConfigured` before any network I/O. Session
//! gating (when a session id accompanies a request) lives in the handlers,
//! not here.

use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

const API_BASE_URL: &str = "https://api.lemonfox.ai/v1";
/// Hard timeout per voice request; audio synthesis is slow.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Default interviewer voice.
pub const DEFAULT_VOICE: &str = "jessica";

/// Caps enforced by the handlers before any provider call.
pub const MAX_SPEAK_CHARS: usize = 2000;
pub const MAX_AUDIO_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("voice API key is not configured")]
    NotConfigured,

    #[error("voice API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Client for the voice provider. Construct once at startup and share via
/// `AppState`.
#[derive(Clone)]
pub struct VoiceClient {
    client: Client,
    api_key: Option<String>,
}

impl VoiceClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn key(&self) -> Result<&str, VoiceError> {
        self.api_key.as_deref().ok_or(VoiceError::NotConfigured)
    }

    /// Converts text to mp3 audio. The text is auto-punctuated first so the
    /// synthesized speech gets a natural final pause.
    pub async fn speak(&self, text: &str, voice: &str) -> Result<Bytes, VoiceError> {
        let key = self.key()?;
        let input = ensure_terminal_punctuation(text);

        let response = self
            .client
            .post(format!("{API_BASE_URL}/audio/speech"))
            .bearer_auth(key)
            .json(&serde_json::json!({
                "input": input,
                "voice": voice,
                "response_format": "mp3",
                "language": "en",
                "speed": 1.0,
                "quality": "medium",
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(VoiceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let audio = response.bytes().await?;
        debug!("Synthesized {} bytes of audio", audio.len());
        Ok(audio)
    }

    /// Converts recorded audio to text.
    pub async fn transcribe(&self, audio: Bytes) -> Result<String, VoiceError> {
        let key = self.key()?;

        let file_part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name("recording.webm")
            .mime_str("audio/webm")?;
        let form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("language", "english")
            .text("response_format", "json");

        let response = self
            .client
            .post(format!("{API_BASE_URL}/audio/transcriptions"))
            .bearer_auth(key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(VoiceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let transcription: TranscriptionResponse = response.json().await?;
        debug!("Transcribed {} chars of text", transcription.text.len());
        Ok(transcription.text)
    }
}

/// Appends a final `.` when the text lacks sentence-ending punctuation.
fn ensure_terminal_punctuation(text: &str) -> String {
    if text.ends_with('.') || text.ends_with('?') || text.ends_with('!') {
        text.to_string()
    } else {
        format!("{text}.")
    }
}
