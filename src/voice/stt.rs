//! Speech-to-text over the Whisper or Deepgram HTTP APIs

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use super::Transcriber;
use crate::config::{SttProvider, VoiceConfig};
use crate::{Error, Result};

const WHISPER_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const DEEPGRAM_URL: &str = "https://api.deepgram.com/v1/listen";

#[derive(Deserialize)]
struct WhisperResponse {
    text: String,
}

#[derive(Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

impl DeepgramResponse {
    /// Best alternative of the first channel, or empty
    fn into_transcript(self) -> String {
        self.results
            .channels
            .into_iter()
            .next()
            .and_then(|c| c.alternatives.into_iter().next())
            .map(|a| a.transcript)
            .unwrap_or_default()
    }
}

/// Transcriber for the configured provider
pub struct SpeechToText {
    client: reqwest::Client,
    provider: SttProvider,
    api_key: String,
    model: String,
}

impl SpeechToText {
    /// Build a transcriber from voice settings
    ///
    /// Whisper uses `openai_api_key`; Deepgram takes its key from the voice
    /// settings.
    ///
    /// # Errors
    ///
    /// Returns error if the provider's API key is missing
    pub fn from_config(voice: &VoiceConfig, openai_api_key: &str) -> Result<Self> {
        let api_key = match voice.stt_provider {
            SttProvider::Whisper => openai_api_key.to_string(),
            SttProvider::Deepgram => voice.deepgram_api_key.clone().unwrap_or_default(),
        };
        if api_key.is_empty() {
            return Err(Error::Config(format!(
                "{:?} API key required for STT",
                voice.stt_provider
            )));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            provider: voice.stt_provider,
            api_key,
            model: voice.stt_model.clone(),
        })
    }

    /// Provider-specific transcription request for WAV bytes
    fn request(&self, audio: Vec<u8>) -> Result<reqwest::RequestBuilder> {
        let request = match self.provider {
            SttProvider::Whisper => {
                let file = reqwest::multipart::Part::bytes(audio)
                    .file_name("recorded_audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Transcription(e.to_string()))?;
                let form = reqwest::multipart::Form::new()
                    .part("file", file)
                    .text("model", self.model.clone());

                self.client
                    .post(WHISPER_URL)
                    .bearer_auth(&self.api_key)
                    .multipart(form)
            }
            SttProvider::Deepgram => self
                .client
                .post(DEEPGRAM_URL)
                .query(&[("model", self.model.as_str()), ("punctuate", "true")])
                .header("Authorization", format!("Token {}", self.api_key))
                .header("Content-Type", "audio/wav")
                .body(audio),
        };
        Ok(request)
    }

    async fn parse(&self, response: reqwest::Response) -> Result<String> {
        let text = match self.provider {
            SttProvider::Whisper => response.json::<WhisperResponse>().await.map(|r| r.text),
            SttProvider::Deepgram => response
                .json::<DeepgramResponse>()
                .await
                .map(DeepgramResponse::into_transcript),
        };
        text.map_err(|e| Error::Transcription(e.to_string()))
    }
}

#[async_trait]
impl Transcriber for SpeechToText {
    async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        let audio = tokio::fs::read(audio_path).await.map_err(|e| {
            Error::Transcription(format!("cannot read {}: {e}", audio_path.display()))
        })?;

        tracing::debug!(
            path = %audio_path.display(),
            audio_bytes = audio.len(),
            provider = ?self.provider,
            "starting transcription"
        );

        let response = self.request(audio)?.send().await.map_err(|e| {
            tracing::error!(error = %e, provider = ?self.provider, "STT request failed");
            Error::Transcription(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "STT API error");
            return Err(Error::Transcription(format!(
                "{:?} returned {status}: {body}",
                self.provider
            )));
        }

        let transcript = self.parse(response).await?;
        tracing::info!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }
}
