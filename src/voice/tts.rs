//! Text-to-speech over the `OpenAI` or `ElevenLabs` HTTP APIs
//!
//! Both providers answer with MP3 bytes, which the speaker decodes.

use async_trait::async_trait;
use serde_json::json;

use super::{AudioClip, Synthesizer};
use crate::config::{TtsProvider, VoiceConfig};
use crate::{Error, Result};

const OPENAI_SPEECH_URL: &str = "https://api.openai.com/v1/audio/speech";
const ELEVENLABS_URL: &str = "https://api.elevenlabs.io/v1/text-to-speech";

/// Speech synthesizer for the configured provider
pub struct TextToSpeech {
    client: reqwest::Client,
    provider: TtsProvider,
    api_key: String,
    model: String,
    voice: String,
    speed: f32,
}

impl TextToSpeech {
    /// Build a synthesizer from voice settings
    ///
    /// `openai_api_key` is used when the provider is `OpenAI`; `ElevenLabs`
    /// takes its key from the voice settings.
    ///
    /// # Errors
    ///
    /// Returns error if the provider's API key is missing
    pub fn from_config(voice: &VoiceConfig, openai_api_key: &str) -> Result<Self> {
        let api_key = match voice.tts_provider {
            TtsProvider::OpenAi => openai_api_key.to_string(),
            TtsProvider::ElevenLabs => voice.elevenlabs_api_key.clone().unwrap_or_default(),
        };
        if api_key.is_empty() {
            return Err(Error::Config(format!(
                "{:?} API key required for TTS",
                voice.tts_provider
            )));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            provider: voice.tts_provider,
            api_key,
            model: voice.tts_model.clone(),
            voice: voice.tts_voice.clone(),
            speed: voice.tts_speed,
        })
    }

    /// Provider-specific speech request for `text`
    fn request(&self, text: &str) -> reqwest::RequestBuilder {
        match self.provider {
            TtsProvider::OpenAi => self
                .client
                .post(OPENAI_SPEECH_URL)
                .bearer_auth(&self.api_key)
                .json(&json!({
                    "model": self.model,
                    "input": text,
                    "voice": self.voice,
                    "speed": self.speed,
                })),
            TtsProvider::ElevenLabs => self
                .client
                .post(format!("{ELEVENLABS_URL}/{}", self.voice))
                .header("xi-api-key", &self.api_key)
                .header("Accept", "audio/mpeg")
                .json(&json!({
                    "text": text,
                    "model_id": self.model,
                })),
        }
    }
}

#[async_trait]
impl Synthesizer for TextToSpeech {
    async fn synthesize(&self, text: &str) -> Result<AudioClip> {
        tracing::debug!(text, provider = ?self.provider, "synthesizing");

        let response = self
            .request(text)
            .send()
            .await
            .map_err(|e| Error::Synthesis(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!(
                "{:?} returned {status}: {body}",
                self.provider
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Synthesis(e.to_string()))?;
        if audio.is_empty() {
            return Err(Error::Synthesis("provider returned no audio".to_string()));
        }

        Ok(AudioClip::mp3(audio.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::config::SttProvider;

    fn voice(provider: TtsProvider) -> VoiceConfig {
        VoiceConfig {
            stt_provider: SttProvider::Whisper,
            stt_model: "whisper-1".into(),
            deepgram_api_key: None,
            tts_provider: provider,
            tts_model: "model-x".into(),
            tts_voice: "voice-y".into(),
            tts_speed: 1.25,
            elevenlabs_api_key: Some("el-key".into()),
            sounds_dir: PathBuf::from("sounds"),
            recording_path: PathBuf::from("rec.wav"),
        }
    }

    fn body_json(request: &reqwest::Request) -> serde_json::Value {
        let bytes = request.body().and_then(reqwest::Body::as_bytes).unwrap();
        serde_json::from_slice(bytes).unwrap()
    }

    #[test]
    fn openai_request_carries_voice_and_speed() {
        let tts = TextToSpeech::from_config(&voice(TtsProvider::OpenAi), "sk-test").unwrap();
        let request = tts.request("hello").build().unwrap();

        assert_eq!(request.url().as_str(), OPENAI_SPEECH_URL);
        assert_eq!(request.headers()["authorization"], "Bearer sk-test");
        assert_eq!(
            body_json(&request),
            json!({"model": "model-x", "input": "hello", "voice": "voice-y", "speed": 1.25})
        );
    }

    #[test]
    fn elevenlabs_request_targets_voice_id() {
        let tts = TextToSpeech::from_config(&voice(TtsProvider::ElevenLabs), "").unwrap();
        let request = tts.request("hello").build().unwrap();

        assert_eq!(
            request.url().as_str(),
            "https://api.elevenlabs.io/v1/text-to-speech/voice-y"
        );
        assert_eq!(request.headers()["xi-api-key"], "el-key");
        assert_eq!(
            body_json(&request),
            json!({"text": "hello", "model_id": "model-x"})
        );
    }

    #[test]
    fn missing_key_is_rejected() {
        assert!(TextToSpeech::from_config(&voice(TtsProvider::OpenAi), "").is_err());

        let mut settings = voice(TtsProvider::ElevenLabs);
        settings.elevenlabs_api_key = None;
        assert!(TextToSpeech::from_config(&settings, "sk-test").is_err());
    }
}
