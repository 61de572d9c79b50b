//! Configuration management for Heddy

pub mod file;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::controller::DEFAULT_GREETING;
use crate::{Error, Result};

use self::file::HeddyConfigFile;

/// Default seconds of inactivity before the conversation thread is dropped
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 180;

/// Default seconds to wait for a snapshot
pub const DEFAULT_CAPTURE_TIMEOUT_SECS: u64 = 10;

/// Heddy runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// `OpenAI` API key (assistant, files, Whisper, TTS)
    pub openai_api_key: String,

    /// Assistant identifier
    pub assistant_id: String,

    /// Zapier webhook URL for `send_text_message`
    pub zapier_webhook_url: Option<String>,

    /// Greeting spoken at startup
    pub greeting: String,

    /// Inactivity before the conversation thread is discarded
    pub idle_timeout: Duration,

    /// How long to wait for a snapshot
    pub capture_timeout: Duration,

    /// Speech configuration
    pub voice: VoiceConfig,

    /// Camera configuration
    pub camera: CameraConfig,
}

/// Speech-to-text provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttProvider {
    /// `OpenAI` Whisper
    Whisper,
    /// Deepgram
    Deepgram,
}

impl FromStr for SttProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "whisper" | "openai" => Ok(Self::Whisper),
            "deepgram" => Ok(Self::Deepgram),
            other => Err(Error::Config(format!("unknown STT provider: {other}"))),
        }
    }
}

/// Text-to-speech provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsProvider {
    /// `OpenAI` speech
    OpenAi,
    /// `ElevenLabs`
    ElevenLabs,
}

impl FromStr for TtsProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "elevenlabs" => Ok(Self::ElevenLabs),
            other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        }
    }
}

/// Speech configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// STT provider
    pub stt_provider: SttProvider,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: String,

    /// Deepgram API key (required for Deepgram STT)
    pub deepgram_api_key: Option<String>,

    /// TTS provider
    pub tts_provider: TtsProvider,

    /// TTS model (e.g. "tts-1", "`eleven_monolingual_v1`")
    pub tts_model: String,

    /// TTS voice (`OpenAI` voice name or `ElevenLabs` voice id)
    pub tts_voice: String,

    /// TTS speed multiplier (`OpenAI` only)
    pub tts_speed: f32,

    /// `ElevenLabs` API key (required for `ElevenLabs` TTS)
    pub elevenlabs_api_key: Option<String>,

    /// Directory holding the cue sounds
    pub sounds_dir: PathBuf,

    /// Where the recorded request is written
    pub recording_path: PathBuf,
}

/// Camera configuration
#[derive(Debug, Clone)]
pub struct CameraConfig {
    /// Capture program
    pub program: String,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Directory snapshots are written to
    pub output_dir: PathBuf,
}

impl Config {
    /// Load configuration from the config file and environment
    ///
    /// Environment variables take precedence over the config file.
    ///
    /// # Errors
    ///
    /// Returns error if a required setting is missing or invalid
    pub fn load() -> Result<Self> {
        Self::from_sources(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if the `OpenAI` key or assistant id is missing, or a
    /// provider name or number cannot be parsed
    pub fn from_sources<F>(fc: HeddyConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let openai_api_key = env("OPENAI_API_KEY")
            .or(fc.api_keys.openai)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| Error::Config("OPENAI_API_KEY is required".to_string()))?;

        let assistant_id = env("HEDDY_ASSISTANT_ID")
            .or(fc.assistant.id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::Config("HEDDY_ASSISTANT_ID is required".to_string()))?;

        let zapier_webhook_url = env("HEDDY_ZAPIER_WEBHOOK_URL").or(fc.zapier_webhook_url);

        let idle_timeout_secs = match env("HEDDY_IDLE_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                Error::Config(format!("invalid HEDDY_IDLE_TIMEOUT_SECS: {raw}"))
            })?,
            None => fc
                .session
                .idle_timeout_secs
                .unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS),
        };

        let capture_timeout_secs = fc
            .session
            .capture_timeout_secs
            .unwrap_or(DEFAULT_CAPTURE_TIMEOUT_SECS);

        let voice = voice_config(fc.voice, fc.api_keys.deepgram, fc.api_keys.elevenlabs, &env)?;

        let camera = CameraConfig {
            program: fc
                .camera
                .program
                .unwrap_or_else(|| "libcamera-still".to_string()),
            width: fc.camera.width.unwrap_or(1280),
            height: fc.camera.height.unwrap_or(720),
            output_dir: fc
                .camera
                .output_dir
                .map_or_else(std::env::temp_dir, PathBuf::from),
        };

        Ok(Self {
            openai_api_key,
            assistant_id,
            zapier_webhook_url,
            greeting: fc
                .assistant
                .greeting
                .unwrap_or_else(|| DEFAULT_GREETING.to_string()),
            idle_timeout: Duration::from_secs(idle_timeout_secs),
            capture_timeout: Duration::from_secs(capture_timeout_secs),
            voice,
            camera,
        })
    }
}

/// Voice config (env > toml > default)
fn voice_config<F>(
    fv: file::VoiceFileConfig,
    deepgram_file_key: Option<String>,
    elevenlabs_file_key: Option<String>,
    env: &F,
) -> Result<VoiceConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let stt_provider = env("HEDDY_STT_PROVIDER")
        .or(fv.stt_provider)
        .map_or(Ok(SttProvider::Whisper), |s| s.parse())?;

    let tts_provider = env("HEDDY_TTS_PROVIDER")
        .or(fv.tts_provider)
        .map_or(Ok(TtsProvider::OpenAi), |s| s.parse())?;

    let stt_model = fv.stt_model.unwrap_or_else(|| {
        match stt_provider {
            SttProvider::Whisper => "whisper-1",
            SttProvider::Deepgram => "nova-2",
        }
        .to_string()
    });

    let (default_model, default_voice) = match tts_provider {
        TtsProvider::OpenAi => ("tts-1", "alloy"),
        TtsProvider::ElevenLabs => ("eleven_monolingual_v1", "21m00Tcm4TlvDq8ikWAM"),
    };

    let sounds_dir = env("HEDDY_SOUNDS_DIR")
        .or(fv.sounds_dir)
        .map_or_else(|| PathBuf::from("sounds"), PathBuf::from);

    let recording_path = fv.recording_path.map_or_else(
        || std::env::temp_dir().join("recorded_audio.wav"),
        PathBuf::from,
    );

    Ok(VoiceConfig {
        stt_provider,
        stt_model,
        deepgram_api_key: env("DEEPGRAM_API_KEY").or(deepgram_file_key),
        tts_provider,
        tts_model: fv.tts_model.unwrap_or_else(|| default_model.to_string()),
        tts_voice: fv.tts_voice.unwrap_or_else(|| default_voice.to_string()),
        tts_speed: fv.tts_speed.unwrap_or(1.0),
        elevenlabs_api_key: env("ELEVENLABS_API_KEY").or(elevenlabs_file_key),
        sounds_dir,
        recording_path,
    })
}
