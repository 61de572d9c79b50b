//! TOML configuration file loading
//!
//! Supports `~/.config/heddy/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct HeddyConfigFile {
    /// Assistant backend configuration
    #[serde(default)]
    pub assistant: AssistantFileConfig,

    /// Speech configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Camera configuration
    #[serde(default)]
    pub camera: CameraFileConfig,

    /// Session and capture timing
    #[serde(default)]
    pub session: SessionFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// Zapier webhook URL for `send_text_message`
    pub zapier_webhook_url: Option<String>,
}

/// Assistant configuration
#[derive(Debug, Default, Deserialize)]
pub struct AssistantFileConfig {
    /// Assistant identifier (e.g. "asst_...")
    pub id: Option<String>,

    /// Greeting spoken at startup
    pub greeting: Option<String>,
}

/// Speech configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// STT provider ("whisper" or "deepgram")
    pub stt_provider: Option<String>,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: Option<String>,

    /// TTS provider ("openai" or "elevenlabs")
    pub tts_provider: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice (`OpenAI` voice name or `ElevenLabs` voice id)
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f32>,

    /// Directory holding the cue sounds
    pub sounds_dir: Option<String>,

    /// Where the recorded request is written
    pub recording_path: Option<String>,
}

/// Camera configuration
#[derive(Debug, Default, Deserialize)]
pub struct CameraFileConfig {
    /// Capture program
    pub program: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Directory snapshots are written to
    pub output_dir: Option<String>,
}

/// Session timing
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    /// Seconds of inactivity before the thread is discarded
    pub idle_timeout_secs: Option<u64>,

    /// Seconds to wait for a snapshot
    pub capture_timeout_secs: Option<u64>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `HeddyConfigFile::default()` if the file doesn't exist or can't be parsed.
#[must_use]
pub fn load_config_file() -> HeddyConfigFile {
    config_file_path().map_or_else(HeddyConfigFile::default, |path| load_from(&path))
}

/// Load a TOML config file from `path`, falling back to defaults
#[must_use]
pub fn load_from(path: &Path) -> HeddyConfigFile {
    if !path.exists() {
        return HeddyConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                HeddyConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            HeddyConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/heddy/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("heddy").join("config.toml"))
}
