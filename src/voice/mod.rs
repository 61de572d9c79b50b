//! Voice and camera collaborators
//!
//! Traits for the I/O the controller drives, plus the device and API backed
//! implementations used by the binary.

mod camera;
mod detector;
mod microphone;
mod playback;
mod recorder;
mod segmenter;
mod stt;
mod tts;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

pub use camera::LibcameraStill;
pub use detector::KeywordListener;
pub use microphone::{MicTap, Microphone, SAMPLE_RATE, samples_to_wav};
pub use playback::SpeakerPlayer;
pub use recorder::MicRecorder;
pub use segmenter::{SegmenterState, SpeechSegmenter};
pub use stt::SpeechToText;
pub use tts::TextToSpeech;

use crate::Result;

/// Encoding of an audio clip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// MPEG layer 3 (TTS output)
    Mp3,
    /// RIFF WAVE
    Wav,
}

/// Encoded audio ready for playback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    /// Encoded bytes
    pub data: Vec<u8>,
    /// Encoding of `data`
    pub format: AudioFormat,
}

impl AudioClip {
    /// Wrap MP3 bytes
    #[must_use]
    pub const fn mp3(data: Vec<u8>) -> Self {
        Self {
            data,
            format: AudioFormat::Mp3,
        }
    }

    /// Wrap WAV bytes
    #[must_use]
    pub const fn wav(data: Vec<u8>) -> Self {
        Self {
            data,
            format: AudioFormat::Wav,
        }
    }
}

/// Short audio cues played at state changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundEffect {
    /// Assistant started listening
    Listening,
    /// Recording started
    StartRecording,
    /// Recording stopped, assistant is responding
    Respond,
    /// Snapshot being taken
    Snapshot,
    /// Conversation thread expired
    TimerReset,
}

impl SoundEffect {
    /// File name of the cue inside the sounds directory
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Listening => "listening.wav",
            Self::StartRecording => "startrecording.wav",
            Self::Respond => "respond.wav",
            Self::Snapshot => "tricorder.wav",
            Self::TimerReset => "timerreset.wav",
        }
    }
}

/// Speech-to-text engine
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe a recorded audio file
    async fn transcribe(&self, audio_path: &Path) -> Result<String>;
}

/// Text-to-speech engine
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize speech for `text`
    async fn synthesize(&self, text: &str) -> Result<AudioClip>;
}

/// Speaker output
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    /// Play a clip to completion
    async fn play(&self, clip: &AudioClip) -> Result<()>;

    /// Start a cue without waiting; failures are logged, never returned
    fn play_sound(&self, sound: SoundEffect);
}

/// Records the user's request
pub trait Recorder: Send + Sync {
    /// Begin recording
    ///
    /// # Errors
    ///
    /// Returns error if the input device cannot be used
    fn start(&self) -> Result<()>;

    /// Finish recording and return the file holding the audio
    ///
    /// # Errors
    ///
    /// Returns error if the recording cannot be written
    fn stop(&self) -> Result<PathBuf>;
}

/// Listens for spoken keywords
#[async_trait]
pub trait WordDetector: Send + Sync {
    /// Wait for the next spoken phrase and return it lowercased
    async fn listen(&self) -> Result<String>;

    /// Drop any buffered audio
    fn clear(&self);
}

/// Still camera
#[async_trait]
pub trait Camera: Send + Sync {
    /// Take a picture and return the local file path
    async fn capture(&self) -> Result<PathBuf>;
}
