//! Audio playback to speakers

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use super::{AudioClip, AudioFormat, AudioPlayer, SoundEffect};
use crate::{Error, Result};

/// Decoded mono audio
#[derive(Debug, Clone, PartialEq)]
struct Pcm {
    samples: Vec<f32>,
    sample_rate: u32,
}

/// Plays audio to the default output device
pub struct SpeakerPlayer {
    sounds_dir: PathBuf,
}

impl SpeakerPlayer {
    /// Create a player; cue sounds are read from `sounds_dir`
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available
    pub fn new(sounds_dir: PathBuf) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sounds_dir = %sounds_dir.display(),
            "audio playback initialized"
        );

        Ok(Self { sounds_dir })
    }
}

#[async_trait]
impl AudioPlayer for SpeakerPlayer {
    async fn play(&self, clip: &AudioClip) -> Result<()> {
        let pcm = decode(clip)?;
        tokio::task::spawn_blocking(move || play_blocking(&pcm))
            .await
            .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
    }

    fn play_sound(&self, sound: SoundEffect) {
        let path = self.sounds_dir.join(sound.file_name());
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(sound = ?sound, "no runtime for sound effect");
            return;
        };

        runtime.spawn_blocking(move || {
            let result = std::fs::read(&path)
                .map_err(Error::from)
                .and_then(|data| decode_wav(&data))
                .and_then(|pcm| play_blocking(&pcm));

            if let Err(e) = result {
                tracing::warn!(path = %path.display(), error = %e, "sound effect failed");
            }
        });
    }
}

fn decode(clip: &AudioClip) -> Result<Pcm> {
    match clip.format {
        AudioFormat::Mp3 => decode_mp3(&clip.data),
        AudioFormat::Wav => decode_wav(&clip.data),
    }
}

/// Open an output stream at the clip's rate and block until it has played
fn play_blocking(pcm: &Pcm) -> Result<()> {
    if pcm.samples.is_empty() {
        return Ok(());
    }

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device".to_string()))?;

    let rate = SampleRate(pcm.sample_rate);
    let supported_config = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .filter(|c| c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
        .min_by_key(cpal::SupportedStreamConfigRange::channels)
        .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

    let config: StreamConfig = supported_config.with_sample_rate(rate).config();
    let channels = usize::from(config.channels);

    let samples = Arc::new(pcm.samples.clone());
    let position = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));

    let stream_samples = Arc::clone(&samples);
    let stream_position = Arc::clone(&position);
    let stream_finished = Arc::clone(&finished);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let pos = stream_position.load(Ordering::Relaxed);
                    let sample = if let Some(&s) = stream_samples.get(pos) {
                        stream_position.store(pos + 1, Ordering::Relaxed);
                        s
                    } else {
                        stream_finished.store(true, Ordering::Release);
                        0.0
                    };

                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    let duration_ms = (samples.len() as u64 * 1000) / u64::from(pcm.sample_rate);
    let timeout = Duration::from_millis(duration_ms + 500);
    let start = Instant::now();

    while !finished.load(Ordering::Acquire) {
        if start.elapsed() > timeout {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    // Let the device drain its last buffer
    std::thread::sleep(Duration::from_millis(100));

    drop(stream);
    tracing::debug!(samples = samples.len(), "playback complete");

    Ok(())
}

/// Decode MP3 bytes to mono f32 samples
fn decode_mp3(mp3_data: &[u8]) -> Result<Pcm> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 24000;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if let Ok(rate) = u32::try_from(frame.sample_rate) {
                    sample_rate = rate;
                }

                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(Pcm {
        samples,
        sample_rate,
    })
}

/// Decode WAV bytes to mono f32 samples
fn decode_wav(wav_data: &[u8]) -> Result<Pcm> {
    let mut reader =
        hound::WavReader::new(Cursor::new(wav_data)).map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(e.to_string()))?,
        hound::SampleFormat::Int => {
            #[allow(clippy::cast_precision_loss)]
            let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            #[allow(clippy::cast_precision_loss)]
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Audio(e.to_string()))?
        }
    };

    let channels = usize::from(spec.channels.max(1));
    #[allow(clippy::cast_precision_loss)]
    let samples = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    Ok(Pcm {
        samples,
        sample_rate: spec.sample_rate,
    })
}
