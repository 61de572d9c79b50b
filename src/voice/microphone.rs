//! Audio capture from microphone
//!
//! The cpal stream is not `Send`, so it lives on a dedicated thread for the
//! lifetime of the [`Microphone`]. Consumers read samples through taps.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream};

use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

#[derive(Debug, Default)]
struct TapState {
    active: bool,
    samples: Vec<f32>,
}

/// One consumer's view of the microphone
///
/// Samples are only buffered while the tap is active.
#[derive(Debug, Clone, Default)]
pub struct MicTap {
    state: Arc<Mutex<TapState>>,
}

impl MicTap {
    /// Create an inactive tap
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start or stop buffering; starting discards stale samples
    pub fn set_active(&self, active: bool) {
        if let Ok(mut state) = self.state.lock() {
            if active && !state.active {
                state.samples.clear();
            }
            state.active = active;
        }
    }

    /// Whether samples are being buffered
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.lock().is_ok_and(|s| s.active)
    }

    /// Append samples if active
    pub fn feed(&self, data: &[f32]) {
        if let Ok(mut state) = self.state.lock() {
            if state.active {
                state.samples.extend_from_slice(data);
            }
        }
    }

    /// Take the buffered samples, clearing the buffer
    #[must_use]
    pub fn take(&self) -> Vec<f32> {
        self.state
            .lock()
            .map(|mut s| std::mem::take(&mut s.samples))
            .unwrap_or_default()
    }

    /// Drop buffered samples
    pub fn clear(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.samples.clear();
        }
    }
}

/// Shared microphone input
pub struct Microphone {
    taps: Arc<Mutex<Vec<MicTap>>>,
    shutdown: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Microphone {
    /// Open the default input device and start streaming
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn open() -> Result<Self> {
        let taps: Arc<Mutex<Vec<MicTap>>> = Arc::new(Mutex::new(Vec::new()));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let stream_taps = Arc::clone(&taps);
        let thread = std::thread::Builder::new()
            .name("heddy-mic".to_string())
            .spawn(move || {
                let stream = match build_input_stream(stream_taps) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                // Returns once the owning Microphone drops its sender
                let _ = shutdown_rx.recv();
                drop(stream);
                tracing::debug!("audio capture stopped");
            })?;

        ready_rx
            .recv()
            .map_err(|_| Error::Audio("microphone thread exited during startup".to_string()))??;

        Ok(Self {
            taps,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    /// Register a new consumer
    #[must_use]
    pub fn tap(&self) -> MicTap {
        let tap = MicTap::new();
        if let Ok(mut taps) = self.taps.lock() {
            taps.push(tap.clone());
        }
        tap
    }
}

impl Drop for Microphone {
    fn drop(&mut self) {
        self.shutdown.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn build_input_stream(taps: Arc<Mutex<Vec<MicTap>>>) -> Result<Stream> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

    let supported_config = device
        .supported_input_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
        })
        .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

    let config = supported_config
        .with_sample_rate(SampleRate(SAMPLE_RATE))
        .config();

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = SAMPLE_RATE,
        channels = config.channels,
        "audio capture initialized"
    );

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Ok(taps) = taps.lock() {
                    for tap in taps.iter() {
                        tap.feed(data);
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;
    tracing::debug!("audio capture started");

    Ok(stream)
}

/// Convert f32 samples to WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            // Convert f32 [-1.0, 1.0] to i16
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
