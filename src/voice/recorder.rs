//! Request recorder backed by a microphone tap

use std::path::PathBuf;

use super::{MicTap, Recorder, SAMPLE_RATE, samples_to_wav};
use crate::{Error, Result};

/// Records the user's request into a WAV file
pub struct MicRecorder {
    tap: MicTap,
    path: PathBuf,
}

impl MicRecorder {
    /// Create a recorder writing to `path`
    #[must_use]
    pub const fn new(tap: MicTap, path: PathBuf) -> Self {
        Self { tap, path }
    }
}

impl Recorder for MicRecorder {
    fn start(&self) -> Result<()> {
        self.tap.set_active(true);
        tracing::info!("recording started");
        Ok(())
    }

    fn stop(&self) -> Result<PathBuf> {
        if !self.tap.is_active() {
            return Err(Error::Audio("recorder was not started".to_string()));
        }
        self.tap.set_active(false);
        let samples = self.tap.take();

        let wav = samples_to_wav(&samples, SAMPLE_RATE)?;
        std::fs::write(&self.path, wav)?;

        tracing::info!(
            path = %self.path.display(),
            samples = samples.len(),
            "recording stopped"
        );
        Ok(self.path.clone())
    }
}
