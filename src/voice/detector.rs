//! Keyword listener
//!
//! Segments the microphone stream into utterances and transcribes each one;
//! the controller matches keywords against the returned phrase.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{MicTap, SAMPLE_RATE, SpeechSegmenter, Transcriber, WordDetector, samples_to_wav};
use crate::{Error, Result};

/// Audio processing interval (100ms chunks)
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Listens on a microphone tap and transcribes each utterance
pub struct KeywordListener {
    tap: MicTap,
    segmenter: Mutex<SpeechSegmenter>,
    transcriber: Arc<dyn Transcriber>,
    scratch_path: PathBuf,
}

impl KeywordListener {
    /// Create a listener; the tap is activated immediately
    #[must_use]
    pub fn new(tap: MicTap, transcriber: Arc<dyn Transcriber>, scratch_path: PathBuf) -> Self {
        tap.set_active(true);
        Self {
            tap,
            segmenter: Mutex::new(SpeechSegmenter::new()),
            transcriber,
            scratch_path,
        }
    }

    /// Feed samples to the segmenter, returning a finished utterance
    fn segment(&self, samples: &[f32]) -> Result<Option<Vec<f32>>> {
        let mut segmenter = self
            .segmenter
            .lock()
            .map_err(|_| Error::Audio("segmenter lock poisoned".to_string()))?;

        if segmenter.process(samples) {
            Ok(Some(segmenter.take_segment()))
        } else {
            Ok(None)
        }
    }
}

#[async_trait]
impl WordDetector for KeywordListener {
    async fn listen(&self) -> Result<String> {
        // Audio buffered since the last call (our own speech, cues) is stale
        self.clear();

        loop {
            tokio::time::sleep(POLL_INTERVAL).await;

            let samples = self.tap.take();
            if samples.is_empty() {
                continue;
            }

            let Some(utterance) = self.segment(&samples)? else {
                continue;
            };

            let wav = samples_to_wav(&utterance, SAMPLE_RATE)?;
            tokio::fs::write(&self.scratch_path, wav).await?;

            match self.transcriber.transcribe(&self.scratch_path).await {
                Ok(text) => {
                    let phrase = text.trim().to_lowercase();
                    if phrase.is_empty() {
                        continue;
                    }
                    tracing::debug!(phrase = %phrase, "phrase heard");
                    return Ok(phrase);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "keyword transcription failed");
                }
            }
        }
    }

    fn clear(&self) {
        self.tap.clear();
        if let Ok(mut segmenter) = self.segmenter.lock() {
            segmenter.reset();
        }
    }
}
