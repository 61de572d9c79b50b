//! Snapshot capture coordination
//!
//! One capture may be in flight at a time. It runs on its own task and
//! signals completion over a oneshot channel; the controller later waits on
//! that signal (bounded by a timeout) and uploads the result for vision input.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::backend::VisionUploader;
use crate::voice::Camera;
use crate::{Error, Result};

#[derive(Debug, Default)]
struct CaptureState {
    pending: bool,
    completion: Option<oneshot::Receiver<()>>,
    task: Option<JoinHandle<()>>,
    last_image: Option<PathBuf>,
    last_image_ref: Option<String>,
}

/// Runs camera captures and uploads their results
pub struct CaptureCoordinator {
    camera: Arc<dyn Camera>,
    uploader: Arc<dyn VisionUploader>,
    timeout: Duration,
    state: Arc<Mutex<CaptureState>>,
}

impl CaptureCoordinator {
    /// Create a coordinator that waits at most `timeout` for a capture
    #[must_use]
    pub fn new(
        camera: Arc<dyn Camera>,
        uploader: Arc<dyn VisionUploader>,
        timeout: Duration,
    ) -> Self {
        Self {
            camera,
            uploader,
            timeout,
            state: Arc::new(Mutex::new(CaptureState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, CaptureState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Launch a capture in the background
    ///
    /// # Errors
    ///
    /// Returns [`Error::CaptureAlreadyPending`] if a capture is in flight
    pub fn start_capture(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.state();
            if state.pending {
                return Err(Error::CaptureAlreadyPending);
            }
            state.pending = true;
            state.completion = Some(rx);
            state.last_image = None;
            state.last_image_ref = None;
        }

        let camera = Arc::clone(&self.camera);
        let state = Arc::clone(&self.state);
        let task = tokio::spawn(async move {
            let image = match camera.capture().await {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::warn!(error = %e, "snapshot capture failed");
                    None
                }
            };

            {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                state.last_image = image;
                state.pending = false;
            }
            let _ = tx.send(());
        });
        self.state().task = Some(task);

        tracing::debug!("snapshot capture started");
        Ok(())
    }

    /// Wait for the current capture and upload it
    ///
    /// Returns the remote image reference, or `None` when nothing was
    /// captured, the capture timed out, or the upload failed.
    pub async fn wait_and_fetch(&self) -> Option<String> {
        let completion = self.state().completion.take();

        let Some(completion) = completion else {
            tracing::debug!("no snapshot capture requested");
            return None;
        };

        match tokio::time::timeout(self.timeout, completion).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                tracing::warn!("snapshot task ended without signalling");
                return None;
            }
            Err(_) => {
                tracing::warn!(error = %Error::CaptureTimeout(self.timeout), "giving up on snapshot");
                self.cancel();
                return None;
            }
        }

        let image = {
            let mut state = self.state();
            state.task = None;
            state.last_image.clone()?
        };

        match self.uploader.upload(&image).await {
            Ok(reference) => {
                tracing::info!(file_id = %reference, "snapshot uploaded");
                self.state().last_image_ref = Some(reference.clone());
                Some(reference)
            }
            Err(e) => {
                tracing::warn!(path = %image.display(), error = %e, "snapshot upload failed");
                None
            }
        }
    }

    /// Abort a hung capture so the next one can start
    fn cancel(&self) {
        let mut state = self.state();
        if let Some(task) = state.task.take() {
            task.abort();
        }
        state.pending = false;
        state.last_image = None;
    }

    /// Whether a capture is running
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state().pending
    }

    /// Reference of the most recently uploaded snapshot
    #[must_use]
    pub fn last_image_ref(&self) -> Option<String> {
        self.state().last_image_ref.clone()
    }
}
