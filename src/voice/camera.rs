//! Raspberry Pi camera capture via `libcamera-still`

use std::path::PathBuf;

use async_trait::async_trait;

use super::Camera;
use crate::{Error, Result};

/// Runs `libcamera-still` to take PNG snapshots
#[derive(Debug, Clone)]
pub struct LibcameraStill {
    program: String,
    width: u32,
    height: u32,
    output_dir: PathBuf,
}

impl LibcameraStill {
    /// Create a camera writing snapshots into `output_dir`
    #[must_use]
    pub const fn new(program: String, width: u32, height: u32, output_dir: PathBuf) -> Self {
        Self {
            program,
            width,
            height,
            output_dir,
        }
    }

    /// Command-line arguments for one capture
    fn args(&self, output: &std::path::Path) -> Vec<String> {
        vec![
            "-o".to_string(),
            output.display().to_string(),
            "--nopreview".to_string(),
            "--timeout".to_string(),
            "1".to_string(),
            "--width".to_string(),
            self.width.to_string(),
            "--height".to_string(),
            self.height.to_string(),
        ]
    }
}

#[async_trait]
impl Camera for LibcameraStill {
    async fn capture(&self) -> Result<PathBuf> {
        let path = self
            .output_dir
            .join(format!("{}.png", uuid::Uuid::new_v4()));

        tracing::info!(path = %path.display(), "taking picture");

        let output = tokio::process::Command::new(&self.program)
            .args(self.args(&path))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Camera(format!("failed to spawn {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Camera(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        tracing::info!(path = %path.display(), "image captured");
        Ok(path)
    }
}
