//! Fast-start remuxing via ffmpeg.

use super::command::{run_tool, validate_tool_path};
use crate::error::ProcessingError;
use crate::temp::TempArtifact;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Suffix appended to the input path for the remuxed output.
pub const PROCESSING_SUFFIX: &str = ".processing";

#[derive(Debug, Error)]
pub enum RemuxError {
    #[error("ffmpeg failed: {message}")]
    ExecutionFailed {
        message: String,
        /// Captured stderr, for logs only.
        stderr: Option<String>,
    },

    #[error("Remux output missing at {path}: {source}")]
    OutputMissing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Remux output is empty at {path}")]
    OutputEmpty { path: PathBuf },
}

/// Output path for a remux of `input`: the input path plus [`PROCESSING_SUFFIX`].
pub fn processing_path(input: &Path) -> PathBuf {
    let mut path: OsString = input.as_os_str().to_owned();
    path.push(PROCESSING_SUFFIX);
    PathBuf::from(path)
}

/// Rewrites an MP4 with its index at the front (`-movflags faststart`),
/// copying all streams without re-encoding.
#[derive(Debug, Clone)]
pub struct FastStartRemuxer {
    ffmpeg_path: String,
    timeout: Duration,
}

impl FastStartRemuxer {
    pub fn new(ffmpeg_path: impl Into<String>, timeout: Duration) -> Result<Self, ProcessingError> {
        let ffmpeg_path = ffmpeg_path.into();
        validate_tool_path(&ffmpeg_path)?;
        Ok(Self {
            ffmpeg_path,
            timeout,
        })
    }

    /// Remux `input_path` into a new sibling file and hand back its guard.
    ///
    /// The input is left in place. Partial output is removed on every failure.
    #[tracing::instrument(skip(self), fields(
        process.executable.name = "ffmpeg",
        process.executable.path = %self.ffmpeg_path,
        ffmpeg.operation = "faststart"
    ))]
    pub async fn remux(&self, input_path: &Path) -> Result<TempArtifact, RemuxError> {
        let start = std::time::Instant::now();
        let output = TempArtifact::new(processing_path(input_path));

        run_tool(
            &self.ffmpeg_path,
            [
                OsStr::new("-y"),
                OsStr::new("-i"),
                input_path.as_os_str(),
                OsStr::new("-c"),
                OsStr::new("copy"),
                OsStr::new("-movflags"),
                OsStr::new("faststart"),
                OsStr::new("-f"),
                OsStr::new("mp4"),
                output.path().as_os_str(),
            ],
            self.timeout,
        )
        .await
        .map_err(|failure| {
            tracing::error!(
                error = %failure.message,
                stderr = failure.stderr.as_deref().unwrap_or(""),
                "ffmpeg faststart remux failed"
            );
            RemuxError::ExecutionFailed {
                message: failure.message,
                stderr: failure.stderr,
            }
        })?;

        let metadata = tokio::fs::metadata(output.path())
            .await
            .map_err(|source| RemuxError::OutputMissing {
                path: output.path().to_path_buf(),
                source,
            })?;

        if metadata.len() == 0 {
            return Err(RemuxError::OutputEmpty {
                path: output.path().to_path_buf(),
            });
        }

        tracing::info!(
            output = %output.path().display(),
            size_bytes = metadata.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Fast-start remux completed"
        );

        Ok(output)
    }
}
