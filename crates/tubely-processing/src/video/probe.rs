//! Stream metadata via ffprobe.

use super::command::{run_tool, validate_tool_path};
use crate::error::ProcessingError;
use serde::Deserialize;
use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("ffprobe failed: {message}")]
    ExecutionFailed {
        message: String,
        /// Captured stderr, for logs only.
        stderr: Option<String>,
    },

    #[error("Malformed ffprobe output: {0}")]
    MalformedOutput(String),

    #[error("No video streams found")]
    NoStreams,
}

/// Geometry of one video stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub codec_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    codec_type: Option<String>,
    #[serde(default)]
    codec_name: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

/// Parse `ffprobe -print_format json -show_streams` output into video streams.
///
/// Streams that are not video or lack a positive width and height are skipped.
pub fn parse_streams(stdout: &[u8]) -> Result<Vec<StreamInfo>, ProbeError> {
    let output: ProbeOutput = serde_json::from_slice(stdout)
        .map_err(|e| ProbeError::MalformedOutput(e.to_string()))?;

    let streams: Vec<StreamInfo> = output
        .streams
        .into_iter()
        .filter(|s| s.codec_type.as_deref().map_or(true, |t| t == "video"))
        .filter_map(|s| match (s.width, s.height) {
            (Some(width), Some(height)) if width > 0 && height > 0 => Some(StreamInfo {
                width,
                height,
                codec_name: s.codec_name,
            }),
            _ => None,
        })
        .collect();

    if streams.is_empty() {
        return Err(ProbeError::NoStreams);
    }

    Ok(streams)
}

/// Runs ffprobe against local files.
#[derive(Debug, Clone)]
pub struct FfprobeService {
    ffprobe_path: String,
    timeout: Duration,
}

impl FfprobeService {
    pub fn new(ffprobe_path: impl Into<String>, timeout: Duration) -> Result<Self, ProcessingError> {
        let ffprobe_path = ffprobe_path.into();
        validate_tool_path(&ffprobe_path)?;
        Ok(Self {
            ffprobe_path,
            timeout,
        })
    }

    /// Probe `video_path` for its video streams. The file is only read.
    #[tracing::instrument(skip(self), fields(
        process.executable.name = "ffprobe",
        process.executable.path = %self.ffprobe_path,
        ffmpeg.operation = "probe"
    ))]
    pub async fn probe(&self, video_path: &Path) -> Result<Vec<StreamInfo>, ProbeError> {
        let start = std::time::Instant::now();

        let output = run_tool(
            &self.ffprobe_path,
            [
                OsStr::new("-v"),
                OsStr::new("error"),
                OsStr::new("-print_format"),
                OsStr::new("json"),
                OsStr::new("-show_streams"),
                OsStr::new("-select_streams"),
                OsStr::new("v"),
                video_path.as_os_str(),
            ],
            self.timeout,
        )
        .await
        .map_err(|failure| {
            tracing::error!(
                error = %failure.message,
                stderr = failure.stderr.as_deref().unwrap_or(""),
                "ffprobe failed"
            );
            ProbeError::ExecutionFailed {
                message: failure.message,
                stderr: failure.stderr,
            }
        })?;

        let streams = parse_streams(&output.stdout)?;

        tracing::info!(
            duration_ms = start.elapsed().as_millis() as u64,
            stream_count = streams.len(),
            width = streams[0].width,
            height = streams[0].height,
            "Video probe completed"
        );

        Ok(streams)
    }
}
