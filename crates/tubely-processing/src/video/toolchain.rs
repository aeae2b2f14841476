use super::orientation::classify_streams;
use super::probe::{FfprobeService, ProbeError, StreamInfo};
use super::remux::{FastStartRemuxer, RemuxError};
use crate::error::ProcessingError;
use crate::temp::TempArtifact;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tubely_core::{Config, Orientation};

/// The external media tools the ingestion pipeline depends on.
///
/// Implemented by [`FfmpegToolchain`]; tests substitute fakes that return
/// canned streams and files.
#[async_trait]
pub trait MediaToolchain: Send + Sync {
    /// Video streams of the file at `path`.
    async fn probe(&self, path: &Path) -> Result<Vec<StreamInfo>, ProbeError>;

    /// Fast-start remux `path` into a new file owned by the returned guard.
    async fn remux(&self, path: &Path) -> Result<TempArtifact, RemuxError>;

    /// Orientation of the first video stream of `path`.
    async fn classify(&self, path: &Path) -> Result<Orientation, ProbeError> {
        let streams = self.probe(path).await?;
        classify_streams(&streams)
    }
}

/// ffprobe + ffmpeg as external processes.
#[derive(Debug, Clone)]
pub struct FfmpegToolchain {
    prober: FfprobeService,
    remuxer: FastStartRemuxer,
}

impl FfmpegToolchain {
    pub fn new(
        ffmpeg_path: impl Into<String>,
        ffprobe_path: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProcessingError> {
        Ok(Self {
            prober: FfprobeService::new(ffprobe_path, timeout)?,
            remuxer: FastStartRemuxer::new(ffmpeg_path, timeout)?,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ProcessingError> {
        Self::new(
            config.ffmpeg_path(),
            config.ffprobe_path(),
            Duration::from_secs(config.tool_timeout_secs()),
        )
    }
}

#[async_trait]
impl MediaToolchain for FfmpegToolchain {
    async fn probe(&self, path: &Path) -> Result<Vec<StreamInfo>, ProbeError> {
        self.prober.probe(path).await
    }

    async fn remux(&self, path: &Path) -> Result<TempArtifact, RemuxError> {
        self.remuxer.remux(path).await
    }
}
