//! Staged ingestion: upload stream → staged file → remuxed file → orientation → storage → record.

use std::fmt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use tubely_core::{Config, Orientation, Video};
use tubely_db::{RepositoryError, VideoRepository};
use tubely_storage::{derive_storage_key, extension_for_media_type, Storage, StorageKey};

use super::error::{IngestError, IngestErrorKind, IngestStage};
use super::state::IngestState;
use crate::error::ProcessingError;
use crate::temp::TempArtifact;
use crate::video::MediaToolchain;

/// The only content type accepted for ingestion.
pub const REQUIRED_CONTENT_TYPE: &str = "video/mp4";

const STAGING_PREFIX: &str = "tubely-upload";

/// Whether `content_type` is `video/mp4`, ignoring parameters and case.
pub fn is_mp4_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|essence| essence.trim().eq_ignore_ascii_case(REQUIRED_CONTENT_TYPE))
        .unwrap_or(false)
}

/// Settings for ingestion runs.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Local directory for staged and remuxed files. Created if missing.
    pub staging_dir: PathBuf,
    pub max_upload_bytes: u64,
}

impl IngestConfig {
    pub fn new(staging_dir: impl Into<PathBuf>, max_upload_bytes: u64) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            max_upload_bytes,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.staging_dir(), config.max_video_size_bytes())
    }
}

/// An upload as received: declared content type plus a byte stream.
pub struct UploadedAsset {
    content_type: String,
    content_length: Option<u64>,
    reader: Pin<Box<dyn AsyncRead + Send + Unpin>>,
}

impl UploadedAsset {
    pub fn new(
        content_type: impl Into<String>,
        reader: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        Self {
            content_type: content_type.into(),
            content_length: None,
            reader: Box::pin(reader),
        }
    }

    /// Declared length, checked against the size limit before any bytes are staged.
    pub fn with_content_length(mut self, content_length: u64) -> Self {
        self.content_length = Some(content_length);
        self
    }

    /// Upload the contents of a local file.
    pub async fn from_file(
        path: &Path,
        content_type: impl Into<String>,
    ) -> Result<Self, std::io::Error> {
        let file = tokio::fs::File::open(path).await?;
        let len = file.metadata().await?.len();
        Ok(Self::new(content_type, file).with_content_length(len))
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }
}

impl fmt::Debug for UploadedAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedAsset")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Collaborators and settings shared by every ingestion run.
#[derive(Clone)]
pub struct IngestPipeline {
    toolchain: Arc<dyn MediaToolchain>,
    storage: Arc<dyn Storage>,
    videos: Arc<dyn VideoRepository>,
    config: IngestConfig,
}

impl IngestPipeline {
    pub fn new(
        toolchain: Arc<dyn MediaToolchain>,
        storage: Arc<dyn Storage>,
        videos: Arc<dyn VideoRepository>,
        config: IngestConfig,
    ) -> Self {
        Self {
            toolchain,
            storage,
            videos,
            config,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn videos(&self) -> Arc<dyn VideoRepository> {
        Arc::clone(&self.videos)
    }

    /// Begin a run for `video`. Nothing happens until the run is stepped.
    pub fn start(&self, video: Video, asset: UploadedAsset) -> IngestRun {
        IngestRun {
            pipeline: self.clone(),
            content_type: asset.content_type.clone(),
            video,
            asset: Some(asset),
            staged: None,
            remuxed: None,
            in_flight: None,
            state: IngestState::Received,
        }
    }

    /// Run an ingestion to completion.
    pub async fn ingest(&self, video: Video, asset: UploadedAsset) -> Result<Video, IngestError> {
        self.start(video, asset).run().await
    }
}

/// One ingestion in progress.
///
/// Owns its temp files; they are removed when the run reaches a terminal
/// state, or when the run is dropped mid-stage.
pub struct IngestRun {
    pipeline: IngestPipeline,
    video: Video,
    content_type: String,
    asset: Option<UploadedAsset>,
    staged: Option<TempArtifact>,
    remuxed: Option<TempArtifact>,
    in_flight: Option<IngestStage>,
    state: IngestState,
}

impl IngestRun {
    pub fn state(&self) -> &IngestState {
        &self.state
    }

    pub fn video_id(&self) -> Uuid {
        self.video.id
    }

    /// Local temp files currently held by the run.
    pub fn artifact_paths(&self) -> Vec<PathBuf> {
        self.staged
            .iter()
            .chain(self.remuxed.iter())
            .map(|a| a.path().to_path_buf())
            .collect()
    }

    /// Advance by exactly one stage. A terminal state is returned unchanged.
    pub async fn step(&mut self) -> &IngestState {
        let Some(stage) = self.state.pending_stage() else {
            return &self.state;
        };

        let from = self.state.name();
        let start = Instant::now();
        self.in_flight = Some(stage);

        let current = std::mem::replace(&mut self.state, IngestState::Received);
        let outcome = match current {
            IngestState::Received => self.stage_upload().await.map(|()| IngestState::Staged),
            IngestState::Staged => self.remux().await.map(|()| IngestState::Remuxed),
            IngestState::Remuxed => self.classify().await.map(IngestState::Classified),
            IngestState::Classified(orientation) => {
                self.upload(orientation).await.map(IngestState::Uploaded)
            }
            IngestState::Uploaded(key) => self.commit(&key).await.map(IngestState::Committed),
            terminal @ (IngestState::Committed(_) | IngestState::Failed(_)) => Ok(terminal),
        };
        self.in_flight = None;

        match outcome {
            Ok(next) => {
                tracing::info!(
                    video_id = %self.video.id,
                    stage = %stage,
                    from = from,
                    to = next.name(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Ingest state transition"
                );
                if next.is_terminal() {
                    self.release_artifacts();
                }
                self.state = next;
            }
            Err(err) => {
                tracing::error!(
                    video_id = %self.video.id,
                    stage = %err.stage(),
                    error = %err,
                    diagnostics = err.diagnostics().unwrap_or(""),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Ingestion failed"
                );
                self.fail(err);
            }
        }

        &self.state
    }

    /// Step until a terminal state.
    pub async fn run(mut self) -> Result<Video, IngestError> {
        self.drive().await;
        self.finish()
    }

    /// Like [`run`](Self::run), but stops at the next await point once
    /// `token` is cancelled. In-flight tool processes are killed and temp
    /// files removed; the result is a `Cancelled` error naming the stage.
    pub async fn run_until_cancelled(mut self, token: CancellationToken) -> Result<Video, IngestError> {
        let completed = tokio::select! {
            biased;
            _ = token.cancelled() => false,
            _ = self.drive() => true,
        };

        if !completed {
            let stage = self
                .in_flight
                .or_else(|| self.state.pending_stage())
                .unwrap_or(IngestStage::Staging);
            tracing::warn!(
                video_id = %self.video.id,
                stage = %stage,
                "Ingestion cancelled"
            );
            self.fail(IngestError::new(stage, IngestErrorKind::Cancelled));
        }

        self.finish()
    }

    async fn drive(&mut self) {
        while !self.state.is_terminal() {
            self.step().await;
        }
    }

    fn finish(self) -> Result<Video, IngestError> {
        match self.state {
            IngestState::Committed(video) => Ok(video),
            IngestState::Failed(err) => Err(err),
            other => Err(IngestError::new(
                other.pending_stage().unwrap_or(IngestStage::Staging),
                IngestErrorKind::Cancelled,
            )),
        }
    }

    fn fail(&mut self, err: IngestError) {
        self.release_artifacts();
        self.state = IngestState::Failed(err);
    }

    fn release_artifacts(&mut self) {
        self.asset = None;
        self.remuxed = None;
        self.staged = None;
    }

    async fn stage_upload(&mut self) -> Result<(), IngestError> {
        let stage_err = |kind: IngestErrorKind| IngestError::new(IngestStage::Staging, kind);

        if !is_mp4_content_type(&self.content_type) {
            return Err(stage_err(IngestErrorKind::UnsupportedContentType(
                self.content_type.clone(),
            )));
        }

        let limit = self.pipeline.config.max_upload_bytes;
        let asset = self.asset.take().ok_or_else(|| {
            stage_err(IngestErrorKind::Io(std::io::Error::other(
                "upload stream already consumed",
            )))
        })?;

        if asset.content_length.is_some_and(|len| len > limit) {
            return Err(stage_err(IngestErrorKind::PayloadTooLarge { limit_bytes: limit }));
        }

        let staging_dir = self.pipeline.config.staging_dir.clone();
        tokio::fs::create_dir_all(&staging_dir)
            .await
            .map_err(|e| stage_err(e.into()))?;

        let (file, path) = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(".mp4")
            .tempfile_in(&staging_dir)
            .and_then(|named| named.keep().map_err(|e| e.error))
            .map_err(|e| stage_err(e.into()))?;
        self.staged = Some(TempArtifact::new(&path));

        let mut file = tokio::fs::File::from_std(file);
        let mut limited = asset.reader.take(limit.saturating_add(1));
        let copied = tokio::io::copy(&mut limited, &mut file)
            .await
            .map_err(|e| stage_err(e.into()))?;

        if copied > limit {
            return Err(stage_err(IngestErrorKind::PayloadTooLarge { limit_bytes: limit }));
        }

        file.flush().await.map_err(|e| stage_err(e.into()))?;

        tracing::debug!(
            video_id = %self.video.id,
            path = %path.display(),
            size_bytes = copied,
            "Upload staged"
        );

        Ok(())
    }

    async fn remux(&mut self) -> Result<(), IngestError> {
        let staged = artifact_path(&self.staged, IngestStage::Remuxing, "staged")?;

        let remuxed = self
            .pipeline
            .toolchain
            .remux(&staged)
            .await
            .map_err(|e| IngestError::new(IngestStage::Remuxing, ProcessingError::from(e)))?;
        self.remuxed = Some(remuxed);

        Ok(())
    }

    async fn classify(&mut self) -> Result<Orientation, IngestError> {
        let remuxed = artifact_path(&self.remuxed, IngestStage::Classifying, "remuxed")?;

        let orientation = self
            .pipeline
            .toolchain
            .classify(&remuxed)
            .await
            .map_err(|e| IngestError::new(IngestStage::Classifying, ProcessingError::from(e)))?;

        tracing::debug!(video_id = %self.video.id, orientation = %orientation, "Video classified");
        Ok(orientation)
    }

    async fn upload(&mut self, orientation: Orientation) -> Result<StorageKey, IngestError> {
        let upload_err = |kind: IngestErrorKind| IngestError::new(IngestStage::Uploading, kind);
        let remuxed = artifact_path(&self.remuxed, IngestStage::Uploading, "remuxed")?;

        let extension = extension_for_media_type(&self.content_type);
        let key = derive_storage_key(orientation, &extension).map_err(|e| upload_err(e.into()))?;

        // A fresh handle always reads from the start of the file.
        let file = tokio::fs::File::open(&remuxed)
            .await
            .map_err(|e| upload_err(e.into()))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| upload_err(e.into()))?
            .len();

        self.pipeline
            .storage
            .upload_stream(key.as_str(), &self.content_type, Some(size), Box::pin(file))
            .await
            .map_err(|e| upload_err(e.into()))?;

        Ok(key)
    }

    /// Point the stored record at the uploaded object.
    ///
    /// The record is re-read so that only its URL changes; anything else
    /// written since admission is kept.
    async fn commit(&mut self, key: &StorageKey) -> Result<Video, IngestError> {
        let video_id = self.video.id;
        let owner = self.video.user_id;
        let unreferenced = |kind: IngestErrorKind| {
            tracing::warn!(
                video_id = %video_id,
                key = %key,
                "Uploaded object is not referenced by any video record"
            );
            IngestError::new(IngestStage::Committing, kind)
        };

        let mut video = self
            .pipeline
            .videos
            .get_video(video_id)
            .await
            .map_err(|e| {
                unreferenced(match e {
                    RepositoryError::NotFound(id) => IngestErrorKind::NotFound(id),
                    other => IngestErrorKind::Persistence(other),
                })
            })?;

        if !video.is_owned_by(owner) {
            return Err(unreferenced(IngestErrorKind::Unauthorized));
        }

        video.set_video_url(self.pipeline.storage.public_url(key.as_str()));

        if let Err(e) = self.pipeline.videos.update_video(&video).await {
            return Err(unreferenced(IngestErrorKind::Persistence(e)));
        }

        tracing::info!(
            video_id = %video.id,
            key = %key,
            url = video.video_url.as_deref().unwrap_or(""),
            "Video URL committed"
        );
        Ok(video)
    }
}

fn artifact_path(
    artifact: &Option<TempArtifact>,
    stage: IngestStage,
    what: &str,
) -> Result<PathBuf, IngestError> {
    artifact
        .as_ref()
        .map(|a| a.path().to_path_buf())
        .ok_or_else(|| {
            IngestError::new(
                stage,
                IngestErrorKind::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} file is not available", what),
                )),
            )
        })
}
