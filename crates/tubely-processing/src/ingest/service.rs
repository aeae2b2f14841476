use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use tubely_core::{Config, Video};
use tubely_db::{RepositoryError, VideoRepository};
use tubely_storage::Storage;

use super::error::{IngestError, IngestErrorKind, IngestStage};
use super::pipeline::{is_mp4_content_type, IngestConfig, IngestPipeline, UploadedAsset};
use crate::error::ProcessingError;
use crate::video::FfmpegToolchain;

/// Entry point for "upload the video file for this record".
///
/// Looks the record up, checks that `user_id` owns it and that the upload is
/// an MP4, then runs the ingestion pipeline.
#[derive(Clone)]
pub struct VideoIngestService {
    pipeline: IngestPipeline,
    videos: Arc<dyn VideoRepository>,
}

impl VideoIngestService {
    pub fn new(pipeline: IngestPipeline) -> Self {
        let videos = pipeline.videos();
        Self { pipeline, videos }
    }

    /// Wire the service with ffmpeg/ffprobe from `config`.
    pub fn from_config(
        config: &Config,
        storage: Arc<dyn Storage>,
        videos: Arc<dyn VideoRepository>,
    ) -> Result<Self, ProcessingError> {
        let toolchain = FfmpegToolchain::from_config(config)?;
        let pipeline = IngestPipeline::new(
            Arc::new(toolchain),
            storage,
            videos,
            IngestConfig::from_config(config),
        );
        Ok(Self::new(pipeline))
    }

    pub fn pipeline(&self) -> &IngestPipeline {
        &self.pipeline
    }

    #[tracing::instrument(skip(self, upload), fields(content_type = %upload.content_type()))]
    pub async fn upload_video(
        &self,
        video_id: Uuid,
        user_id: Uuid,
        upload: UploadedAsset,
    ) -> Result<Video, IngestError> {
        let video = self.admit(video_id, user_id, &upload).await?;
        self.pipeline.start(video, upload).run().await
    }

    /// [`upload_video`](Self::upload_video), abandoned once `token` is cancelled.
    #[tracing::instrument(skip(self, upload, token), fields(content_type = %upload.content_type()))]
    pub async fn upload_video_until_cancelled(
        &self,
        video_id: Uuid,
        user_id: Uuid,
        upload: UploadedAsset,
        token: CancellationToken,
    ) -> Result<Video, IngestError> {
        let video = self.admit(video_id, user_id, &upload).await?;
        self.pipeline
            .start(video, upload)
            .run_until_cancelled(token)
            .await
    }

    async fn admit(
        &self,
        video_id: Uuid,
        user_id: Uuid,
        upload: &UploadedAsset,
    ) -> Result<Video, IngestError> {
        let video = self.videos.get_video(video_id).await.map_err(|e| {
            let kind = match e {
                RepositoryError::NotFound(id) => IngestErrorKind::NotFound(id),
                other => IngestErrorKind::Persistence(other),
            };
            IngestError::new(IngestStage::Admission, kind)
        })?;

        if !video.is_owned_by(user_id) {
            tracing::warn!(video_id = %video_id, user_id = %user_id, "Upload rejected: not the owner");
            return Err(IngestError::new(
                IngestStage::Admission,
                IngestErrorKind::Unauthorized,
            ));
        }

        if !is_mp4_content_type(upload.content_type()) {
            return Err(IngestError::new(
                IngestStage::Admission,
                IngestErrorKind::UnsupportedContentType(upload.content_type().to_string()),
            ));
        }

        tracing::info!(video_id = %video_id, user_id = %user_id, "Uploading video");
        Ok(video)
    }
}
