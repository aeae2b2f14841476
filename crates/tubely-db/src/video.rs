use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tubely_core::models::Video;
use uuid::Uuid;

/// Record store errors
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Video not found: {0}")]
    NotFound(Uuid),

    #[error("Persistence failed: {0}")]
    Persistence(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Get/update access to persisted video records.
#[async_trait]
pub trait VideoRepository: Send + Sync {
    /// Fetch a video record by ID.
    async fn get_video(&self, id: Uuid) -> RepositoryResult<Video>;

    /// Replace a stored record with `video` (matched by `video.id`).
    async fn update_video(&self, video: &Video) -> RepositoryResult<()>;
}

/// In-process record store, used by the CLI and tests.
#[derive(Clone, Default)]
pub struct MemoryVideoRepository {
    videos: Arc<RwLock<HashMap<Uuid, Video>>>,
}

impl MemoryVideoRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, video: Video) {
        self.videos.write().await.insert(video.id, video);
    }

    pub async fn len(&self) -> usize {
        self.videos.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.videos.read().await.is_empty()
    }
}

#[async_trait]
impl VideoRepository for MemoryVideoRepository {
    async fn get_video(&self, id: Uuid) -> RepositoryResult<Video> {
        self.videos
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound(id))
    }

    async fn update_video(&self, video: &Video) -> RepositoryResult<()> {
        let mut videos = self.videos.write().await;
        let stored = videos
            .get_mut(&video.id)
            .ok_or(RepositoryError::NotFound(video.id))?;

        if stored.user_id != video.user_id {
            return Err(RepositoryError::Persistence(format!(
                "refusing to reassign owner of video {}",
                video.id
            )));
        }

        *stored = video.clone();
        tracing::debug!(video_id = %video.id, "Video record updated");
        Ok(())
    }
}
