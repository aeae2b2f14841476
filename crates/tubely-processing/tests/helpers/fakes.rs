use std::collections::HashMap;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tubely_core::Video;
use tubely_db::{MemoryVideoRepository, RepositoryError, RepositoryResult, VideoRepository};
use tubely_processing::video::remux::processing_path;
use tubely_processing::{MediaToolchain, ProbeError, RemuxError, StreamInfo, TempArtifact};
use tubely_storage::{Storage, StorageBackend, StorageError, StorageResult};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemuxBehavior {
    /// Copy the input to the output path.
    Copy,
    /// Write a zero-byte output and report it.
    Empty,
    /// Write partial output, then fail like a non-zero ffmpeg exit.
    Fail,
    /// Write partial output, then never finish.
    Hang,
}

#[derive(Debug, Clone)]
pub enum ProbeBehavior {
    Streams(Vec<StreamInfo>),
    Fail,
}

/// Stands in for ffmpeg/ffprobe with canned results.
pub struct FakeToolchain {
    probe: ProbeBehavior,
    remux: RemuxBehavior,
}

impl FakeToolchain {
    pub fn with_geometry(width: u32, height: u32) -> Self {
        Self {
            probe: ProbeBehavior::Streams(vec![StreamInfo {
                width,
                height,
                codec_name: Some("h264".to_string()),
            }]),
            remux: RemuxBehavior::Copy,
        }
    }

    pub fn landscape() -> Self {
        Self::with_geometry(1920, 1080)
    }

    pub fn without_streams() -> Self {
        Self {
            probe: ProbeBehavior::Streams(Vec::new()),
            remux: RemuxBehavior::Copy,
        }
    }

    pub fn failing_probe() -> Self {
        Self {
            probe: ProbeBehavior::Fail,
            remux: RemuxBehavior::Copy,
        }
    }

    pub fn remuxing(mut self, remux: RemuxBehavior) -> Self {
        self.remux = remux;
        self
    }
}

#[async_trait]
impl MediaToolchain for FakeToolchain {
    async fn probe(&self, path: &Path) -> Result<Vec<StreamInfo>, ProbeError> {
        if tokio::fs::metadata(path).await.is_err() {
            return Err(ProbeError::ExecutionFailed {
                message: format!("{} does not exist", path.display()),
                stderr: Some("No such file or directory".to_string()),
            });
        }

        match &self.probe {
            ProbeBehavior::Streams(streams) if streams.is_empty() => Err(ProbeError::NoStreams),
            ProbeBehavior::Streams(streams) => Ok(streams.clone()),
            ProbeBehavior::Fail => Err(ProbeError::ExecutionFailed {
                message: "ffprobe exited with exit status: 1".to_string(),
                stderr: Some("Invalid data found when processing input".to_string()),
            }),
        }
    }

    async fn remux(&self, path: &Path) -> Result<TempArtifact, RemuxError> {
        let output = TempArtifact::new(processing_path(path));

        match self.remux {
            RemuxBehavior::Copy => {
                tokio::fs::copy(path, output.path()).await.map_err(|source| {
                    RemuxError::OutputMissing {
                        path: output.path().to_path_buf(),
                        source,
                    }
                })?;
                Ok(output)
            }
            RemuxBehavior::Empty => {
                tokio::fs::write(output.path(), b"").await.unwrap();
                Err(RemuxError::OutputEmpty {
                    path: output.path().to_path_buf(),
                })
            }
            RemuxBehavior::Fail => {
                tokio::fs::write(output.path(), b"partial").await.unwrap();
                Err(RemuxError::ExecutionFailed {
                    message: "ffmpeg exited with exit status: 1".to_string(),
                    stderr: Some("moov atom not found".to_string()),
                })
            }
            RemuxBehavior::Hang => {
                tokio::fs::write(output.path(), b"partial").await.unwrap();
                std::future::pending::<()>().await;
                Ok(output)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub content_type: String,
    pub data: Vec<u8>,
}

/// In-memory object store with switchable upload failures.
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, StoredObject>>,
    fail_uploads: AtomicBool,
}

pub const STORAGE_BASE_URL: &str = "https://cdn.tubely.test";

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            fail_uploads: AtomicBool::new(false),
        }
    }

    pub fn fail_uploads(&self) {
        self.fail_uploads.store(true, Ordering::SeqCst);
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn upload_stream(
        &self,
        storage_key: &str,
        content_type: &str,
        _content_length: Option<u64>,
        mut reader: Pin<Box<dyn AsyncRead + Send + Unpin>>,
    ) -> StorageResult<u64> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;

        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::UploadFailed(
                "simulated transport failure".to_string(),
            ));
        }

        let size = data.len() as u64;
        self.objects.lock().unwrap().insert(
            storage_key.to_string(),
            StoredObject {
                content_type: content_type.to_string(),
                data,
            },
        );
        Ok(size)
    }

    fn public_url(&self, storage_key: &str) -> String {
        format!("{}/{}", STORAGE_BASE_URL, storage_key)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}

/// Memory repository whose updates can be made to fail.
pub struct FlakyRepository {
    inner: MemoryVideoRepository,
    fail_updates: AtomicBool,
}

impl FlakyRepository {
    pub fn new() -> Self {
        Self {
            inner: MemoryVideoRepository::new(),
            fail_updates: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &MemoryVideoRepository {
        &self.inner
    }

    pub fn fail_updates(&self) {
        self.fail_updates.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl VideoRepository for FlakyRepository {
    async fn get_video(&self, id: Uuid) -> RepositoryResult<Video> {
        self.inner.get_video(id).await
    }

    async fn update_video(&self, video: &Video) -> RepositoryResult<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(RepositoryError::Persistence(
                "simulated write failure".to_string(),
            ));
        }
        self.inner.update_video(video).await
    }
}
