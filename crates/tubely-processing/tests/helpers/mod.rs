#![allow(dead_code)]

pub mod fakes;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tubely_core::Video;
use tubely_db::VideoRepository;
use tubely_processing::{IngestConfig, IngestPipeline, UploadedAsset, VideoIngestService};
use uuid::Uuid;

use fakes::{FakeToolchain, FlakyRepository, MemoryStorage};

/// Bytes that start like an MP4 (`ftyp` box); the fakes never decode them.
pub fn synthetic_mp4(len: usize) -> Vec<u8> {
    let mut data = b"\x00\x00\x00\x18ftypmp42\x00\x00\x00\x00mp42isom".to_vec();
    data.resize(len.max(data.len()), 0xA5);
    data
}

pub fn mp4_upload(data: &[u8]) -> UploadedAsset {
    UploadedAsset::new("video/mp4", std::io::Cursor::new(data.to_vec()))
}

/// Files left in `dir` (recursively).
pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                found.extend(files_in(&path));
            } else {
                found.push(path);
            }
        }
    }
    found
}

/// Pipeline wired to fakes, with its own staging directory.
pub struct Harness {
    pub staging: TempDir,
    pub storage: Arc<MemoryStorage>,
    pub videos: Arc<FlakyRepository>,
    pub pipeline: IngestPipeline,
    pub service: VideoIngestService,
}

impl Harness {
    pub fn new(toolchain: FakeToolchain) -> Self {
        Self::with_limit(toolchain, 64 * 1024 * 1024)
    }

    pub fn with_limit(toolchain: FakeToolchain, max_upload_bytes: u64) -> Self {
        let staging = tempfile::tempdir().unwrap();
        let storage = Arc::new(MemoryStorage::new());
        let videos = Arc::new(FlakyRepository::new());
        let pipeline = IngestPipeline::new(
            Arc::new(toolchain),
            storage.clone(),
            videos.clone(),
            // Nested so the pipeline has to create it.
            IngestConfig::new(staging.path().join("uploads"), max_upload_bytes),
        );
        let service = VideoIngestService::new(pipeline.clone());

        Self {
            staging,
            storage,
            videos,
            pipeline,
            service,
        }
    }

    pub async fn seed_video(&self, owner: Uuid) -> Video {
        let video = Video::new(owner, "boots.mp4");
        self.videos.inner().insert(video.clone()).await;
        video
    }

    pub async fn stored(&self, id: Uuid) -> Video {
        self.videos.get_video(id).await.unwrap()
    }

    pub fn leftover_files(&self) -> Vec<PathBuf> {
        files_in(self.staging.path())
    }
}
