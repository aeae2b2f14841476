//! Configuration module
//!
//! Settings for storage addressing, local staging and the external media
//! tools, read from the environment (and `.env` when present).

use std::env;
use std::path::{Path, PathBuf};

use crate::storage_types::StorageBackend;

const MAX_VIDEO_SIZE_MB: u64 = 1024;
const TOOL_TIMEOUT_SECS: u64 = 600;

/// Video ingestion configuration
#[derive(Clone, Debug)]
pub struct MediaIngestConfig {
    // Storage configuration
    pub storage_backend: Option<StorageBackend>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO, etc.)
    pub aws_region: Option<String>,
    pub s3_cf_distribution: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    // Staging and media tools
    pub staging_dir: PathBuf,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub max_video_size_bytes: u64,
    pub tool_timeout_secs: u64,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<MediaIngestConfig>);

impl Config {
    fn as_media(&self) -> &MediaIngestConfig {
        &self.0
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = MediaIngestConfig::from_lookup(lookup)?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.as_media().validate()
    }

    pub fn storage_backend(&self) -> Option<StorageBackend> {
        self.as_media().storage_backend
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.as_media().s3_bucket.as_deref()
    }

    pub fn s3_region(&self) -> Option<&str> {
        self.as_media().s3_region.as_deref()
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.as_media().s3_endpoint.as_deref()
    }

    pub fn aws_region(&self) -> Option<&str> {
        self.as_media().aws_region.as_deref()
    }

    /// CDN distribution prefix used in place of the bucket URL when set.
    pub fn s3_cf_distribution(&self) -> Option<&str> {
        self.as_media().s3_cf_distribution.as_deref()
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.as_media().local_storage_path.as_deref()
    }

    pub fn local_storage_base_url(&self) -> Option<&str> {
        self.as_media().local_storage_base_url.as_deref()
    }

    pub fn staging_dir(&self) -> &Path {
        &self.as_media().staging_dir
    }

    pub fn ffmpeg_path(&self) -> &str {
        &self.as_media().ffmpeg_path
    }

    pub fn ffprobe_path(&self) -> &str {
        &self.as_media().ffprobe_path
    }

    pub fn max_video_size_bytes(&self) -> u64 {
        self.as_media().max_video_size_bytes
    }

    pub fn tool_timeout_secs(&self) -> u64 {
        self.as_media().tool_timeout_secs
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn parse_number<F>(lookup: &F, key: &str, default: u64) -> Result<u64, anyhow::Error>
where
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup(key)) {
        Some(value) => value
            .parse::<u64>()
            .map_err(|_| anyhow::anyhow!("{} must be a valid number", key)),
        None => Ok(default),
    }
}

impl MediaIngestConfig {
    fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage_backend = match non_empty(lookup("STORAGE_BACKEND")) {
            Some(value) => Some(value.parse::<StorageBackend>()?),
            None => None,
        };

        let staging_dir = non_empty(lookup("STAGING_DIR"))
            .map(PathBuf::from)
            .unwrap_or_else(env::temp_dir);

        let max_video_size_bytes = parse_number(&lookup, "MAX_VIDEO_SIZE_MB", MAX_VIDEO_SIZE_MB)?
            .checked_mul(1024 * 1024)
            .ok_or_else(|| anyhow::anyhow!("MAX_VIDEO_SIZE_MB must be a valid number"))?;
        let tool_timeout_secs = parse_number(&lookup, "TOOL_TIMEOUT_SECS", TOOL_TIMEOUT_SECS)?;

        let config = MediaIngestConfig {
            storage_backend,
            s3_bucket: non_empty(lookup("S3_BUCKET")),
            s3_region: non_empty(lookup("S3_REGION")),
            s3_endpoint: non_empty(lookup("S3_ENDPOINT")),
            aws_region: non_empty(lookup("AWS_REGION")),
            s3_cf_distribution: non_empty(lookup("S3_CF_DISTRIBUTION"))
                .map(|s| s.trim_end_matches('/').to_string()),
            local_storage_path: non_empty(lookup("LOCAL_STORAGE_PATH")),
            local_storage_base_url: non_empty(lookup("LOCAL_STORAGE_BASE_URL")),
            staging_dir,
            ffmpeg_path: non_empty(lookup("FFMPEG_PATH")).unwrap_or_else(|| "ffmpeg".to_string()),
            ffprobe_path: non_empty(lookup("FFPROBE_PATH"))
                .unwrap_or_else(|| "ffprobe".to_string()),
            max_video_size_bytes,
            tool_timeout_secs,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.max_video_size_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_VIDEO_SIZE_MB must be greater than 0"));
        }

        if self.tool_timeout_secs == 0 {
            return Err(anyhow::anyhow!("TOOL_TIMEOUT_SECS must be greater than 0"));
        }

        if let Some(ref cdn) = self.s3_cf_distribution {
            if !cdn.starts_with("https://") && !cdn.starts_with("http://") {
                return Err(anyhow::anyhow!(
                    "S3_CF_DISTRIBUTION must be an absolute http(s) URL"
                ));
            }
        }

        // Validate storage backend configuration
        let backend = self.storage_backend.unwrap_or(StorageBackend::S3);
        match backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.s3_region.is_none() && self.aws_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                    ));
                }
            }
        }

        Ok(())
    }
}
