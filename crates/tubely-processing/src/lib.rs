//! Tubely Processing Library
//!
//! Video ingestion: fast-start remuxing and orientation classification via
//! external ffmpeg/ffprobe processes, and the staged ingestion pipeline that
//! publishes a remuxed upload to storage and commits its URL to the record.

pub mod error;
pub mod ingest;
pub mod temp;
pub mod video;

// Re-export commonly used types
pub use error::ProcessingError;
pub use ingest::{
    IngestConfig, IngestError, IngestErrorKind, IngestPipeline, IngestRun, IngestStage,
    IngestState, UploadedAsset, VideoIngestService,
};
pub use temp::TempArtifact;
pub use video::{
    classify_geometry, classify_streams, FastStartRemuxer, FfmpegToolchain, FfprobeService,
    MediaToolchain, ProbeError, RemuxError, StreamInfo,
};
