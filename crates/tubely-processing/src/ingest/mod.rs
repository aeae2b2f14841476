//! The video ingestion pipeline.
//!
//! An upload moves through `Received → Staged → Remuxed → Classified →
//! Uploaded → Committed`, or ends in `Failed` at any step. The record's URL is
//! only written after the storage upload succeeded, and every local temp file
//! created by a run is gone once the run reaches a terminal state or is
//! dropped.

mod error;
mod pipeline;
mod service;
mod state;

pub use error::{IngestError, IngestErrorKind, IngestStage};
pub use pipeline::{
    is_mp4_content_type, IngestConfig, IngestPipeline, IngestRun, UploadedAsset,
    REQUIRED_CONTENT_TYPE,
};
pub use service::VideoIngestService;
pub use state::IngestState;
