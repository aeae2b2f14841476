//! Tubely DB Library
//!
//! Record-store boundary for video records. Ingestion reads a record and
//! writes it back; the store itself (and its concurrency control) is owned
//! by whatever implements [`VideoRepository`].

pub mod video;

pub use video::{MemoryVideoRepository, RepositoryError, RepositoryResult, VideoRepository};
