//! Tubely Storage Library
//!
//! This crate provides the storage abstraction and its S3 and local
//! filesystem implementations, plus storage key derivation.
//!
//! # Storage key format
//!
//! Video keys are partitioned by orientation:
//!
//! - `{orientation}/{token}.{extension}`, e.g. `landscape/3q2-7wEv...Xw.mp4`
//!
//! `token` is 32 bytes from the operating system's secure random source,
//! base64url-encoded without padding. Keys must not contain `..` or a
//! leading `/`. Key generation is centralized in the `keys` module so all
//! backends stay consistent.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use keys::{derive_storage_key, extension_for_media_type, StorageKey};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
pub use tubely_core::StorageBackend;
