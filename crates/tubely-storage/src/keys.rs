//! Storage key derivation.
//!
//! Key format: `{orientation}/{token}.{extension}` where `token` is the
//! base64url (no padding) encoding of 32 bytes drawn from the OS CSPRNG.
//! No uniqueness check is made against existing keys.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::rngs::OsRng;
use rand::TryRngCore;
use std::fmt::{Display, Formatter, Result as FmtResult};
use tubely_core::Orientation;

use crate::{StorageError, StorageResult};

const TOKEN_BYTES: usize = 32;

/// Extension used when a media type cannot be split into `type/subtype`.
pub const FALLBACK_EXTENSION: &str = "bin";

/// An object key of the form `{orientation}/{token}.{extension}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey {
    orientation: Orientation,
    token: String,
    extension: String,
    key: String,
}

impl StorageKey {
    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }
}

impl Display for StorageKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.key)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.key
    }
}

/// Derive a fresh, unpredictable storage key partitioned by orientation.
///
/// Fails only when the operating system's random source is unavailable.
pub fn derive_storage_key(orientation: Orientation, extension: &str) -> StorageResult<StorageKey> {
    let extension = extension.trim_start_matches('.');
    if extension.is_empty()
        || !extension
            .chars()
            .all(|c| c.is_ascii_alphanumeric())
    {
        return Err(StorageError::InvalidKey(format!(
            "invalid extension: {:?}",
            extension
        )));
    }

    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| StorageError::RandomnessUnavailable(e.to_string()))?;
    let token = URL_SAFE_NO_PAD.encode(bytes);

    let key = format!("{}/{}.{}", orientation, token, extension);
    Ok(StorageKey {
        orientation,
        token,
        extension: extension.to_string(),
        key,
    })
}

/// File extension for a media type: the subtype of `type/subtype`.
///
/// Parameters after `;` are ignored; anything that is not exactly two
/// non-empty parts yields [`FALLBACK_EXTENSION`].
pub fn extension_for_media_type(media_type: &str) -> String {
    let essence = media_type.split(';').next().unwrap_or("").trim();
    let parts: Vec<&str> = essence.split('/').collect();
    match parts.as_slice() {
        [kind, subtype] if !kind.is_empty() && !subtype.is_empty() => subtype.to_lowercase(),
        _ => FALLBACK_EXTENSION.to_string(),
    }
}

/// Reject keys that could escape a storage root.
pub fn validate_key(storage_key: &str) -> StorageResult<()> {
    if storage_key.is_empty() || storage_key.contains("..") || storage_key.starts_with('/') {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid characters".to_string(),
        ));
    }
    Ok(())
}
