//! Scoped local temp files.

use std::path::{Path, PathBuf};

/// A local file that is removed when the handle is dropped.
///
/// Removal is best-effort: failures other than "already gone" are logged at
/// `warn` and never escalated. Drop also runs during panic unwinding and when
/// an in-flight future owning the handle is cancelled.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
}

impl TempArtifact {
    /// Take ownership of `path`. The file does not need to exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AsRef<Path> for TempArtifact {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Removed temp file");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to remove temp file"
                );
            }
        }
    }
}
