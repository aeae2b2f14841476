use crate::video::{ProbeError, RemuxError};
use thiserror::Error;

/// Failures of the external media tools.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Remux(#[from] RemuxError),

    #[error("Invalid tool path: {0}")]
    InvalidToolPath(String),
}

impl ProcessingError {
    /// Captured stderr of the failing tool, if any. Meant for logs, not callers.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            ProcessingError::Probe(ProbeError::ExecutionFailed { stderr, .. })
            | ProcessingError::Remux(RemuxError::ExecutionFailed { stderr, .. }) => {
                stderr.as_deref()
            }
            _ => None,
        }
    }
}
