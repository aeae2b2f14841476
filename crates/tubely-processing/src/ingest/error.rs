use crate::error::ProcessingError;
use crate::video::ProbeError;
use std::fmt::{Display, Formatter, Result as FmtResult};
use thiserror::Error;
use tubely_core::AppError;
use tubely_db::RepositoryError;
use tubely_storage::StorageError;
use uuid::Uuid;

/// Where in the ingestion an error happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IngestStage {
    /// Ownership and content-type checks before a run starts.
    Admission,
    Staging,
    Remuxing,
    Classifying,
    Uploading,
    Committing,
}

impl IngestStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStage::Admission => "admission",
            IngestStage::Staging => "staging",
            IngestStage::Remuxing => "remuxing",
            IngestStage::Classifying => "classifying",
            IngestStage::Uploading => "uploading",
            IngestStage::Committing => "committing",
        }
    }
}

impl Display for IngestStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum IngestErrorKind {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Processing(#[from] ProcessingError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Persistence(RepositoryError),

    #[error("Video {0} not found")]
    NotFound(Uuid),

    #[error("User is not the owner of this video")]
    Unauthorized,

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("Upload exceeds the {limit_bytes} byte limit")]
    PayloadTooLarge { limit_bytes: u64 },

    #[error("Ingestion cancelled")]
    Cancelled,
}

/// A failed ingestion: the stage that failed and why.
#[derive(Debug, Error)]
#[error("Ingestion failed while {stage}: {kind}")]
pub struct IngestError {
    stage: IngestStage,
    #[source]
    kind: IngestErrorKind,
}

impl IngestError {
    pub fn new(stage: IngestStage, kind: impl Into<IngestErrorKind>) -> Self {
        Self {
            stage,
            kind: kind.into(),
        }
    }

    pub fn stage(&self) -> IngestStage {
        self.stage
    }

    pub fn kind(&self) -> &IngestErrorKind {
        &self.kind
    }

    pub fn into_kind(self) -> IngestErrorKind {
        self.kind
    }

    /// Captured external tool output, for logs. Never the user-facing message.
    pub fn diagnostics(&self) -> Option<&str> {
        match &self.kind {
            IngestErrorKind::Processing(e) => e.diagnostics(),
            _ => None,
        }
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        let stage = err.stage;
        match err.kind {
            IngestErrorKind::NotFound(id) => AppError::NotFound(format!("Video {}", id)),
            IngestErrorKind::Unauthorized => {
                AppError::Unauthorized("User is not the owner of this video".to_string())
            }
            IngestErrorKind::UnsupportedContentType(content_type) => {
                AppError::UnsupportedMediaType(content_type)
            }
            IngestErrorKind::PayloadTooLarge { limit_bytes } => AppError::PayloadTooLarge(format!(
                "Upload exceeds the {} byte limit",
                limit_bytes
            )),
            IngestErrorKind::Cancelled => {
                AppError::Cancelled(format!("Ingestion cancelled while {}", stage))
            }
            IngestErrorKind::Processing(ProcessingError::Probe(ProbeError::NoStreams)) => {
                AppError::InvalidInput("Uploaded file contains no video streams".to_string())
            }
            IngestErrorKind::Processing(e) => {
                let diagnostics = e.diagnostics().map(String::from);
                AppError::MediaProcessing {
                    message: format!("{} while {}", e, stage),
                    diagnostics,
                }
            }
            IngestErrorKind::Storage(e) => AppError::Storage(e.to_string()),
            IngestErrorKind::Persistence(e) => AppError::Database(e.to_string()),
            IngestErrorKind::Io(e) => AppError::Internal(format!("I/O error while {}: {}", stage, e)),
        }
    }
}
