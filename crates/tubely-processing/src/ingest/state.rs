use super::error::{IngestError, IngestStage};
use tubely_core::{Orientation, Video};
use tubely_storage::StorageKey;

/// Progress of one ingestion run.
#[derive(Debug)]
pub enum IngestState {
    Received,
    Staged,
    Remuxed,
    Classified(Orientation),
    Uploaded(StorageKey),
    Committed(Video),
    Failed(IngestError),
}

impl IngestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, IngestState::Committed(_) | IngestState::Failed(_))
    }

    /// The stage that moves this state forward, `None` once terminal.
    pub fn pending_stage(&self) -> Option<IngestStage> {
        match self {
            IngestState::Received => Some(IngestStage::Staging),
            IngestState::Staged => Some(IngestStage::Remuxing),
            IngestState::Remuxed => Some(IngestStage::Classifying),
            IngestState::Classified(_) => Some(IngestStage::Uploading),
            IngestState::Uploaded(_) => Some(IngestStage::Committing),
            IngestState::Committed(_) | IngestState::Failed(_) => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            IngestState::Received => "received",
            IngestState::Staged => "staged",
            IngestState::Remuxed => "remuxed",
            IngestState::Classified(_) => "classified",
            IngestState::Uploaded(_) => "uploaded",
            IngestState::Committed(_) => "committed",
            IngestState::Failed(_) => "failed",
        }
    }
}
