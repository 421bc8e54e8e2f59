//! Yes/no prompt asked before destructive operations

use async_trait::async_trait;
use docdesk_common::DocumentId;
use std::fmt;

/// What the user is asked to approve
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationRequest {
    RemoveAnalysis { document_id: DocumentId },
    DeleteDocument { document_id: DocumentId, name: String },
}

impl ConfirmationRequest {
    pub fn document_id(&self) -> DocumentId {
        match self {
            ConfirmationRequest::RemoveAnalysis { document_id }
            | ConfirmationRequest::DeleteDocument { document_id, .. } => *document_id,
        }
    }

    /// Question shown to the user
    pub fn prompt(&self) -> String {
        match self {
            ConfirmationRequest::RemoveAnalysis { document_id } => {
                format!("Remove the analysis of document {}?", document_id)
            }
            ConfirmationRequest::DeleteDocument { document_id, name } => {
                format!("Delete document \"{}\" ({})?", name, document_id)
            }
        }
    }
}

impl fmt::Display for ConfirmationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prompt())
    }
}

/// Source of user confirmation
#[async_trait]
pub trait ConfirmationPort: Send + Sync {
    /// True to proceed
    async fn confirm(&self, request: &ConfirmationRequest) -> bool;
}

/// Answers every request the same way (`--yes`, tests)
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

#[async_trait]
impl ConfirmationPort for AutoConfirm {
    async fn confirm(&self, request: &ConfirmationRequest) -> bool {
        tracing::debug!(request = %request, answer = self.0, "Auto confirmation");
        self.0
    }
}
