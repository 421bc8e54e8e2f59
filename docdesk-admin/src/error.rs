//! Error types for the admin client

use docdesk_common::DocumentId;
use thiserror::Error;

/// Gateway call failure
///
/// A missing analysis is not an error; gateways report it as `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),

    /// Request could not be built (bad URL, missing document id)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl RequestError {
    /// HTTP status of an API error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::ApiError(status, _) => Some(*status),
            _ => None,
        }
    }
}

/// Failure of a view operation
#[derive(Debug, Error)]
pub enum ViewError {
    #[error(transparent)]
    Request(#[from] RequestError),

    /// Operation named a document that is not in the loaded list
    #[error("Unknown document: {0}")]
    UnknownDocument(DocumentId),

    #[error("Document has no id")]
    MissingDocumentId,
}

pub type ViewResult<T> = std::result::Result<T, ViewError>;
