//! REST gateway contracts
//!
//! The orchestration core only talks to these traits. [`ApiClient`] is the
//! production implementation; tests substitute scripted in-memory gateways.

mod http_client;

pub use http_client::ApiClient;

use crate::error::RequestError;
use async_trait::async_trait;
use docdesk_common::{AnalysisId, AnalysisRecord, Company, CompanyId, Document, DocumentId};

/// Analysis endpoints of the REST API
#[async_trait]
pub trait AnalysisGateway: Send + Sync {
    /// Ask the server to analyze a document
    ///
    /// With `force_reanalysis` unset the server may hand back an existing
    /// analysis instead of starting a new one.
    async fn start(
        &self,
        document_id: DocumentId,
        force_reanalysis: bool,
    ) -> Result<AnalysisRecord, RequestError>;

    /// Current analysis of a document; `Ok(None)` when none exists
    async fn fetch(&self, document_id: DocumentId) -> Result<Option<AnalysisRecord>, RequestError>;

    async fn delete(&self, analysis_id: AnalysisId) -> Result<(), RequestError>;
}

/// Document and company endpoints of the REST API
#[async_trait]
pub trait DocumentGateway: Send + Sync {
    /// All documents, optionally restricted to one company
    async fn list(&self, company: Option<CompanyId>) -> Result<Vec<Document>, RequestError>;

    async fn get(&self, document_id: DocumentId) -> Result<Document, RequestError>;

    async fn create(&self, document: &Document) -> Result<Document, RequestError>;

    async fn update(
        &self,
        document_id: DocumentId,
        document: &Document,
    ) -> Result<Document, RequestError>;

    async fn delete(&self, document_id: DocumentId) -> Result<(), RequestError>;

    async fn companies(&self) -> Result<Vec<Company>, RequestError>;
}
