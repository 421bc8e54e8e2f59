//! # docdesk Common Library
//!
//! Shared code for the docdesk workspace including:
//! - Document, company, and analysis models
//! - Event types (DocdeskEvent enum) and the EventBus
//! - Configuration loading
//! - Common error types

pub mod config;
pub mod error;
pub mod events;
pub mod models;

pub use error::{Error, Result};
pub use models::{
    AnalysisId, AnalysisRecord, AnalysisStatus, AnalysisSummary, Company, CompanyId, Document,
    DocumentId,
};
