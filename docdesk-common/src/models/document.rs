//! Document, signer, and company records as exchanged with the REST API
//!
//! Field names follow the e-signature API verbatim. Timestamps are kept as the
//! server's text so an unexpected format never fails a whole document listing.

use super::{CompanyId, DocumentId};
use serde::{Deserialize, Serialize};

/// A document managed through the e-signature API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Server identifier (absent until the document is created)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DocumentId>,
    /// Owning company
    pub company: CompanyId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Display name
    pub name: String,
    /// Signature workflow status reported by the provider (pending, signed, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Source PDF location
    pub pdf_url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signers: Vec<Signer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_limit_to_sign: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_token: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_docs: Vec<ExtraDoc>,
}

impl Document {
    /// New, not yet persisted document
    pub fn new(company: CompanyId, name: impl Into<String>, pdf_url: impl Into<String>) -> Self {
        Self {
            id: None,
            company,
            open_id: None,
            token: None,
            name: name.into(),
            status: None,
            created_at: None,
            last_updated_at: None,
            created_by: None,
            external_id: None,
            pdf_url: pdf_url.into(),
            signers: Vec::new(),
            signer_name: None,
            signer_email: None,
            date_limit_to_sign: None,
            folder_path: None,
            folder_token: None,
            extra_docs: Vec::new(),
        }
    }

    /// Same document with a server identifier assigned
    pub fn with_id(mut self, id: DocumentId) -> Self {
        self.id = Some(id);
        self
    }
}

/// A signer attached to a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

/// Additional file bundled with a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraDoc {
    pub token: String,
    pub name: String,
}

/// Company account registered with the e-signature provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub api_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_at: Option<String>,
}
