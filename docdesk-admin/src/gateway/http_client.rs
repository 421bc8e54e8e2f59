//! reqwest implementation of the gateway traits

use super::{AnalysisGateway, DocumentGateway};
use crate::error::RequestError;
use async_trait::async_trait;
use docdesk_common::config::TomlConfig;
use docdesk_common::{
    AnalysisId, AnalysisRecord, AnalysisStatus, Company, CompanyId, Document, DocumentId,
};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

const USER_AGENT: &str = concat!("docdesk/", env!("CARGO_PKG_VERSION"));

/// Analysis as the server reports it
#[derive(Debug, Deserialize)]
struct AnalysisPayload {
    id: Option<AnalysisId>,
    #[serde(default, alias = "document_id")]
    document: Option<DocumentId>,
    analysis_status: AnalysisStatus,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    insights: Option<Vec<Value>>,
    #[serde(default)]
    missing_topics: Option<Vec<Value>>,
}

impl AnalysisPayload {
    fn into_record(self, requested: DocumentId) -> AnalysisRecord {
        AnalysisRecord {
            analysis_id: self.id,
            document_id: self.document.unwrap_or(requested),
            status: self.analysis_status,
            summary: self.summary,
            insights: text_items(self.insights),
            missing_topics: text_items(self.missing_topics),
        }
    }
}

/// Insight entries are usually strings; anything else is kept as its JSON text
fn text_items(items: Option<Vec<Value>>) -> Vec<String> {
    items
        .unwrap_or_default()
        .into_iter()
        .map(|item| match item {
            Value::String(text) => text,
            other => other.to_string(),
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct StartAnalysisBody {
    document_id: DocumentId,
    force_reanalysis: bool,
}

/// Document list responses come bare or paginated; anything else is empty
fn unwrap_document_list(body: Value) -> Result<Vec<Document>, RequestError> {
    let items = match body {
        Value::Array(_) => body,
        Value::Object(mut map) => match map.remove("results") {
            Some(results @ Value::Array(_)) => results,
            _ => return Ok(Vec::new()),
        },
        _ => return Ok(Vec::new()),
    };
    serde_json::from_value(items).map_err(|e| RequestError::ParseError(e.to_string()))
}

/// HTTP client for the document/analysis REST API
#[derive(Debug, Clone)]
pub struct ApiClient {
    http_client: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a client rooted at `base_url` (e.g. `http://localhost:8000/api/`)
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RequestError> {
        // Url::join drops the last segment unless the base ends in '/'
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| RequestError::InvalidRequest(format!("bad base URL {:?}: {}", base_url, e)))?;

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| RequestError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    pub fn from_config(config: &TomlConfig) -> Result<Self, RequestError> {
        Self::new(&config.api_base_url, config.request_timeout())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, RequestError> {
        self.base_url
            .join(path)
            .map_err(|e| RequestError::InvalidRequest(format!("bad path {:?}: {}", path, e)))
    }

    /// Send a request; non-success statuses become `ApiError`
    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> Result<reqwest::Response, RequestError> {
        tracing::debug!(method = %method, url = %url, "API request");

        let mut request = self.http_client.request(method, url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RequestError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(RequestError::ApiError(status.as_u16(), error_text));
        }
        Ok(response)
    }

    fn body<T: Serialize>(value: &T) -> Result<Option<Value>, RequestError> {
        serde_json::to_value(value)
            .map(Some)
            .map_err(|e| RequestError::InvalidRequest(e.to_string()))
    }

    async fn json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, RequestError> {
        response
            .json()
            .await
            .map_err(|e| RequestError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl AnalysisGateway for ApiClient {
    async fn start(
        &self,
        document_id: DocumentId,
        force_reanalysis: bool,
    ) -> Result<AnalysisRecord, RequestError> {
        let url = self.url("analyzer/create/")?;
        let body = StartAnalysisBody {
            document_id,
            force_reanalysis,
        };
        let response = self.send(Method::POST, url, Self::body(&body)?).await?;
        let payload: AnalysisPayload = Self::json(response).await?;
        let record = payload.into_record(document_id);

        tracing::info!(
            document_id = %document_id,
            analysis_id = ?record.analysis_id,
            status = %record.status,
            "Analysis requested"
        );
        Ok(record)
    }

    async fn fetch(&self, document_id: DocumentId) -> Result<Option<AnalysisRecord>, RequestError> {
        let url = self.url(&format!("analyzer/document/{}/", document_id))?;
        match self.send(Method::GET, url, None).await {
            Ok(response) => {
                let payload: AnalysisPayload = Self::json(response).await?;
                Ok(Some(payload.into_record(document_id)))
            }
            Err(RequestError::ApiError(status, _)) if status == StatusCode::NOT_FOUND.as_u16() => {
                tracing::debug!(document_id = %document_id, "No analysis on server");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, analysis_id: AnalysisId) -> Result<(), RequestError> {
        let url = self.url(&format!("analyzer/delete/{}/", analysis_id))?;
        self.send(Method::DELETE, url, None).await?;
        tracing::info!(analysis_id = %analysis_id, "Analysis deleted on server");
        Ok(())
    }
}

#[async_trait]
impl DocumentGateway for ApiClient {
    async fn list(&self, company: Option<CompanyId>) -> Result<Vec<Document>, RequestError> {
        let mut url = self.url("documents/")?;
        if let Some(company) = company {
            url.query_pairs_mut()
                .append_pair("company_id", &company.to_string());
        }
        let response = self.send(Method::GET, url, None).await?;
        let body: Value = Self::json(response).await?;
        let documents = unwrap_document_list(body)?;

        tracing::debug!(count = documents.len(), company = ?company, "Listed documents");
        Ok(documents)
    }

    async fn get(&self, document_id: DocumentId) -> Result<Document, RequestError> {
        let url = self.url(&format!("documents/{}/", document_id))?;
        let response = self.send(Method::GET, url, None).await?;
        Self::json(response).await
    }

    async fn create(&self, document: &Document) -> Result<Document, RequestError> {
        let url = self.url("documents/")?;
        let response = self.send(Method::POST, url, Self::body(document)?).await?;
        let created: Document = Self::json(response).await?;
        tracing::info!(document_id = ?created.id, name = %created.name, "Document created");
        Ok(created)
    }

    async fn update(
        &self,
        document_id: DocumentId,
        document: &Document,
    ) -> Result<Document, RequestError> {
        let url = self.url(&format!("documents/{}/", document_id))?;
        let response = self.send(Method::PUT, url, Self::body(document)?).await?;
        let updated: Document = Self::json(response).await?;
        tracing::info!(document_id = %document_id, "Document updated");
        Ok(updated)
    }

    async fn delete(&self, document_id: DocumentId) -> Result<(), RequestError> {
        let url = self.url(&format!("documents/{}/", document_id))?;
        self.send(Method::DELETE, url, None).await?;
        tracing::info!(document_id = %document_id, "Document deleted");
        Ok(())
    }

    async fn companies(&self) -> Result<Vec<Company>, RequestError> {
        let url = self.url("companies/")?;
        let response = self.send(Method::GET, url, None).await?;
        Self::json(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_creation_normalizes_base_url() {
        let client = ApiClient::new("http://localhost:8000/api", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:8000/api/");
        assert_eq!(
            client.url("analyzer/create/").unwrap().as_str(),
            "http://localhost:8000/api/analyzer/create/"
        );
    }

    #[test]
    fn test_client_rejects_garbage_url() {
        assert!(matches!(
            ApiClient::new("not a url", Duration::from_secs(5)),
            Err(RequestError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_payload_fills_document_from_request() {
        let payload: AnalysisPayload = serde_json::from_value(json!({
            "id": 31,
            "analysis_status": "completed",
            "summary": "ok",
            "insights": ["a", {"topic": "b"}],
            "missing_topics": null
        }))
        .unwrap();

        let record = payload.into_record(DocumentId(7));
        assert_eq!(record.document_id, DocumentId(7));
        assert_eq!(record.analysis_id, Some(AnalysisId(31)));
        assert_eq!(record.insights, vec!["a".to_string(), r#"{"topic":"b"}"#.to_string()]);
        assert!(record.missing_topics.is_empty());
    }

    #[test]
    fn test_document_list_shapes() {
        let doc = json!({"id": 1, "company": 1, "name": "A", "pdf_url": "u"});

        assert_eq!(unwrap_document_list(json!([doc.clone()])).unwrap().len(), 1);
        assert_eq!(
            unwrap_document_list(json!({"count": 1, "results": [doc]})).unwrap().len(),
            1
        );
        assert!(unwrap_document_list(json!({"detail": "odd"})).unwrap().is_empty());
        assert!(unwrap_document_list(json!("text")).unwrap().is_empty());
    }
}
