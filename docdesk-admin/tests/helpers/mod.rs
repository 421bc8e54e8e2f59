//! Test Helper Utilities
//!
//! Scripted in-memory gateways for driving the view and supervisor on
//! tokio's paused clock.

#![allow(dead_code)]

use async_trait::async_trait;
use docdesk_admin::{
    AnalysisGateway, ConfirmationPort, ConfirmationRequest, DocumentGateway, RequestError,
};
use docdesk_common::{
    AnalysisId, AnalysisRecord, AnalysisStatus, Company, CompanyId, Document, DocumentId,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub type FetchResult = Result<Option<AnalysisRecord>, RequestError>;

/// Analysis record with a predictable server id (document id * 100)
pub fn record(document: u64, status: AnalysisStatus) -> AnalysisRecord {
    AnalysisRecord {
        analysis_id: Some(AnalysisId(document * 100)),
        document_id: DocumentId(document),
        status,
        summary: None,
        insights: Vec::new(),
        missing_topics: Vec::new(),
    }
}

pub fn completed(document: u64, summary: &str) -> AnalysisRecord {
    AnalysisRecord {
        summary: Some(summary.to_string()),
        insights: vec!["signature block present".to_string()],
        ..record(document, AnalysisStatus::Completed)
    }
}

pub fn network_error() -> RequestError {
    RequestError::NetworkError("connection refused".to_string())
}

pub fn document(id: u64, name: &str) -> Document {
    Document::new(CompanyId(1), name, format!("https://files.example.test/{}.pdf", id))
        .with_id(DocumentId(id))
}

/// AnalysisGateway answering from per-document scripts
///
/// Each fetch consumes the next scripted result; the last result repeats.
/// Unscripted documents report no analysis.
#[derive(Default)]
pub struct ScriptedAnalysisGateway {
    fetch_scripts: Mutex<HashMap<DocumentId, VecDeque<FetchResult>>>,
    fetch_delays: Mutex<HashMap<DocumentId, Duration>>,
    fetch_counts: Mutex<HashMap<DocumentId, usize>>,
    start_results: Mutex<HashMap<DocumentId, Result<AnalysisRecord, RequestError>>>,
    start_calls: Mutex<Vec<(DocumentId, bool)>>,
    delete_result: Mutex<Option<RequestError>>,
    deleted: Mutex<Vec<AnalysisId>>,
}

impl ScriptedAnalysisGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, document: u64, results: Vec<FetchResult>) {
        self.fetch_scripts
            .lock()
            .unwrap()
            .insert(DocumentId(document), results.into());
    }

    /// Script a sequence of in-server statuses for a document
    pub fn script_statuses(&self, document: u64, statuses: &[AnalysisStatus]) {
        let results = statuses
            .iter()
            .map(|status| Ok(Some(record(document, *status))))
            .collect();
        self.script(document, results);
    }

    pub fn set_fetch_delay(&self, document: u64, delay: Duration) {
        self.fetch_delays
            .lock()
            .unwrap()
            .insert(DocumentId(document), delay);
    }

    pub fn set_start_result(&self, document: u64, result: Result<AnalysisRecord, RequestError>) {
        self.start_results
            .lock()
            .unwrap()
            .insert(DocumentId(document), result);
    }

    pub fn fail_deletes(&self, error: RequestError) {
        *self.delete_result.lock().unwrap() = Some(error);
    }

    pub fn fetch_count(&self, document: u64) -> usize {
        self.fetch_counts
            .lock()
            .unwrap()
            .get(&DocumentId(document))
            .copied()
            .unwrap_or(0)
    }

    pub fn start_calls(&self) -> Vec<(DocumentId, bool)> {
        self.start_calls.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<AnalysisId> {
        self.deleted.lock().unwrap().clone()
    }

    fn next_fetch(&self, document_id: DocumentId) -> FetchResult {
        let mut scripts = self.fetch_scripts.lock().unwrap();
        match scripts.get_mut(&document_id) {
            Some(script) if script.len() > 1 => script.pop_front().unwrap_or(Ok(None)),
            Some(script) => script.front().cloned().unwrap_or(Ok(None)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl AnalysisGateway for ScriptedAnalysisGateway {
    async fn start(
        &self,
        document_id: DocumentId,
        force_reanalysis: bool,
    ) -> Result<AnalysisRecord, RequestError> {
        self.start_calls
            .lock()
            .unwrap()
            .push((document_id, force_reanalysis));
        let scripted = self.start_results.lock().unwrap().get(&document_id).cloned();
        scripted.unwrap_or_else(|| Ok(record(document_id.0, AnalysisStatus::Pending)))
    }

    async fn fetch(&self, document_id: DocumentId) -> FetchResult {
        *self
            .fetch_counts
            .lock()
            .unwrap()
            .entry(document_id)
            .or_insert(0) += 1;

        let delay = self.fetch_delays.lock().unwrap().get(&document_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.next_fetch(document_id)
    }

    async fn delete(&self, analysis_id: AnalysisId) -> Result<(), RequestError> {
        if let Some(error) = self.delete_result.lock().unwrap().clone() {
            return Err(error);
        }
        self.deleted.lock().unwrap().push(analysis_id);
        Ok(())
    }
}

/// DocumentGateway over a mutable in-memory list
#[derive(Default)]
pub struct StaticDocumentGateway {
    documents: Mutex<Vec<Document>>,
    companies: Mutex<Vec<Company>>,
    list_error: Mutex<Option<RequestError>>,
    list_calls: Mutex<Vec<Option<CompanyId>>>,
}

impl StaticDocumentGateway {
    pub fn with_documents(documents: Vec<Document>) -> Self {
        let gateway = Self::default();
        *gateway.documents.lock().unwrap() = documents;
        gateway
    }

    pub fn set_documents(&self, documents: Vec<Document>) {
        *self.documents.lock().unwrap() = documents;
    }

    pub fn set_companies(&self, companies: Vec<Company>) {
        *self.companies.lock().unwrap() = companies;
    }

    pub fn fail_list(&self, error: Option<RequestError>) {
        *self.list_error.lock().unwrap() = error;
    }

    pub fn list_calls(&self) -> Vec<Option<CompanyId>> {
        self.list_calls.lock().unwrap().clone()
    }

    fn not_found(document_id: DocumentId) -> RequestError {
        RequestError::ApiError(404, format!("document {} not found", document_id))
    }
}

#[async_trait]
impl DocumentGateway for StaticDocumentGateway {
    async fn list(&self, company: Option<CompanyId>) -> Result<Vec<Document>, RequestError> {
        self.list_calls.lock().unwrap().push(company);
        if let Some(error) = self.list_error.lock().unwrap().clone() {
            return Err(error);
        }
        let documents = self.documents.lock().unwrap().clone();
        Ok(match company {
            Some(company) => documents.into_iter().filter(|d| d.company == company).collect(),
            None => documents,
        })
    }

    async fn get(&self, document_id: DocumentId) -> Result<Document, RequestError> {
        self.documents
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.id == Some(document_id))
            .cloned()
            .ok_or_else(|| Self::not_found(document_id))
    }

    async fn create(&self, document: &Document) -> Result<Document, RequestError> {
        let mut documents = self.documents.lock().unwrap();
        let next_id = documents.iter().filter_map(|d| d.id).map(|id| id.0).max().unwrap_or(0) + 1;
        let created = document.clone().with_id(DocumentId(next_id));
        documents.push(created.clone());
        Ok(created)
    }

    async fn update(
        &self,
        document_id: DocumentId,
        document: &Document,
    ) -> Result<Document, RequestError> {
        let mut documents = self.documents.lock().unwrap();
        let slot = documents
            .iter_mut()
            .find(|d| d.id == Some(document_id))
            .ok_or_else(|| Self::not_found(document_id))?;
        *slot = document.clone().with_id(document_id);
        Ok(slot.clone())
    }

    async fn delete(&self, document_id: DocumentId) -> Result<(), RequestError> {
        let mut documents = self.documents.lock().unwrap();
        let before = documents.len();
        documents.retain(|d| d.id != Some(document_id));
        if documents.len() == before {
            return Err(Self::not_found(document_id));
        }
        Ok(())
    }

    async fn companies(&self) -> Result<Vec<Company>, RequestError> {
        Ok(self.companies.lock().unwrap().clone())
    }
}

/// Confirmation port that records every question
pub struct RecordingConfirmation {
    answer: AtomicBool,
    asked: Mutex<Vec<ConfirmationRequest>>,
}

impl RecordingConfirmation {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer: AtomicBool::new(answer),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn set_answer(&self, answer: bool) {
        self.answer.store(answer, Ordering::SeqCst);
    }

    pub fn asked(&self) -> Vec<ConfirmationRequest> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConfirmationPort for RecordingConfirmation {
    async fn confirm(&self, request: &ConfirmationRequest) -> bool {
        self.asked.lock().unwrap().push(request.clone());
        self.answer.load(Ordering::SeqCst)
    }
}
