//! Document collection joined with per-document analyses
//!
//! The view owns the document list, the analysis store, and the poll
//! supervisor. Lock order everywhere: documents, then poll handles, then the
//! store. No lock is held across an `.await`.

use crate::analysis::{AnalysisMap, AnalysisStore, PollHandle, PollSettings, PollSupervisor};
use crate::confirm::{ConfirmationPort, ConfirmationRequest};
use crate::error::{RequestError, ViewError, ViewResult};
use crate::gateway::{AnalysisGateway, DocumentGateway};
use chrono::Utc;
use docdesk_common::config::{RemovalPolicy, TomlConfig};
use docdesk_common::events::{DocdeskEvent, EventBus};
use docdesk_common::{
    AnalysisId, AnalysisRecord, AnalysisStatus, AnalysisSummary, Company, CompanyId, Document,
    DocumentId,
};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Behaviour knobs for a [`DocumentCollectionView`]
#[derive(Debug, Clone, Default)]
pub struct ViewOptions {
    /// Restrict listing to one company
    pub company_id: Option<CompanyId>,
    pub removal_policy: RemovalPolicy,
    pub poll: PollSettings,
}

impl ViewOptions {
    pub fn from_config(config: &TomlConfig) -> Self {
        Self {
            company_id: config.company_id,
            removal_policy: config.removal_policy,
            poll: PollSettings::from_config(&config.polling),
        }
    }
}

/// Renderable state at one instant
///
/// A document without an entry in `analyses` has status `none`.
#[derive(Debug, Clone)]
pub struct CollectionSnapshot {
    pub documents: Arc<Vec<Document>>,
    pub analyses: AnalysisMap,
}

impl CollectionSnapshot {
    pub fn status(&self, document_id: DocumentId) -> AnalysisStatus {
        self.analyses
            .get(&document_id)
            .map(|r| r.status)
            .unwrap_or_default()
    }

    pub fn analysis(&self, document_id: DocumentId) -> Option<&AnalysisRecord> {
        self.analyses.get(&document_id)
    }

    /// Documents in list order with their analysis status
    pub fn rows(&self) -> impl Iterator<Item = (&Document, AnalysisStatus)> + '_ {
        self.documents.iter().map(move |doc| {
            let status = doc.id.map(|id| self.status(id)).unwrap_or_default();
            (doc, status)
        })
    }
}

/// Result of [`DocumentCollectionView::remove_analysis`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalOutcome {
    /// Removed locally and, when it had a server id, on the server
    Removed { analysis_id: Option<AnalysisId> },
    /// Server delete failed; the local removal stands
    RemovedLocally {
        analysis_id: AnalysisId,
        error: RequestError,
    },
    /// Server delete failed; the record (and its polling) was restored
    RolledBack {
        analysis_id: AnalysisId,
        error: RequestError,
    },
    /// The user declined; nothing changed
    Declined,
    /// The document had no analysis
    NothingToRemove,
}

/// A document list with independently evolving analyses attached
pub struct DocumentCollectionView {
    documents_gateway: Arc<dyn DocumentGateway>,
    analyses_gateway: Arc<dyn AnalysisGateway>,
    confirmation: Arc<dyn ConfirmationPort>,
    documents: RwLock<Arc<Vec<Document>>>,
    store: Arc<AnalysisStore>,
    supervisor: PollSupervisor,
    events: EventBus,
    options: ViewOptions,
}

impl DocumentCollectionView {
    pub fn new(
        documents_gateway: Arc<dyn DocumentGateway>,
        analyses_gateway: Arc<dyn AnalysisGateway>,
        confirmation: Arc<dyn ConfirmationPort>,
        events: EventBus,
        options: ViewOptions,
    ) -> Self {
        let store = Arc::new(AnalysisStore::new());
        let supervisor = PollSupervisor::new(
            Arc::clone(&analyses_gateway),
            Arc::clone(&store),
            events.clone(),
            options.poll,
        );

        Self {
            documents_gateway,
            analyses_gateway,
            confirmation,
            documents: RwLock::new(Arc::new(Vec::new())),
            store,
            supervisor,
            events,
            options,
        }
    }

    pub fn options(&self) -> &ViewOptions {
        &self.options
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DocdeskEvent> {
        self.events.subscribe()
    }

    fn documents_read(&self) -> RwLockReadGuard<'_, Arc<Vec<Document>>> {
        self.documents.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn documents_write(&self) -> RwLockWriteGuard<'_, Arc<Vec<Document>>> {
        self.documents.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_listed(documents: &[Document], document_id: DocumentId) -> bool {
        documents.iter().any(|d| d.id == Some(document_id))
    }

    pub fn contains_document(&self, document_id: DocumentId) -> bool {
        Self::is_listed(&self.documents_read(), document_id)
    }

    pub fn documents(&self) -> Arc<Vec<Document>> {
        self.documents_read().clone()
    }

    pub fn document(&self, document_id: DocumentId) -> Option<Document> {
        self.documents_read()
            .iter()
            .find(|d| d.id == Some(document_id))
            .cloned()
    }

    pub fn snapshot(&self) -> CollectionSnapshot {
        let documents = self.documents_read().clone();
        CollectionSnapshot {
            documents,
            analyses: self.store.snapshot(),
        }
    }

    pub fn status(&self, document_id: DocumentId) -> AnalysisStatus {
        self.store.status(document_id)
    }

    pub fn analysis(&self, document_id: DocumentId) -> Option<AnalysisRecord> {
        self.store.get(document_id)
    }

    /// Display digest of a document's analysis, if it has one
    pub fn analysis_summary(&self, document_id: DocumentId) -> Option<AnalysisSummary> {
        self.store.get(document_id).map(|r| r.summary_view())
    }

    pub fn is_polling(&self, document_id: DocumentId) -> bool {
        self.supervisor.is_polling(document_id)
    }

    pub fn poll_handle(&self, document_id: DocumentId) -> Option<PollHandle> {
        self.supervisor.handle(document_id)
    }

    pub fn live_polls(&self) -> usize {
        self.supervisor.live_count()
    }

    fn report_failure(&self, operation: &str, document_id: Option<DocumentId>, error: &RequestError) {
        warn!(operation, document_id = ?document_id, error = %error, "Request failed");
        self.events.emit_lossy(DocdeskEvent::RequestFailed {
            operation: operation.to_string(),
            document_id,
            error: error.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Fetch the document list and attach each document's analysis
    ///
    /// On failure the previous list and records are left untouched.
    pub async fn load(&self) -> ViewResult<CollectionSnapshot> {
        let listed = match self.documents_gateway.list(self.options.company_id).await {
            Ok(documents) => documents,
            Err(e) => {
                warn!(error = %e, "Failed to load documents");
                self.events.emit_lossy(DocdeskEvent::DocumentsLoadFailed {
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
                return Err(e.into());
            }
        };

        let mut seen = HashSet::new();
        let ids: Vec<DocumentId> = listed
            .iter()
            .filter_map(|d| d.id)
            .filter(|id| seen.insert(*id))
            .collect();
        let count = listed.len();

        let reconciled = {
            let mut documents = self.documents_write();
            *documents = Arc::new(listed);
            let cancelled = self.supervisor.retain(|id| seen.contains(&id));
            let dropped = self.store.retain(|id| seen.contains(&id));
            if !cancelled.is_empty() {
                debug!(documents = ?cancelled, "Stopped polling for removed documents");
            }
            dropped.len()
        };

        info!(count, reconciled, "Documents loaded");
        self.events.emit_lossy(DocdeskEvent::DocumentsLoaded {
            count,
            reconciled,
            timestamp: Utc::now(),
        });

        self.seed_analyses(ids).await;
        Ok(self.snapshot())
    }

    /// Fetch every document's analysis concurrently; failures are skipped
    async fn seed_analyses(&self, ids: Vec<DocumentId>) {
        let mut fetches: FuturesUnordered<_> = ids
            .into_iter()
            .filter(|id| !self.supervisor.is_polling(*id))
            .map(|document_id| {
                let gateway = Arc::clone(&self.analyses_gateway);
                async move { (document_id, gateway.fetch(document_id).await) }
            })
            .collect();

        while let Some((document_id, result)) = fetches.next().await {
            match result {
                Ok(observed) => self.seed(document_id, observed),
                Err(e) => {
                    debug!(document_id = %document_id, error = %e, "Analysis snapshot unavailable")
                }
            }
        }
    }

    fn seed(&self, document_id: DocumentId, observed: Option<AnalysisRecord>) {
        let documents = self.documents_read();
        if !Self::is_listed(&documents, document_id) {
            return;
        }
        // a poll started meanwhile owns this document's record
        if self.supervisor.is_polling(document_id) {
            return;
        }

        let decision = self.store.apply_observation(document_id, observed);
        if decision.schedule_next_poll {
            self.supervisor.start_polling(document_id);
        }
    }

    /// Ask the server to analyze a document and track the result
    ///
    /// A forced re-analysis replaces whatever record was stored; otherwise
    /// the server's answer goes through the lifecycle rules. Polling restarts
    /// whenever the stored analysis is replaced, so results still in flight
    /// for the old one are discarded.
    pub async fn request_analysis(
        &self,
        document_id: DocumentId,
        force_reanalysis: bool,
    ) -> ViewResult<AnalysisRecord> {
        if !self.contains_document(document_id) {
            return Err(ViewError::UnknownDocument(document_id));
        }

        let mut record = match self
            .analyses_gateway
            .start(document_id, force_reanalysis)
            .await
        {
            Ok(record) => record,
            Err(e) => {
                self.report_failure("start_analysis", Some(document_id), &e);
                return Err(e.into());
            }
        };
        record.document_id = document_id;

        let (previous, current) = {
            let documents = self.documents_read();
            if !Self::is_listed(&documents, document_id) {
                (None, None)
            } else {
                let previous = self.store.get(document_id);
                if force_reanalysis {
                    self.store.set(record.clone());
                } else {
                    self.store.apply_observation(document_id, Some(record.clone()));
                }
                let current = self.store.get(document_id);

                // a running poller may have a fetch in flight for the old analysis
                let replaced = match (&previous, &current) {
                    (Some(old), Some(new)) => !old.same_analysis(new),
                    _ => true,
                };
                if force_reanalysis || replaced {
                    self.supervisor.cancel(document_id);
                }

                if self.store.status(document_id).is_in_flight() {
                    self.supervisor.start_polling(document_id);
                } else {
                    self.supervisor.cancel(document_id);
                }
                (previous, current)
            }
        };

        match current {
            Some(stored) if previous.as_ref() != Some(&stored) => {
                info!(
                    document_id = %document_id,
                    analysis_id = ?stored.analysis_id,
                    status = %stored.status,
                    "Analysis started"
                );
                self.events.emit_lossy(DocdeskEvent::AnalysisStarted {
                    document_id,
                    analysis_id: stored.analysis_id,
                    status: stored.status,
                    timestamp: Utc::now(),
                });
                Ok(stored)
            }
            Some(stored) => {
                debug!(
                    document_id = %document_id,
                    status = %stored.status,
                    "Start request left the stored analysis unchanged"
                );
                Ok(stored)
            }
            None => Ok(record),
        }
    }

    /// Remove a document's analysis after confirmation
    ///
    /// Polling stops and the local record goes away before the server is
    /// asked; what happens when the server refuses depends on the removal
    /// policy.
    pub async fn remove_analysis(&self, document_id: DocumentId) -> ViewResult<RemovalOutcome> {
        let Some(existing) = self.store.get(document_id) else {
            return Ok(RemovalOutcome::NothingToRemove);
        };

        let request = ConfirmationRequest::RemoveAnalysis { document_id };
        if !self.confirmation.confirm(&request).await {
            debug!(document_id = %document_id, "Analysis removal declined");
            return Ok(RemovalOutcome::Declined);
        }

        let removed = {
            let _documents = self.documents_read();
            self.supervisor.cancel(document_id);
            self.store.delete(document_id)
        };
        let record = removed.unwrap_or(existing);
        let analysis_id = record.analysis_id;

        info!(document_id = %document_id, analysis_id = ?analysis_id, "Analysis removed");
        self.events.emit_lossy(DocdeskEvent::AnalysisRemoved {
            document_id,
            analysis_id,
            timestamp: Utc::now(),
        });

        let Some(analysis_id) = analysis_id else {
            return Ok(RemovalOutcome::Removed { analysis_id: None });
        };

        match self.analyses_gateway.delete(analysis_id).await {
            Ok(()) => Ok(RemovalOutcome::Removed {
                analysis_id: Some(analysis_id),
            }),
            Err(error) => {
                self.report_failure("delete_analysis", Some(document_id), &error);
                match self.options.removal_policy {
                    RemovalPolicy::LocalFirst => Ok(RemovalOutcome::RemovedLocally {
                        analysis_id,
                        error,
                    }),
                    RemovalPolicy::RollbackOnFailure => {
                        self.restore(record);
                        Ok(RemovalOutcome::RolledBack { analysis_id, error })
                    }
                }
            }
        }
    }

    /// Put a removed record back unless the document moved on meanwhile
    fn restore(&self, record: AnalysisRecord) {
        let document_id = record.document_id;
        let documents = self.documents_read();
        if !Self::is_listed(&documents, document_id) || self.store.get(document_id).is_some() {
            debug!(document_id = %document_id, "Skipping analysis rollback");
            return;
        }

        let in_flight = record.status.is_in_flight();
        self.store.set(record);
        if in_flight {
            self.supervisor.start_polling(document_id);
        }
        info!(document_id = %document_id, "Analysis removal rolled back");
    }

    pub async fn get_document(&self, document_id: DocumentId) -> ViewResult<Document> {
        Ok(self.documents_gateway.get(document_id).await?)
    }

    pub async fn companies(&self) -> ViewResult<Vec<Company>> {
        Ok(self.documents_gateway.companies().await?)
    }

    /// Create a document, then reload the list
    pub async fn create_document(&self, document: &Document) -> ViewResult<Document> {
        let created = match self.documents_gateway.create(document).await {
            Ok(created) => created,
            Err(e) => {
                self.report_failure("create_document", None, &e);
                return Err(e.into());
            }
        };

        if let Err(e) = self.load().await {
            debug!(error = %e, "Reload after create failed");
        }
        Ok(created)
    }

    /// Save changes to a listed document
    pub async fn update_document(&self, document: &Document) -> ViewResult<Document> {
        let document_id = document.id.ok_or(ViewError::MissingDocumentId)?;

        let updated = match self.documents_gateway.update(document_id, document).await {
            Ok(updated) => updated,
            Err(e) => {
                self.report_failure("update_document", Some(document_id), &e);
                return Err(e.into());
            }
        };

        {
            let mut documents = self.documents_write();
            if Self::is_listed(&documents, document_id) {
                let next: Vec<Document> = documents
                    .iter()
                    .map(|d| {
                        if d.id == Some(document_id) {
                            updated.clone()
                        } else {
                            d.clone()
                        }
                    })
                    .collect();
                *documents = Arc::new(next);
            }
        }
        Ok(updated)
    }

    /// Delete a document after confirmation, then reload the list
    ///
    /// Returns false when the user declined.
    pub async fn delete_document(&self, document_id: DocumentId) -> ViewResult<bool> {
        let name = self
            .document(document_id)
            .map(|d| d.name)
            .ok_or(ViewError::UnknownDocument(document_id))?;

        let request = ConfirmationRequest::DeleteDocument { document_id, name };
        if !self.confirmation.confirm(&request).await {
            debug!(document_id = %document_id, "Document deletion declined");
            return Ok(false);
        }

        if let Err(e) = self.documents_gateway.delete(document_id).await {
            self.report_failure("delete_document", Some(document_id), &e);
            return Err(e.into());
        }

        {
            let mut documents = self.documents_write();
            let remaining: Vec<Document> = documents
                .iter()
                .filter(|d| d.id != Some(document_id))
                .cloned()
                .collect();
            *documents = Arc::new(remaining);
            self.supervisor.cancel(document_id);
            self.store.delete(document_id);
        }

        info!(document_id = %document_id, "Document deleted");
        self.events.emit_lossy(DocdeskEvent::DocumentDeleted {
            document_id,
            timestamp: Utc::now(),
        });

        if let Err(e) = self.load().await {
            debug!(error = %e, "Reload after delete failed");
        }
        Ok(true)
    }

    /// Stop all background polling; returns how many polls were running
    pub fn dispose(&self) -> usize {
        let cancelled = self.supervisor.cancel_all();
        if cancelled > 0 {
            info!(cancelled, "Collection view disposed");
        }
        cancelled
    }
}

impl Drop for DocumentCollectionView {
    fn drop(&mut self) {
        self.dispose();
    }
}
