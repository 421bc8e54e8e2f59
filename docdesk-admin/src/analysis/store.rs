//! In-memory analysis records, keyed by document
//!
//! Every mutation builds a new map and swaps it in, so a snapshot handed out
//! earlier is never modified underneath its holder.

use super::lifecycle::{next_action, Decision, StoreAction};
use docdesk_common::{AnalysisRecord, AnalysisStatus, DocumentId};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

/// Immutable view of all records at one instant
pub type AnalysisMap = Arc<BTreeMap<DocumentId, AnalysisRecord>>;

/// Most recently observed analysis per document
#[derive(Debug, Default)]
pub struct AnalysisStore {
    records: RwLock<AnalysisMap>,
}

impl AnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, document_id: DocumentId) -> Option<AnalysisRecord> {
        self.snapshot().get(&document_id).cloned()
    }

    /// Status of the stored record, `None` when there is no record
    pub fn status(&self, document_id: DocumentId) -> AnalysisStatus {
        self.snapshot()
            .get(&document_id)
            .map(|r| r.status)
            .unwrap_or_default()
    }

    /// Store a record under its document, returning the one it replaced
    pub fn set(&self, record: AnalysisRecord) -> Option<AnalysisRecord> {
        let mut guard = self.write();
        let mut next = (**guard).clone();
        let previous = next.insert(record.document_id, record);
        *guard = Arc::new(next);
        previous
    }

    pub fn delete(&self, document_id: DocumentId) -> Option<AnalysisRecord> {
        let mut guard = self.write();
        if !guard.contains_key(&document_id) {
            return None;
        }
        let mut next = (**guard).clone();
        let removed = next.remove(&document_id);
        *guard = Arc::new(next);
        removed
    }

    /// Drop every entry whose document fails `keep`; returns the dropped ids
    pub fn retain<F>(&self, mut keep: F) -> Vec<DocumentId>
    where
        F: FnMut(DocumentId) -> bool,
    {
        let mut guard = self.write();
        let removed: Vec<DocumentId> = guard.keys().copied().filter(|id| !keep(*id)).collect();
        if removed.is_empty() {
            return removed;
        }
        let mut next = (**guard).clone();
        for id in &removed {
            next.remove(id);
        }
        *guard = Arc::new(next);
        removed
    }

    /// Run the lifecycle rules against the stored record and apply the result
    ///
    /// Reading the previous record and writing the new one happen under one
    /// write lock, so concurrent observations for a document serialize.
    pub fn apply_observation(
        &self,
        document_id: DocumentId,
        observed: Option<AnalysisRecord>,
    ) -> Decision {
        let mut guard = self.write();
        let decision = next_action(guard.get(&document_id), observed);

        match &decision.store {
            StoreAction::Keep => {}
            StoreAction::Set(record) => {
                let mut next = (**guard).clone();
                let mut record = record.clone();
                record.document_id = document_id;
                next.insert(document_id, record);
                *guard = Arc::new(next);
            }
            StoreAction::Clear => {
                if guard.contains_key(&document_id) {
                    let mut next = (**guard).clone();
                    next.remove(&document_id);
                    *guard = Arc::new(next);
                }
            }
        }
        decision
    }

    pub fn snapshot(&self) -> AnalysisMap {
        self.records.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    fn write(&self) -> RwLockWriteGuard<'_, AnalysisMap> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }
}
