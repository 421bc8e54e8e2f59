//! Background polling of in-flight analyses
//!
//! At most one polling task runs per document. A task fetches the document's
//! analysis once per interval, feeds each result through the lifecycle rules,
//! and ends when the analysis settles, the server reports no analysis, a
//! fetch fails, the lifetime ceiling passes, or it is cancelled.
//!
//! Every fetch result is applied under the handle lock after checking that
//! the task is still the registered one, so a result that lands after
//! `cancel` returns is dropped.

use super::lifecycle::{Decision, StoreAction, TerminalOutcome};
use super::store::AnalysisStore;
use crate::error::RequestError;
use crate::gateway::AnalysisGateway;
use chrono::Utc;
use docdesk_common::config::PollingConfig;
use docdesk_common::events::{DocdeskEvent, EventBus};
use docdesk_common::{AnalysisRecord, AnalysisStatus, DocumentId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Poll timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Delay before each fetch, including the first
    pub interval: Duration,
    /// Lifetime ceiling measured from the handle's start
    pub max_duration: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_duration: Duration::from_secs(300),
        }
    }
}

impl PollSettings {
    pub fn from_config(config: &PollingConfig) -> Self {
        Self {
            interval: config.interval(),
            max_duration: config.max_duration(),
        }
    }
}

/// Why a polling task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollExit {
    Completed,
    Failed,
    /// Server reported no analysis; the store entry was cleared
    NotFound,
    /// Lifetime ceiling reached; the last applied record stays in the store
    TimedOut { last_status: AnalysisStatus },
    /// A fetch failed; no retry
    FetchFailed(RequestError),
    Cancelled,
}

/// Handle to one polling task
#[derive(Clone)]
pub struct PollHandle {
    document_id: DocumentId,
    started_at: Instant,
    generation: u64,
    cancel_token: CancellationToken,
    finished: CancellationToken,
    exit: Arc<OnceLock<PollExit>>,
    supervisor: Weak<Inner>,
}

impl PollHandle {
    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Distinguishes successive polling tasks for the same document
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Stop the task; idempotent
    ///
    /// Once this returns, no further fetch result from the task reaches the
    /// store.
    pub fn cancel(&self) {
        match self.supervisor.upgrade() {
            Some(inner) => {
                inner.cancel_generation(self.document_id, self.generation);
            }
            None => self.cancel_token.cancel(),
        }
    }

    pub fn is_live(&self) -> bool {
        !self.cancel_token.is_cancelled() && !self.finished.is_cancelled()
    }

    /// Resolves once the task has fully stopped
    pub async fn finished(&self) {
        self.finished.cancelled().await
    }

    /// Exit reason, available after [`finished`](Self::finished) resolves
    pub fn exit_reason(&self) -> Option<PollExit> {
        self.exit.get().cloned()
    }
}

impl PartialEq for PollHandle {
    fn eq(&self, other: &Self) -> bool {
        self.document_id == other.document_id && self.generation == other.generation
    }
}

impl Eq for PollHandle {}

impl fmt::Debug for PollHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollHandle")
            .field("document_id", &self.document_id)
            .field("generation", &self.generation)
            .field("started_at", &self.started_at)
            .field("live", &self.is_live())
            .finish()
    }
}

struct Inner {
    gateway: Arc<dyn AnalysisGateway>,
    store: Arc<AnalysisStore>,
    events: EventBus,
    settings: PollSettings,
    handles: Mutex<HashMap<DocumentId, PollHandle>>,
    next_generation: AtomicU64,
}

impl Inner {
    fn handles(&self) -> MutexGuard<'_, HashMap<DocumentId, PollHandle>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_registered(handles: &HashMap<DocumentId, PollHandle>, handle: &PollHandle) -> bool {
        !handle.cancel_token.is_cancelled()
            && handles
                .get(&handle.document_id)
                .is_some_and(|current| current.generation == handle.generation)
    }

    fn cancel_generation(&self, document_id: DocumentId, generation: u64) -> bool {
        let mut handles = self.handles();
        let matches = handles
            .get(&document_id)
            .is_some_and(|h| h.generation == generation);
        if matches {
            if let Some(handle) = handles.remove(&document_id) {
                handle.cancel_token.cancel();
                debug!(document_id = %document_id, generation, "Polling cancelled");
                return true;
            }
        }
        false
    }

    fn cancel_all(&self) -> usize {
        let drained: Vec<PollHandle> = self.handles().drain().map(|(_, h)| h).collect();
        for handle in &drained {
            handle.cancel_token.cancel();
        }
        if !drained.is_empty() {
            debug!(count = drained.len(), "Cancelled all polling");
        }
        drained.len()
    }

    /// Apply a fetch result if the task is still the registered one
    fn apply(&self, handle: &PollHandle, observed: Option<AnalysisRecord>) -> Option<Decision> {
        let handles = self.handles();
        if !Self::is_registered(&handles, handle) {
            return None;
        }
        Some(self.store.apply_observation(handle.document_id, observed))
    }

    /// Deregister the task; true if it was still registered
    fn retire(&self, handle: &PollHandle) -> bool {
        let mut handles = self.handles();
        let current = Self::is_registered(&handles, handle);
        if handles
            .get(&handle.document_id)
            .is_some_and(|h| h.generation == handle.generation)
        {
            handles.remove(&handle.document_id);
        }
        current
    }

    fn timed_out(&self, document_id: DocumentId) -> PollExit {
        PollExit::TimedOut {
            last_status: self.store.status(document_id),
        }
    }

    async fn poll_loop(&self, handle: &PollHandle) -> PollExit {
        let document_id = handle.document_id;
        let deadline = handle.started_at + self.settings.max_duration;

        loop {
            tokio::select! {
                biased;
                _ = handle.cancel_token.cancelled() => return PollExit::Cancelled,
                _ = sleep_until(deadline) => return self.timed_out(document_id),
                _ = sleep(self.settings.interval) => {}
            }

            let fetched = tokio::select! {
                biased;
                _ = handle.cancel_token.cancelled() => return PollExit::Cancelled,
                _ = sleep_until(deadline) => return self.timed_out(document_id),
                result = self.gateway.fetch(document_id) => result,
            };

            let observed = match fetched {
                Ok(observed) => observed,
                Err(e) => return PollExit::FetchFailed(e),
            };

            let Some(decision) = self.apply(handle, observed) else {
                return PollExit::Cancelled;
            };

            if let (Some(outcome), StoreAction::Set(record)) = (decision.terminal, &decision.store) {
                self.emit_terminal(outcome, record);
            }

            if decision.stop {
                return match (&decision.store, decision.terminal) {
                    (StoreAction::Clear, _) => PollExit::NotFound,
                    (_, Some(TerminalOutcome::Failed)) => PollExit::Failed,
                    (_, Some(TerminalOutcome::Completed)) => PollExit::Completed,
                    _ if self.store.status(document_id) == AnalysisStatus::Failed => PollExit::Failed,
                    _ => PollExit::Completed,
                };
            }
        }
    }

    fn emit_terminal(&self, outcome: TerminalOutcome, record: &AnalysisRecord) {
        let document_id = record.document_id;
        let analysis_id = record.analysis_id;
        let timestamp = Utc::now();
        let event = match outcome {
            TerminalOutcome::Completed => {
                info!(document_id = %document_id, analysis_id = ?analysis_id, "Analysis completed");
                DocdeskEvent::AnalysisCompleted {
                    document_id,
                    analysis_id,
                    timestamp,
                }
            }
            TerminalOutcome::Failed => {
                warn!(document_id = %document_id, analysis_id = ?analysis_id, "Analysis failed");
                DocdeskEvent::AnalysisFailed {
                    document_id,
                    analysis_id,
                    timestamp,
                }
            }
        };
        self.events.emit_lossy(event);
    }

    async fn run(self: Arc<Self>, handle: PollHandle) {
        let document_id = handle.document_id;
        debug!(document_id = %document_id, generation = handle.generation, "Polling started");

        let exit = self.poll_loop(&handle).await;
        let was_current = self.retire(&handle);

        if was_current {
            match &exit {
                PollExit::TimedOut { last_status } => {
                    let elapsed_ms = handle.elapsed().as_millis() as u64;
                    warn!(
                        document_id = %document_id,
                        status = %last_status,
                        elapsed_ms,
                        "Polling timed out"
                    );
                    self.events.emit_lossy(DocdeskEvent::AnalysisPollTimedOut {
                        document_id,
                        last_status: *last_status,
                        elapsed_ms,
                        timestamp: Utc::now(),
                    });
                }
                PollExit::FetchFailed(e) => {
                    warn!(document_id = %document_id, error = %e, "Analysis poll failed");
                    self.events.emit_lossy(DocdeskEvent::AnalysisPollFailed {
                        document_id,
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    });
                }
                _ => {}
            }
        }

        debug!(document_id = %document_id, exit = ?exit, "Polling finished");
        let _ = handle.exit.set(exit);
        handle.finished.cancel();
    }
}

/// Owns every polling task; dropping it cancels them all
pub struct PollSupervisor {
    inner: Arc<Inner>,
}

impl PollSupervisor {
    pub fn new(
        gateway: Arc<dyn AnalysisGateway>,
        store: Arc<AnalysisStore>,
        events: EventBus,
        settings: PollSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                gateway,
                store,
                events,
                settings,
                handles: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    pub fn settings(&self) -> PollSettings {
        self.inner.settings
    }

    /// Start polling a document, or return the task already doing so
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_polling(&self, document_id: DocumentId) -> PollHandle {
        let mut handles = self.inner.handles();
        if let Some(existing) = handles.get(&document_id) {
            if existing.is_live() {
                return existing.clone();
            }
        }

        let handle = PollHandle {
            document_id,
            started_at: Instant::now(),
            generation: self.inner.next_generation.fetch_add(1, Ordering::Relaxed),
            cancel_token: CancellationToken::new(),
            finished: CancellationToken::new(),
            exit: Arc::new(OnceLock::new()),
            supervisor: Arc::downgrade(&self.inner),
        };
        handles.insert(document_id, handle.clone());
        drop(handles);

        tokio::spawn(Arc::clone(&self.inner).run(handle.clone()));
        handle
    }

    /// Stop polling a document; false if it was not being polled
    pub fn cancel(&self, document_id: DocumentId) -> bool {
        let removed = self.inner.handles().remove(&document_id);
        match removed {
            Some(handle) => {
                handle.cancel_token.cancel();
                debug!(document_id = %document_id, "Polling cancelled");
                true
            }
            None => false,
        }
    }

    /// Stop every task; returns how many were running
    pub fn cancel_all(&self) -> usize {
        self.inner.cancel_all()
    }

    /// Cancel polling for every document failing `keep`; returns those documents
    pub fn retain<F>(&self, mut keep: F) -> Vec<DocumentId>
    where
        F: FnMut(DocumentId) -> bool,
    {
        let mut handles = self.inner.handles();
        let dropped: Vec<DocumentId> = handles.keys().copied().filter(|id| !keep(*id)).collect();
        for id in &dropped {
            if let Some(handle) = handles.remove(id) {
                handle.cancel_token.cancel();
            }
        }
        dropped
    }

    pub fn is_polling(&self, document_id: DocumentId) -> bool {
        self.inner
            .handles()
            .get(&document_id)
            .is_some_and(PollHandle::is_live)
    }

    pub fn handle(&self, document_id: DocumentId) -> Option<PollHandle> {
        self.inner.handles().get(&document_id).cloned()
    }

    pub fn live_count(&self) -> usize {
        self.inner.handles().values().filter(|h| h.is_live()).count()
    }
}

impl Drop for PollSupervisor {
    fn drop(&mut self) {
        self.inner.cancel_all();
    }
}
