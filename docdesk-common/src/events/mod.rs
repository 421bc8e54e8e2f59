//! Event types for the docdesk notification system
//!
//! Provides the shared event definitions and the EventBus that carries
//! user-facing notifications (analysis outcomes, fetch errors) from the
//! orchestration core to whatever presentation layer is attached.

use crate::models::{AnalysisId, AnalysisStatus, DocumentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// docdesk event types
///
/// Events are broadcast via EventBus and serialize with a `type` tag so a
/// front end can forward them verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DocdeskEvent {
    /// Document list replaced by a fresh load
    DocumentsLoaded {
        /// Number of documents in the new list
        count: usize,
        /// Store entries dropped because their document disappeared
        reconciled: usize,
        timestamp: DateTime<Utc>,
    },

    /// Document list could not be fetched; previous list retained
    DocumentsLoadFailed {
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Document deleted server-side
    DocumentDeleted {
        document_id: DocumentId,
        timestamp: DateTime<Utc>,
    },

    /// Analysis requested and accepted by the server
    AnalysisStarted {
        document_id: DocumentId,
        analysis_id: Option<AnalysisId>,
        /// Status the server reported on creation
        status: AnalysisStatus,
        timestamp: DateTime<Utc>,
    },

    /// Polling observed a completed analysis
    AnalysisCompleted {
        document_id: DocumentId,
        analysis_id: Option<AnalysisId>,
        timestamp: DateTime<Utc>,
    },

    /// Polling observed a failed analysis
    AnalysisFailed {
        document_id: DocumentId,
        analysis_id: Option<AnalysisId>,
        timestamp: DateTime<Utc>,
    },

    /// Analysis removed locally (and server-side when it had an id)
    AnalysisRemoved {
        document_id: DocumentId,
        analysis_id: Option<AnalysisId>,
        timestamp: DateTime<Utc>,
    },

    /// Polling hit its lifetime ceiling; last known status is kept
    AnalysisPollTimedOut {
        document_id: DocumentId,
        last_status: AnalysisStatus,
        /// Time since polling started (milliseconds)
        elapsed_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A poll fetch failed; polling for this document stopped
    AnalysisPollFailed {
        document_id: DocumentId,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// A user-initiated gateway call failed
    RequestFailed {
        /// Operation name (start_analysis, delete_analysis, delete_document, ...)
        operation: String,
        document_id: Option<DocumentId>,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl DocdeskEvent {
    /// Event type name, matching the serialized `type` tag
    pub fn event_type(&self) -> &str {
        match self {
            DocdeskEvent::DocumentsLoaded { .. } => "DocumentsLoaded",
            DocdeskEvent::DocumentsLoadFailed { .. } => "DocumentsLoadFailed",
            DocdeskEvent::DocumentDeleted { .. } => "DocumentDeleted",
            DocdeskEvent::AnalysisStarted { .. } => "AnalysisStarted",
            DocdeskEvent::AnalysisCompleted { .. } => "AnalysisCompleted",
            DocdeskEvent::AnalysisFailed { .. } => "AnalysisFailed",
            DocdeskEvent::AnalysisRemoved { .. } => "AnalysisRemoved",
            DocdeskEvent::AnalysisPollTimedOut { .. } => "AnalysisPollTimedOut",
            DocdeskEvent::AnalysisPollFailed { .. } => "AnalysisPollFailed",
            DocdeskEvent::RequestFailed { .. } => "RequestFailed",
        }
    }

    /// Document the event concerns, if any
    pub fn document_id(&self) -> Option<DocumentId> {
        match self {
            DocdeskEvent::DocumentsLoaded { .. } | DocdeskEvent::DocumentsLoadFailed { .. } => None,
            DocdeskEvent::DocumentDeleted { document_id, .. }
            | DocdeskEvent::AnalysisStarted { document_id, .. }
            | DocdeskEvent::AnalysisCompleted { document_id, .. }
            | DocdeskEvent::AnalysisFailed { document_id, .. }
            | DocdeskEvent::AnalysisRemoved { document_id, .. }
            | DocdeskEvent::AnalysisPollTimedOut { document_id, .. }
            | DocdeskEvent::AnalysisPollFailed { document_id, .. } => Some(*document_id),
            DocdeskEvent::RequestFailed { document_id, .. } => *document_id,
        }
    }

    /// Whether the event reports a problem the user should see as an error
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            DocdeskEvent::DocumentsLoadFailed { .. }
                | DocdeskEvent::AnalysisFailed { .. }
                | DocdeskEvent::AnalysisPollFailed { .. }
                | DocdeskEvent::RequestFailed { .. }
        )
    }

    /// One-line human readable message
    pub fn message(&self) -> String {
        match self {
            DocdeskEvent::DocumentsLoaded { count, .. } => format!("Loaded {} documents", count),
            DocdeskEvent::DocumentsLoadFailed { error, .. } => {
                format!("Failed to load documents: {}", error)
            }
            DocdeskEvent::DocumentDeleted { document_id, .. } => {
                format!("Document {} deleted", document_id)
            }
            DocdeskEvent::AnalysisStarted { document_id, status, .. } => {
                format!("Analysis started for document {} ({})", document_id, status)
            }
            DocdeskEvent::AnalysisCompleted { document_id, .. } => {
                format!("Analysis completed for document {}", document_id)
            }
            DocdeskEvent::AnalysisFailed { document_id, .. } => {
                format!("Analysis failed for document {}", document_id)
            }
            DocdeskEvent::AnalysisRemoved { document_id, .. } => {
                format!("Analysis removed for document {}", document_id)
            }
            DocdeskEvent::AnalysisPollTimedOut { document_id, last_status, .. } => format!(
                "Stopped waiting for analysis of document {} (still {})",
                document_id, last_status
            ),
            DocdeskEvent::AnalysisPollFailed { document_id, error, .. } => format!(
                "Could not check analysis of document {}: {}",
                document_id, error
            ),
            DocdeskEvent::RequestFailed { operation, error, .. } => {
                format!("{} failed: {}", operation, error)
            }
        }
    }
}

/// Event distribution bus for the docdesk crates
///
/// Uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use docdesk_common::events::{DocdeskEvent, EventBus};
/// use docdesk_common::DocumentId;
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(DocdeskEvent::DocumentDeleted {
///     document_id: DocumentId(4),
///     timestamp: chrono::Utc::now(),
/// });
///
/// let received = rx.try_recv().unwrap();
/// assert_eq!(received.event_type(), "DocumentDeleted");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DocdeskEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered before the oldest are
    /// dropped for lagging subscribers. Zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<DocdeskEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: DocdeskEvent,
    ) -> Result<usize, broadcast::error::SendError<DocdeskEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the absence of subscribers
    ///
    /// Notifications are advisory; the orchestration core never depends on
    /// anyone receiving them.
    pub fn emit_lossy(&self, event: DocdeskEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
