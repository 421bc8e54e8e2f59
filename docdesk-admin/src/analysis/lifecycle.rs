//! Analysis lifecycle rules
//!
//! Pure decision over none → pending → processing → completed | failed.
//! Given the record currently stored for a document and what the server just
//! reported, [`next_action`] says what to store and whether to keep polling.

use docdesk_common::{AnalysisRecord, AnalysisStatus};

/// What to do with the store entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreAction {
    /// Leave the current entry untouched
    Keep,
    /// Replace (or create) the entry
    Set(AnalysisRecord),
    /// Remove the entry; the document's status becomes `none`
    Clear,
}

/// How an analysis settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalOutcome {
    Completed,
    Failed,
}

impl TerminalOutcome {
    fn from_status(status: AnalysisStatus) -> Option<Self> {
        match status {
            AnalysisStatus::Completed => Some(TerminalOutcome::Completed),
            AnalysisStatus::Failed => Some(TerminalOutcome::Failed),
            _ => None,
        }
    }
}

/// Outcome of one observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub store: StoreAction,
    /// Fetch again after one interval
    pub schedule_next_poll: bool,
    /// Polling for this document is over
    pub stop: bool,
    /// Set only when this observation is what made the record terminal
    pub terminal: Option<TerminalOutcome>,
}

impl Decision {
    fn keep(schedule_next_poll: bool) -> Self {
        Self {
            store: StoreAction::Keep,
            schedule_next_poll,
            stop: !schedule_next_poll,
            terminal: None,
        }
    }

    fn clear() -> Self {
        Self {
            store: StoreAction::Clear,
            schedule_next_poll: false,
            stop: true,
            terminal: None,
        }
    }

    fn set(record: AnalysisRecord) -> Self {
        let terminal = TerminalOutcome::from_status(record.status);
        let in_flight = record.status.is_in_flight();
        Self {
            store: StoreAction::Set(record),
            schedule_next_poll: in_flight,
            stop: !in_flight,
            terminal,
        }
    }
}

/// Decide what an observation means for the stored record
///
/// `observed == None` means the server has no analysis for the document.
pub fn next_action(previous: Option<&AnalysisRecord>, observed: Option<AnalysisRecord>) -> Decision {
    let observed = match observed {
        Some(record) if record.status != AnalysisStatus::None => record,
        _ => return Decision::clear(),
    };

    if let Some(previous) = previous {
        if previous.same_analysis(&observed) {
            if previous.status.is_terminal() {
                return Decision::keep(false);
            }
            // stale read: the server lags behind what was already applied
            if !previous.status.can_advance_to(observed.status) {
                return Decision::keep(true);
            }
        }
    }

    Decision::set(observed)
}
