//! Analysis state for one document
//!
//! Status progression: NONE → PENDING → PROCESSING → COMPLETED | FAILED
//!
//! `None` never comes from the server; it is the local answer for
//! "no analysis exists for this document".

use super::{AnalysisId, DocumentId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Analysis workflow status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    /// No analysis record exists
    #[default]
    None,
    /// Queued on the server
    Pending,
    /// Being computed
    Processing,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
}

impl AnalysisStatus {
    /// Completed or failed; no further transitions or polling
    pub fn is_terminal(self) -> bool {
        matches!(self, AnalysisStatus::Completed | AnalysisStatus::Failed)
    }

    /// Pending or processing; the record still needs polling
    pub fn is_in_flight(self) -> bool {
        matches!(self, AnalysisStatus::Pending | AnalysisStatus::Processing)
    }

    fn rank(self) -> u8 {
        match self {
            AnalysisStatus::None => 0,
            AnalysisStatus::Pending => 1,
            AnalysisStatus::Processing => 2,
            AnalysisStatus::Completed | AnalysisStatus::Failed => 3,
        }
    }

    /// Whether a record in this status may move to `next`
    ///
    /// Staying in place is allowed (a poll may observe the same status twice);
    /// moving backwards or leaving a terminal status is not.
    pub fn can_advance_to(self, next: AnalysisStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.rank() >= self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisStatus::None => "none",
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Processing => "processing",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Most recently observed state of a document's analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// Server identifier; absent while the record is only known locally
    pub analysis_id: Option<AnalysisId>,
    /// Owning document
    pub document_id: DocumentId,
    pub status: AnalysisStatus,
    pub summary: Option<String>,
    pub insights: Vec<String>,
    pub missing_topics: Vec<String>,
}

impl AnalysisRecord {
    /// Optimistic local record for an analysis that was just requested
    pub fn pending(document_id: DocumentId) -> Self {
        Self {
            analysis_id: None,
            document_id,
            status: AnalysisStatus::Pending,
            summary: None,
            insights: Vec::new(),
            missing_topics: Vec::new(),
        }
    }

    /// Whether both values describe the same analysis run
    ///
    /// Identity is the analysis id once both sides have one; before that the
    /// owning document stands in for it.
    pub fn same_analysis(&self, other: &AnalysisRecord) -> bool {
        match (self.analysis_id, other.analysis_id) {
            (Some(a), Some(b)) => a == b,
            _ => self.document_id == other.document_id,
        }
    }

    /// Display-oriented digest of the record
    pub fn summary_view(&self) -> AnalysisSummary {
        AnalysisSummary {
            document_id: self.document_id,
            status: self.status,
            summary: self
                .summary
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(AnalysisSummary::NOT_AVAILABLE)
                .to_string(),
            insight_count: self.insights.len(),
            missing_topic_count: self.missing_topics.len(),
        }
    }
}

/// What a presentation layer shows when an analysis is opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub document_id: DocumentId,
    pub status: AnalysisStatus,
    pub summary: String,
    pub insight_count: usize,
    pub missing_topic_count: usize,
}

impl AnalysisSummary {
    pub const NOT_AVAILABLE: &'static str = "Not available";
}

impl fmt::Display for AnalysisSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Status: {}", self.status)?;
        writeln!(f)?;
        writeln!(f, "Summary:")?;
        writeln!(f, "{}", self.summary)?;
        writeln!(f)?;
        writeln!(f, "Insights found: {}", self.insight_count)?;
        write!(f, "Missing topics: {}", self.missing_topic_count)
    }
}
