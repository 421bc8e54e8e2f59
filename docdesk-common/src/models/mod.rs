//! Domain models shared by the docdesk crates
//!
//! Identifiers are thin newtypes over the numeric keys the REST API hands out,
//! so a document id can never be passed where an analysis id is expected.

mod analysis;
mod document;

pub use analysis::{AnalysisRecord, AnalysisStatus, AnalysisSummary};
pub use document::{Company, Document, ExtraDoc, Signer};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = crate::Error;

            fn from_str(s: &str) -> crate::Result<Self> {
                s.trim().parse::<u64>().map($name).map_err(|e| {
                    crate::Error::InvalidInput(format!(
                        "{} must be a positive integer, got {:?}: {}",
                        stringify!($name),
                        s,
                        e
                    ))
                })
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                $name(value)
            }
        }
    };
}

numeric_id!(
    /// Stable identifier of a document; key for all per-document state
    DocumentId
);

numeric_id!(
    /// Server-assigned identifier of one analysis run
    AnalysisId
);

numeric_id!(
    /// Identifier of the company that owns a document
    CompanyId
);
