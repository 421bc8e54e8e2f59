//! Analysis orchestration: lifecycle rules, record store, poll supervisor

pub mod lifecycle;
pub mod store;
pub mod supervisor;

pub use lifecycle::{next_action, Decision, StoreAction, TerminalOutcome};
pub use store::{AnalysisMap, AnalysisStore};
pub use supervisor::{PollExit, PollHandle, PollSettings, PollSupervisor};
