//! # docdesk-admin
//!
//! Administrative client for the document/e-signature REST API.
//!
//! The interesting part is the analysis orchestration: every document in a
//! collection carries an independently fetched analysis record, in-flight
//! analyses are polled in the background until they settle, and the
//! in-memory view stays consistent while analyses are started, removed, or
//! the document list is reloaded underneath them.
//!
//! Layers, leaf first:
//! - [`gateway`]: REST contracts and the reqwest implementation
//! - [`analysis`]: lifecycle rules, record store, poll supervisor
//! - [`view`]: the document collection joined with its analyses
//! - [`confirm`]: yes/no prompt injected before destructive operations

pub mod analysis;
pub mod confirm;
pub mod error;
pub mod gateway;
pub mod view;

pub use analysis::{AnalysisStore, PollExit, PollHandle, PollSettings, PollSupervisor};
pub use confirm::{AutoConfirm, ConfirmationPort, ConfirmationRequest};
pub use error::{RequestError, ViewError, ViewResult};
pub use gateway::{AnalysisGateway, ApiClient, DocumentGateway};
pub use view::{CollectionSnapshot, DocumentCollectionView, RemovalOutcome, ViewOptions};
