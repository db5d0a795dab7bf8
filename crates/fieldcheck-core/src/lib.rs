//! Fieldcheck core: offline-first local store, outbox, and synchronization engine.

pub mod canonical;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod media;
pub mod models;
pub mod store;
pub mod sync;

pub use error::{Error, Result};
pub use models::{Submission, SubmissionId, Template, TemplateId};
pub use store::LocalStore;
pub use sync::SyncService;
