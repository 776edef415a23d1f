//! Questionnaire publish pipeline.
//!
//! [`PublishManager`] orchestrates the publish/unpublish transitions of a
//! questionnaire: it validates branching, numbers versions, stores immutable
//! snapshots with their change logs, and rolls back on unpublish.
//!
//! - [`store`]: collaborator traits for graph loading and snapshot storage.
//! - [`memory`]: in-process store, used by tests and embedded callers.
//! - [`postgres`]: store backed by `qpub_db` repositories.
//! - [`locks`]: per-questionnaire critical sections.
//! - [`config`]: environment-driven settings.

pub mod config;
pub mod error;
pub mod locks;
pub mod manager;
pub mod memory;
pub mod postgres;
pub mod store;

pub use config::PipelineConfig;
pub use error::{PublishError, StoreError};
pub use manager::{PublishManager, UnpublishOutcome};
pub use memory::InMemoryStore;
pub use postgres::PgStore;
pub use store::{GraphSource, SnapshotStore};
