//! Pure publish-pipeline logic for questionnaires.
//!
//! Nothing in this crate touches the database or the runtime; it is shared
//! by the persistence layer and the lifecycle manager.
//!
//! - [`graph`]: read-only question/answer graph of one questionnaire.
//! - [`branching`]: branching health validation (cycles, dead ends).
//! - [`diff`]: path-addressed structural diff of snapshot trees.
//! - [`snapshot`]: deterministic snapshot serialization.
//! - [`lifecycle`]: publish state and version numbering rules.

pub mod branching;
pub mod diff;
pub mod error;
pub mod graph;
pub mod lifecycle;
pub mod snapshot;
pub mod types;
