//! Row structs for the authoring and snapshot tables.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row, plus the conversion into the `qpub_core` type the
//! publish pipeline works on.

pub mod answer;
pub mod question;
pub mod questionnaire;
pub mod snapshot;
