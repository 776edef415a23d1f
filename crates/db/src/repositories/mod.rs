//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod answer_repo;
pub mod publication_repo;
pub mod question_repo;
pub mod questionnaire_repo;
pub mod snapshot_repo;

pub use answer_repo::AnswerRepo;
pub use publication_repo::{CommitOutcome, PublicationRepo};
pub use question_repo::QuestionRepo;
pub use questionnaire_repo::QuestionnaireRepo;
pub use snapshot_repo::SnapshotRepo;
