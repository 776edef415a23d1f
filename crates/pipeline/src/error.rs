use qpub_core::branching::BranchingReport;
use qpub_core::error::CoreError;
use qpub_core::types::DbId;

/// Failure reported by a persistence collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Questionnaire {0} not found")]
    NotFound(DbId),

    /// Another writer changed the questionnaire's version first.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Stored data could not be turned into domain values.
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Error returned to callers of the lifecycle manager.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Branching validation failed; nothing was written.
    #[error("Publish rejected: branching is {}", .0.verdict)]
    Rejected(BranchingReport),

    #[error("Questionnaire {0} not found")]
    NotFound(DbId),

    /// Concurrent transition on the same questionnaire. Safe to retry.
    #[error("Version conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl PublishError {
    /// Whether the caller may simply try the same request again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<StoreError> for PublishError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::Core(core) => Self::Core(core),
            StoreError::Database(db) => Self::Database(db),
        }
    }
}
