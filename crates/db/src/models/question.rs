//! Question entity model.

use qpub_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `questions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Question {
    pub id: DbId,
    pub questionnaire_id: DbId,
    /// 1-based ordinal among the questionnaire's live questions.
    pub sort_order: i32,
    pub content: String,
    pub deleted_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
