//! Repository for the `questions` table.

use sqlx::PgPool;
use qpub_core::types::DbId;

use crate::models::question::Question;

/// Column list for questions queries.
const COLUMNS: &str =
    "id, questionnaire_id, sort_order, content, deleted_at, created_at, updated_at";

/// Provides graph-loading reads on questions.
pub struct QuestionRepo;

impl QuestionRepo {
    /// List live questions of a questionnaire ordered by ordinal.
    pub async fn list_live_by_questionnaire(
        pool: &PgPool,
        questionnaire_id: DbId,
    ) -> Result<Vec<Question>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM questions
             WHERE questionnaire_id = $1 AND deleted_at IS NULL
             ORDER BY sort_order, id"
        );
        sqlx::query_as::<_, Question>(&query)
            .bind(questionnaire_id)
            .fetch_all(pool)
            .await
    }
}
