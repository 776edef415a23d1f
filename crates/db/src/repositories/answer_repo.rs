//! Repository for the `answers` table.

use sqlx::PgPool;
use qpub_core::types::DbId;

use crate::models::answer::Answer;

/// Column list for answers queries, qualified for joins.
const COLUMNS: &str = "a.id, a.question_id, a.content, a.sort_order, a.destination_type, \
    a.destination_question_id, a.destination_url, a.destination_content_id, a.priority, \
    a.deleted_at, a.created_at, a.updated_at";

/// Provides graph-loading reads on answers.
pub struct AnswerRepo;

impl AnswerRepo {
    /// List live answers of live questions in a questionnaire, grouped by
    /// question and in authoring order within each question.
    pub async fn list_live_by_questionnaire(
        pool: &PgPool,
        questionnaire_id: DbId,
    ) -> Result<Vec<Answer>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM answers a
             JOIN questions q ON q.id = a.question_id
             WHERE q.questionnaire_id = $1
               AND q.deleted_at IS NULL
               AND a.deleted_at IS NULL
             ORDER BY a.question_id, a.sort_order, a.id"
        );
        sqlx::query_as::<_, Answer>(&query)
            .bind(questionnaire_id)
            .fetch_all(pool)
            .await
    }
}
