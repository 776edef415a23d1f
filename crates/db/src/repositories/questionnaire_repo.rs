//! Repository for the `questionnaires` table.

use sqlx::PgPool;
use qpub_core::lifecycle::PublishState;
use qpub_core::types::DbId;

use crate::models::questionnaire::Questionnaire;

/// Column list for questionnaires queries.
const COLUMNS: &str = "id, title, description, state, version, deleted_at, created_at, updated_at";

/// Provides publish-related reads and writes on questionnaires.
pub struct QuestionnaireRepo;

impl QuestionnaireRepo {
    /// Find a questionnaire by ID. Excludes soft-deleted rows.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Questionnaire>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM questionnaires WHERE id = $1 AND deleted_at IS NULL"
        );
        sqlx::query_as::<_, Questionnaire>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Current version counter (`None` if the questionnaire does not exist).
    pub async fn get_version(pool: &PgPool, id: DbId) -> Result<Option<i32>, sqlx::Error> {
        let row: Option<(i32,)> = sqlx::query_as(
            "SELECT version FROM questionnaires WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(row.map(|(v,)| v))
    }

    /// Overwrite the version counter. Returns `true` if a row was updated.
    pub async fn set_version(pool: &PgPool, id: DbId, version: i32) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE questionnaires SET version = $2, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(version)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Overwrite the publish state. Returns `true` if a row was updated.
    pub async fn set_state(
        pool: &PgPool,
        id: DbId,
        state: PublishState,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE questionnaires SET state = $2, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(state.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
