//! Repository for the `questionnaire_snapshots` table.
//!
//! Snapshots are immutable: there is no update method, and the table rejects
//! `UPDATE` statements outright.

use sqlx::PgPool;
use qpub_core::snapshot::Snapshot;
use qpub_core::types::DbId;

use crate::models::snapshot::{QuestionnaireSnapshot, SnapshotText};

/// Column list for questionnaire_snapshots queries.
const COLUMNS: &str = "id, questionnaire_id, version, tree, change_log, created_at";

/// Provides create, read and delete operations for snapshots.
pub struct SnapshotRepo;

impl SnapshotRepo {
    /// Insert a snapshot. Fails with a unique violation
    /// (`uq_questionnaire_snapshots_version`) if the version already exists.
    pub async fn create(
        pool: &PgPool,
        snapshot: &Snapshot,
    ) -> Result<QuestionnaireSnapshot, sqlx::Error> {
        let text = SnapshotText::encode(snapshot)?;
        let query = format!(
            "INSERT INTO questionnaire_snapshots
                (questionnaire_id, version, tree, change_log, created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, QuestionnaireSnapshot>(&query)
            .bind(snapshot.questionnaire_id)
            .bind(snapshot.version)
            .bind(&text.tree)
            .bind(&text.change_log)
            .bind(snapshot.created_at)
            .fetch_one(pool)
            .await
    }

    /// Find the snapshot of a specific version.
    pub async fn find_by_version(
        pool: &PgPool,
        questionnaire_id: DbId,
        version: i32,
    ) -> Result<Option<QuestionnaireSnapshot>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM questionnaire_snapshots
             WHERE questionnaire_id = $1 AND version = $2"
        );
        sqlx::query_as::<_, QuestionnaireSnapshot>(&query)
            .bind(questionnaire_id)
            .bind(version)
            .fetch_optional(pool)
            .await
    }

    /// List all snapshots of a questionnaire, newest first.
    pub async fn list_by_questionnaire(
        pool: &PgPool,
        questionnaire_id: DbId,
    ) -> Result<Vec<QuestionnaireSnapshot>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM questionnaire_snapshots
             WHERE questionnaire_id = $1
             ORDER BY version DESC"
        );
        sqlx::query_as::<_, QuestionnaireSnapshot>(&query)
            .bind(questionnaire_id)
            .fetch_all(pool)
            .await
    }

    /// Permanently delete one version. Returns `true` if a row was removed.
    pub async fn delete_by_version(
        pool: &PgPool,
        questionnaire_id: DbId,
        version: i32,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM questionnaire_snapshots WHERE questionnaire_id = $1 AND version = $2",
        )
        .bind(questionnaire_id)
        .bind(version)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
