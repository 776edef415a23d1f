//! Transactional publish/unpublish commits.
//!
//! Both operations hold `SELECT ... FOR UPDATE` on the questionnaire row for
//! the whole transaction, so two transitions on the same questionnaire are
//! serialized and the version counter is never double-incremented.

use sqlx::PgPool;
use qpub_core::snapshot::Snapshot;
use qpub_core::types::DbId;

use crate::models::snapshot::SnapshotText;

/// Result of a commit attempt that reached the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// The stored counter no longer matches what the caller planned against.
    VersionMoved { found: i32 },
    /// The questionnaire does not exist or is soft-deleted.
    NotFound,
}

/// Provides the atomic state transitions of the publish lifecycle.
pub struct PublicationRepo;

impl PublicationRepo {
    /// Insert `snapshot` and advance the questionnaire to its version, marking
    /// it published, provided the counter still equals `expected_version`.
    pub async fn commit_publish(
        pool: &PgPool,
        snapshot: &Snapshot,
        expected_version: i32,
    ) -> Result<CommitOutcome, sqlx::Error> {
        let text = SnapshotText::encode(snapshot)?;
        let mut tx = pool.begin().await?;

        let Some(current) = lock_version(&mut tx, snapshot.questionnaire_id).await? else {
            return Ok(CommitOutcome::NotFound);
        };
        if current != expected_version {
            return Ok(CommitOutcome::VersionMoved { found: current });
        }

        sqlx::query(
            "INSERT INTO questionnaire_snapshots
                (questionnaire_id, version, tree, change_log, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(snapshot.questionnaire_id)
        .bind(snapshot.version)
        .bind(&text.tree)
        .bind(&text.change_log)
        .bind(snapshot.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE questionnaires SET version = $2, state = 'published', updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(snapshot.questionnaire_id)
        .bind(snapshot.version)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(CommitOutcome::Committed)
    }

    /// Delete the snapshot at `discard_version`, step the counter back to
    /// `discard_version - 1` and mark the questionnaire draft, provided the
    /// counter still equals `discard_version`.
    pub async fn commit_unpublish(
        pool: &PgPool,
        questionnaire_id: DbId,
        discard_version: i32,
    ) -> Result<CommitOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let Some(current) = lock_version(&mut tx, questionnaire_id).await? else {
            return Ok(CommitOutcome::NotFound);
        };
        if current != discard_version {
            return Ok(CommitOutcome::VersionMoved { found: current });
        }

        sqlx::query(
            "DELETE FROM questionnaire_snapshots WHERE questionnaire_id = $1 AND version = $2",
        )
        .bind(questionnaire_id)
        .bind(discard_version)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE questionnaires SET version = $2, state = 'draft', updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(questionnaire_id)
        .bind(discard_version - 1)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(CommitOutcome::Committed)
    }
}

/// Lock the questionnaire row and read its version counter.
async fn lock_version(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    questionnaire_id: DbId,
) -> Result<Option<i32>, sqlx::Error> {
    let row: Option<(i32,)> = sqlx::query_as(
        "SELECT version FROM questionnaires \
         WHERE id = $1 AND deleted_at IS NULL \
         FOR UPDATE",
    )
    .bind(questionnaire_id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row.map(|(v,)| v))
}
