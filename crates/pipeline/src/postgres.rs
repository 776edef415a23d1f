//! PostgreSQL-backed collaborator built on the `qpub_db` repositories.

use std::collections::HashMap;

use async_trait::async_trait;
use qpub_core::graph::{self, QuestionnaireGraph};
use qpub_core::lifecycle::PublishState;
use qpub_core::snapshot::Snapshot;
use qpub_core::types::{DbId, Version};
use qpub_db::repositories::{
    AnswerRepo, CommitOutcome, PublicationRepo, QuestionRepo, QuestionnaireRepo, SnapshotRepo,
};
use qpub_db::DbPool;

use crate::error::StoreError;
use crate::store::{version_moved, GraphSource, SnapshotStore, StoreResult};

/// Unique constraint guarding one snapshot per version.
const SNAPSHOT_VERSION_CONSTRAINT: &str = "uq_questionnaire_snapshots_version";

/// Store reading and writing the questionnaire tables.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Connect, apply pending migrations and verify the database answers.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = qpub_db::create_pool(database_url).await?;
        qpub_db::run_migrations(&pool)
            .await
            .map_err(|err| StoreError::Database(err.into()))?;
        qpub_db::health_check(&pool).await?;
        tracing::info!("Publish store connected");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

/// Map a duplicate snapshot version to a conflict; keep everything else.
fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        // PostgreSQL unique constraint violation: error code 23505
        if db_err.code().as_deref() == Some("23505")
            && db_err.constraint() == Some(SNAPSHOT_VERSION_CONSTRAINT)
        {
            return StoreError::Conflict(format!(
                "Snapshot version already exists: {}",
                db_err.message()
            ));
        }
    }
    StoreError::Database(err)
}

fn expect_found(updated: bool, questionnaire_id: DbId) -> StoreResult<()> {
    if updated {
        Ok(())
    } else {
        Err(StoreError::NotFound(questionnaire_id))
    }
}

#[async_trait]
impl GraphSource for PgStore {
    async fn load_graph(&self, questionnaire_id: DbId) -> StoreResult<QuestionnaireGraph> {
        let questionnaire = QuestionnaireRepo::find_by_id(&self.pool, questionnaire_id)
            .await?
            .ok_or(StoreError::NotFound(questionnaire_id))?;
        let question_rows = QuestionRepo::list_live_by_questionnaire(&self.pool, questionnaire_id).await?;
        let answer_rows = AnswerRepo::list_live_by_questionnaire(&self.pool, questionnaire_id).await?;

        let mut answers: HashMap<DbId, Vec<graph::Answer>> = HashMap::new();
        for row in &answer_rows {
            answers.entry(row.question_id).or_default().push(row.to_graph()?);
        }

        let questions = question_rows
            .into_iter()
            .map(|row| graph::Question {
                id: row.id,
                order: row.sort_order,
                content: row.content,
                answers: answers.remove(&row.id).unwrap_or_default(),
            })
            .collect();

        tracing::debug!(
            questionnaire_id,
            answers = answer_rows.len(),
            "Loaded questionnaire graph"
        );
        Ok(QuestionnaireGraph::new(questionnaire.info(), questions)?)
    }
}

#[async_trait]
impl SnapshotStore for PgStore {
    async fn get_version(&self, questionnaire_id: DbId) -> StoreResult<Version> {
        QuestionnaireRepo::get_version(&self.pool, questionnaire_id)
            .await?
            .ok_or(StoreError::NotFound(questionnaire_id))
    }

    async fn set_version(&self, questionnaire_id: DbId, version: Version) -> StoreResult<()> {
        let updated = QuestionnaireRepo::set_version(&self.pool, questionnaire_id, version).await?;
        expect_found(updated, questionnaire_id)
    }

    async fn get_state(&self, questionnaire_id: DbId) -> StoreResult<PublishState> {
        let questionnaire = QuestionnaireRepo::find_by_id(&self.pool, questionnaire_id)
            .await?
            .ok_or(StoreError::NotFound(questionnaire_id))?;
        Ok(questionnaire.publish_state()?)
    }

    async fn set_state(&self, questionnaire_id: DbId, state: PublishState) -> StoreResult<()> {
        let updated = QuestionnaireRepo::set_state(&self.pool, questionnaire_id, state).await?;
        expect_found(updated, questionnaire_id)
    }

    async fn save_snapshot(&self, snapshot: &Snapshot) -> StoreResult<()> {
        SnapshotRepo::create(&self.pool, snapshot)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn load_snapshot(
        &self,
        questionnaire_id: DbId,
        version: Version,
    ) -> StoreResult<Option<Snapshot>> {
        match SnapshotRepo::find_by_version(&self.pool, questionnaire_id, version).await? {
            Some(row) => Ok(Some(row.into_snapshot()?)),
            None => Ok(None),
        }
    }

    async fn delete_snapshot(&self, questionnaire_id: DbId, version: Version) -> StoreResult<bool> {
        Ok(SnapshotRepo::delete_by_version(&self.pool, questionnaire_id, version).await?)
    }

    async fn list_snapshots(&self, questionnaire_id: DbId) -> StoreResult<Vec<Snapshot>> {
        SnapshotRepo::list_by_questionnaire(&self.pool, questionnaire_id)
            .await?
            .into_iter()
            .map(|row| row.into_snapshot().map_err(StoreError::from))
            .collect()
    }

    async fn commit_publish(&self, snapshot: &Snapshot, expected_version: Version) -> StoreResult<()> {
        let id = snapshot.questionnaire_id;
        match PublicationRepo::commit_publish(&self.pool, snapshot, expected_version)
            .await
            .map_err(classify)?
        {
            CommitOutcome::Committed => Ok(()),
            CommitOutcome::VersionMoved { found } => Err(version_moved(id, expected_version, found)),
            CommitOutcome::NotFound => Err(StoreError::NotFound(id)),
        }
    }

    async fn commit_unpublish(&self, questionnaire_id: DbId, discard_version: Version) -> StoreResult<()> {
        match PublicationRepo::commit_unpublish(&self.pool, questionnaire_id, discard_version).await? {
            CommitOutcome::Committed => Ok(()),
            CommitOutcome::VersionMoved { found } => {
                Err(version_moved(questionnaire_id, discard_version, found))
            }
            CommitOutcome::NotFound => Err(StoreError::NotFound(questionnaire_id)),
        }
    }
}
