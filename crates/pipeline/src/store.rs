//! Collaborator traits the lifecycle manager is written against.
//!
//! [`GraphSource`] materializes the live authoring graph; [`SnapshotStore`]
//! owns the version counter, publish state and snapshot history. The two
//! commit operations have default implementations composed from the
//! primitives; stores that can do better (one transaction, one lock) should
//! override them.

use async_trait::async_trait;
use qpub_core::graph::QuestionnaireGraph;
use qpub_core::lifecycle::PublishState;
use qpub_core::snapshot::Snapshot;
use qpub_core::types::{DbId, Version};

use crate::error::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

/// Inbound collaborator: the authoring store.
#[async_trait]
pub trait GraphSource: Send + Sync {
    /// Load the live (non-deleted) questions and answers of a questionnaire.
    async fn load_graph(&self, questionnaire_id: DbId) -> StoreResult<QuestionnaireGraph>;
}

/// Outbound collaborator: version counter, state and snapshot history.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn get_version(&self, questionnaire_id: DbId) -> StoreResult<Version>;

    async fn set_version(&self, questionnaire_id: DbId, version: Version) -> StoreResult<()>;

    async fn get_state(&self, questionnaire_id: DbId) -> StoreResult<PublishState>;

    async fn set_state(&self, questionnaire_id: DbId, state: PublishState) -> StoreResult<()>;

    /// Write a new snapshot. An existing snapshot with the same
    /// `(questionnaire_id, version)` is a [`StoreError::Conflict`].
    async fn save_snapshot(&self, snapshot: &Snapshot) -> StoreResult<()>;

    async fn load_snapshot(
        &self,
        questionnaire_id: DbId,
        version: Version,
    ) -> StoreResult<Option<Snapshot>>;

    /// Remove one snapshot. Returns `true` if it existed.
    async fn delete_snapshot(&self, questionnaire_id: DbId, version: Version) -> StoreResult<bool>;

    /// All snapshots of a questionnaire, newest first.
    async fn list_snapshots(&self, questionnaire_id: DbId) -> StoreResult<Vec<Snapshot>>;

    /// Store `snapshot`, advance the counter to its version and mark the
    /// questionnaire published, provided the counter still equals
    /// `expected_version`.
    ///
    /// The default implementation undoes earlier steps when a later one
    /// fails; it is only as atomic as the primitives allow.
    async fn commit_publish(&self, snapshot: &Snapshot, expected_version: Version) -> StoreResult<()> {
        let id = snapshot.questionnaire_id;
        let current = self.get_version(id).await?;
        if current != expected_version {
            return Err(version_moved(id, expected_version, current));
        }

        self.save_snapshot(snapshot).await?;

        if let Err(err) = self.set_version(id, snapshot.version).await {
            self.undo_snapshot(snapshot).await;
            return Err(err);
        }
        if let Err(err) = self.set_state(id, PublishState::Published).await {
            if let Err(undo) = self.set_version(id, expected_version).await {
                tracing::error!(
                    questionnaire_id = id,
                    error = %undo,
                    "Failed to restore version counter after aborted publish"
                );
            }
            self.undo_snapshot(snapshot).await;
            return Err(err);
        }
        Ok(())
    }

    /// Discard the snapshot at `discard_version`, step the counter back and
    /// mark the questionnaire draft, provided the counter still equals
    /// `discard_version`.
    ///
    /// The state flips last; earlier steps are undone when a later one fails.
    async fn commit_unpublish(&self, questionnaire_id: DbId, discard_version: Version) -> StoreResult<()> {
        let current = self.get_version(questionnaire_id).await?;
        if current != discard_version {
            return Err(version_moved(questionnaire_id, discard_version, current));
        }

        let discarded = self.load_snapshot(questionnaire_id, discard_version).await?;
        self.delete_snapshot(questionnaire_id, discard_version).await?;

        if let Err(err) = self.set_version(questionnaire_id, discard_version - 1).await {
            self.restore_snapshot(discarded.as_ref()).await;
            return Err(err);
        }
        if let Err(err) = self.set_state(questionnaire_id, PublishState::Draft).await {
            if let Err(undo) = self.set_version(questionnaire_id, discard_version).await {
                tracing::error!(
                    questionnaire_id,
                    error = %undo,
                    "Failed to restore version counter after aborted unpublish"
                );
            }
            self.restore_snapshot(discarded.as_ref()).await;
            return Err(err);
        }
        Ok(())
    }

    /// Best-effort removal of a snapshot written by an aborted publish.
    async fn undo_snapshot(&self, snapshot: &Snapshot) {
        if let Err(err) = self
            .delete_snapshot(snapshot.questionnaire_id, snapshot.version)
            .await
        {
            tracing::error!(
                questionnaire_id = snapshot.questionnaire_id,
                version = snapshot.version,
                error = %err,
                "Failed to remove snapshot of aborted publish"
            );
        }
    }

    /// Best-effort re-insert of a snapshot removed by an aborted unpublish.
    async fn restore_snapshot(&self, snapshot: Option<&Snapshot>) {
        let Some(snapshot) = snapshot else {
            return;
        };
        if let Err(err) = self.save_snapshot(snapshot).await {
            tracing::error!(
                questionnaire_id = snapshot.questionnaire_id,
                version = snapshot.version,
                error = %err,
                "Failed to restore snapshot of aborted unpublish"
            );
        }
    }
}

/// Conflict raised when the stored counter moved under a transition.
pub fn version_moved(questionnaire_id: DbId, expected: Version, found: Version) -> StoreError {
    StoreError::Conflict(format!(
        "Questionnaire {questionnaire_id} is at version {found}, expected {expected}"
    ))
}
