//! Questionnaire snapshot model.
//!
//! Snapshots are write-once; there is no update DTO. The tree and change log
//! are stored as JSON text so object key order survives the round trip.

use qpub_core::diff::ChangeLog;
use qpub_core::error::CoreError;
use qpub_core::snapshot::{self, Snapshot};
use qpub_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `questionnaire_snapshots` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QuestionnaireSnapshot {
    pub id: DbId,
    pub questionnaire_id: DbId,
    pub version: i32,
    pub tree: String,
    pub change_log: String,
    pub created_at: Timestamp,
}

/// Serialized columns of a snapshot about to be inserted.
#[derive(Debug, Clone)]
pub struct SnapshotText {
    pub tree: String,
    pub change_log: String,
}

impl SnapshotText {
    pub fn encode(snapshot: &Snapshot) -> Result<Self, sqlx::Error> {
        let encode = |e: serde_json::Error| sqlx::Error::Encode(Box::new(e));
        Ok(Self {
            tree: serde_json::to_string(&snapshot.tree).map_err(encode)?,
            change_log: serde_json::to_string(&snapshot.change_log).map_err(encode)?,
        })
    }
}

impl QuestionnaireSnapshot {
    /// Decode into the core snapshot, failing loudly on a damaged row.
    pub fn into_snapshot(self) -> Result<Snapshot, CoreError> {
        let tree = snapshot::parse_tree(&self.tree)?;
        let change_log: ChangeLog = serde_json::from_str(&self.change_log).map_err(|e| {
            CoreError::Integrity(format!(
                "Snapshot v{} of questionnaire {} has an unreadable change log: {e}",
                self.version, self.questionnaire_id
            ))
        })?;
        Ok(Snapshot::new(
            self.questionnaire_id,
            self.version,
            tree,
            change_log,
            self.created_at,
        ))
    }
}
