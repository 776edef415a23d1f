//! Version lifecycle manager.
//!
//! Publish: load the live graph, validate branching, number the next version,
//! serialize the snapshot, diff it against the previous version and commit
//! snapshot + counter + state in one store operation. Unpublish: mark draft,
//! discard the newest snapshot and step the counter back.
//!
//! Each transition runs inside the questionnaire's critical section, and the
//! store re-checks the counter at commit time so a concurrent writer elsewhere
//! surfaces as a retryable conflict rather than a duplicated version.

use std::sync::Arc;

use chrono::Utc;
use qpub_core::branching::{self, BranchingReport};
use qpub_core::diff::{self, summarize, ChangeLog};
use qpub_core::lifecycle::{self, UnpublishPlan};
use qpub_core::snapshot::{self, Snapshot, SnapshotSummary};
use qpub_core::types::{DbId, Version};
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::error::PublishError;
use crate::locks::KeyedLocks;
use crate::store::{GraphSource, SnapshotStore};

/// Result of an unpublish request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UnpublishOutcome {
    /// The questionnaire was already a draft; nothing changed.
    AlreadyDraft { version: Version },
    /// The newest snapshot was discarded.
    RolledBack { discarded_version: Version, version: Version },
}

/// Orchestrates publish/unpublish transitions over a store.
pub struct PublishManager<S> {
    store: Arc<S>,
    config: PipelineConfig,
    locks: KeyedLocks,
}

impl<S> PublishManager<S>
where
    S: GraphSource + SnapshotStore,
{
    pub fn new(store: Arc<S>, config: PipelineConfig) -> Self {
        Self {
            store,
            config,
            locks: KeyedLocks::new(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Publish the live draft as a new version.
    ///
    /// Returns the committed snapshot. A failed branching check is
    /// [`PublishError::Rejected`] and leaves everything unchanged; persistence
    /// conflicts are retried up to `max_conflict_retries` times.
    pub async fn publish(&self, questionnaire_id: DbId) -> Result<Snapshot, PublishError> {
        let _guard = self.locks.acquire(questionnaire_id).await;

        let mut attempt = 0;
        loop {
            match self.try_publish(questionnaire_id).await {
                Err(PublishError::Conflict(reason)) if attempt < self.config.max_conflict_retries => {
                    attempt += 1;
                    tracing::warn!(
                        questionnaire_id,
                        attempt,
                        reason = %reason,
                        "Publish conflicted with another writer, retrying"
                    );
                }
                result => return result,
            }
        }
    }

    async fn try_publish(&self, questionnaire_id: DbId) -> Result<Snapshot, PublishError> {
        let graph = self.store.load_graph(questionnaire_id).await?;
        branching::check_graph_size(&graph, self.config.max_questions)?;

        let report = branching::diagnose(&graph, self.config.dead_end_policy);
        if !report.verdict.is_ok() {
            tracing::warn!(
                questionnaire_id,
                verdict = %report.verdict,
                question_id = ?report.question_id,
                answer_id = ?report.answer_id,
                "Publish rejected by branching validation"
            );
            return Err(PublishError::Rejected(report));
        }

        let current = self.store.get_version(questionnaire_id).await?;
        let version = lifecycle::next_version(current)?;
        let tree = snapshot::to_tree(&graph)?;

        let change_log = match lifecycle::predecessor(version) {
            None => ChangeLog::new(),
            Some(previous) => {
                match self.store.load_snapshot(questionnaire_id, previous).await? {
                    Some(prev) => {
                        snapshot::verify_tree(&prev.tree)?;
                        diff::diff(Some(&prev.tree), Some(&tree))
                    }
                    None => {
                        tracing::warn!(
                            questionnaire_id,
                            previous,
                            "Previous snapshot missing, recording every field as added"
                        );
                        diff::diff(None, Some(&tree))
                    }
                }
            }
        };
        tracing::debug!(questionnaire_id, version, changes = change_log.len(), "Snapshot prepared");

        let snapshot = Snapshot::new(questionnaire_id, version, tree, change_log, Utc::now());
        self.store.commit_publish(&snapshot, current).await?;

        let summary = summarize(&snapshot.change_log);
        tracing::info!(
            questionnaire_id,
            version,
            added = summary.added,
            removed = summary.removed,
            modified = summary.modified,
            "Questionnaire published"
        );
        Ok(snapshot)
    }

    /// Roll back the newest published version. Succeeds without changes when
    /// the questionnaire is already a draft.
    pub async fn unpublish(&self, questionnaire_id: DbId) -> Result<UnpublishOutcome, PublishError> {
        let _guard = self.locks.acquire(questionnaire_id).await;

        let state = self.store.get_state(questionnaire_id).await?;
        let version = self.store.get_version(questionnaire_id).await?;

        match lifecycle::plan_unpublish(state, version)? {
            UnpublishPlan::AlreadyDraft => {
                tracing::debug!(questionnaire_id, version, "Unpublish of a draft, nothing to do");
                Ok(UnpublishOutcome::AlreadyDraft { version })
            }
            UnpublishPlan::Rollback {
                discard_version,
                restored_version,
            } => {
                self.store
                    .commit_unpublish(questionnaire_id, discard_version)
                    .await?;
                tracing::info!(
                    questionnaire_id,
                    discarded_version = discard_version,
                    version = restored_version,
                    "Questionnaire unpublished"
                );
                Ok(UnpublishOutcome::RolledBack {
                    discarded_version: discard_version,
                    version: restored_version,
                })
            }
        }
    }

    // ── Read-only operations ─────────────────────────────────────────

    /// Run branching validation on the live draft without publishing.
    pub async fn check(&self, questionnaire_id: DbId) -> Result<BranchingReport, PublishError> {
        let graph = self.store.load_graph(questionnaire_id).await?;
        branching::check_graph_size(&graph, self.config.max_questions)?;
        Ok(branching::diagnose(&graph, self.config.dead_end_policy))
    }

    /// Changes the live draft would introduce over the newest stored
    /// snapshot (everything added if there is none). Nothing is persisted.
    pub async fn preview(&self, questionnaire_id: DbId) -> Result<ChangeLog, PublishError> {
        let graph = self.store.load_graph(questionnaire_id).await?;
        let tree = snapshot::to_tree(&graph)?;

        let current = self.store.get_version(questionnaire_id).await?;
        let previous = if current > lifecycle::UNPUBLISHED_VERSION {
            self.store.load_snapshot(questionnaire_id, current).await?
        } else {
            None
        };
        if let Some(prev) = &previous {
            snapshot::verify_tree(&prev.tree)?;
        }
        Ok(diff::diff(previous.as_ref().map(|s| &s.tree), Some(&tree)))
    }

    /// Version history, newest first.
    pub async fn history(&self, questionnaire_id: DbId) -> Result<Vec<SnapshotSummary>, PublishError> {
        Ok(self
            .store
            .list_snapshots(questionnaire_id)
            .await?
            .iter()
            .map(Snapshot::summary)
            .collect())
    }

    /// One stored version, if it exists.
    pub async fn snapshot(
        &self,
        questionnaire_id: DbId,
        version: Version,
    ) -> Result<Option<Snapshot>, PublishError> {
        Ok(self.store.load_snapshot(questionnaire_id, version).await?)
    }
}
