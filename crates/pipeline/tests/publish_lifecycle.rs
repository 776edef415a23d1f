//! Integration tests for the publish/unpublish lifecycle over the in-memory
//! store.
//!
//! Covers branching rejection, version numbering, change logs against the
//! previous version, unpublish rollback and conflict handling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use qpub_core::branching::{DeadEndPolicy, HealthVerdict};
use qpub_core::diff::{ChangeEntry, ChangeKind};
use qpub_core::error::CoreError;
use qpub_core::graph::{Answer, Destination, Question, QuestionnaireGraph, QuestionnaireInfo};
use qpub_core::lifecycle::PublishState;
use qpub_core::snapshot::Snapshot;
use qpub_core::types::DbId;
use qpub_pipeline::store::StoreResult;
use qpub_pipeline::{
    GraphSource, InMemoryStore, PipelineConfig, PublishError, PublishManager, SnapshotStore,
    StoreError, UnpublishOutcome,
};
use serde_json::json;

const QID: DbId = 1;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn info() -> QuestionnaireInfo {
    QuestionnaireInfo {
        id: QID,
        title: "Intake".to_string(),
        description: None,
    }
}

fn answer(id: DbId, question_id: DbId, destination: Destination) -> Answer {
    Answer {
        id,
        question_id,
        content: format!("A{id}"),
        destination,
        priority: None,
    }
}

fn question(id: DbId, order: i32, content: &str, answers: Vec<Answer>) -> Question {
    Question {
        id,
        order,
        content: content.to_string(),
        answers,
    }
}

fn link() -> Destination {
    Destination::ExternalLink {
        url: "https://example.com/thanks".to_string(),
    }
}

/// One question whose only answer has no destination.
fn broken_graph() -> QuestionnaireGraph {
    QuestionnaireGraph::new(
        info(),
        vec![question(10, 1, "Q1", vec![answer(100, 10, Destination::None)])],
    )
    .unwrap()
}

/// Q1 -> Q2 -> external link.
fn healthy_graph(q1_content: &str) -> QuestionnaireGraph {
    QuestionnaireGraph::new(
        info(),
        vec![
            question(
                10,
                1,
                q1_content,
                vec![answer(100, 10, Destination::Question { question_id: 20 })],
            ),
            question(20, 2, "Q2", vec![answer(200, 20, link())]),
        ],
    )
    .unwrap()
}

/// Q1's answer points back at Q1.
fn self_loop_graph() -> QuestionnaireGraph {
    QuestionnaireGraph::new(
        info(),
        vec![
            question(
                10,
                1,
                "Q1 updated",
                vec![answer(100, 10, Destination::Question { question_id: 10 })],
            ),
            question(20, 2, "Q2", vec![answer(200, 20, link())]),
        ],
    )
    .unwrap()
}

fn manager_with(graph: QuestionnaireGraph) -> PublishManager<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    store.put_graph(graph);
    PublishManager::new(store, PipelineConfig::default())
}

async fn version(manager: &PublishManager<InMemoryStore>) -> i32 {
    manager.store().get_version(QID).await.unwrap()
}

// ---------------------------------------------------------------------------
// Scenario walk-through
// ---------------------------------------------------------------------------

#[tokio::test]
async fn authoring_scenario_end_to_end() {
    // Single question, answer without destination: broken, nothing published.
    let manager = manager_with(broken_graph());
    let err = manager.publish(QID).await.unwrap_err();
    assert_matches!(err, PublishError::Rejected(report) if report.verdict == HealthVerdict::Broken);
    assert_eq!(version(&manager).await, 0);
    assert_eq!(manager.store().get_state(QID).await.unwrap(), PublishState::Draft);

    // Add Q2 with an external link and point Q1 at it: first publish.
    manager.store().put_graph(healthy_graph("Q1"));
    let v1 = manager.publish(QID).await.unwrap();
    assert_eq!(v1.version, 1);
    assert!(v1.change_log.is_empty());
    assert_eq!(manager.store().get_state(QID).await.unwrap(), PublishState::Published);

    // Edit Q1's content: second publish records exactly that edit.
    manager.store().put_graph(healthy_graph("Q1 updated"));
    let v2 = manager.publish(QID).await.unwrap();
    assert_eq!(v2.version, 2);
    assert_eq!(
        v2.change_log,
        vec![ChangeEntry {
            path: "$.questions[0].content".to_string(),
            kind: ChangeKind::Modified,
            old_value: Some(json!("Q1")),
            new_value: Some(json!("Q1 updated")),
        }]
    );

    // Point Q1 at itself: cyclic, version stays at 2.
    manager.store().put_graph(self_loop_graph());
    let err = manager.publish(QID).await.unwrap_err();
    assert_matches!(err, PublishError::Rejected(report) if report.verdict == HealthVerdict::Cyclic);
    assert_eq!(version(&manager).await, 2);
    assert!(manager.snapshot(QID, 3).await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

#[tokio::test]
async fn versions_are_contiguous_from_one() {
    let manager = manager_with(healthy_graph("Q1"));
    let mut versions = Vec::new();
    for _ in 0..5 {
        versions.push(manager.publish(QID).await.unwrap().version);
    }
    assert_eq!(versions, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn republishing_unchanged_draft_has_empty_change_log() {
    let manager = manager_with(healthy_graph("Q1"));
    manager.publish(QID).await.unwrap();
    let v2 = manager.publish(QID).await.unwrap();
    assert_eq!(v2.version, 2);
    assert!(v2.change_log.is_empty());
}

#[tokio::test]
async fn concurrent_publishes_get_distinct_versions() {
    let manager = Arc::new(manager_with(healthy_graph("Q1")));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.publish(QID).await.map(|s| s.version) })
        })
        .collect();

    let mut versions = Vec::new();
    for handle in handles {
        versions.push(handle.await.unwrap().unwrap());
    }
    versions.sort_unstable();
    assert_eq!(versions, vec![1, 2, 3, 4]);
    assert_eq!(version(&manager).await, 4);
}

#[tokio::test]
async fn stored_history_is_not_rewritten_by_later_publishes() {
    let manager = manager_with(healthy_graph("Q1"));
    let v1 = manager.publish(QID).await.unwrap();
    manager.store().put_graph(healthy_graph("Q1 updated"));
    manager.publish(QID).await.unwrap();

    let stored_v1 = manager.snapshot(QID, 1).await.unwrap().unwrap();
    assert_eq!(stored_v1, v1);
    assert_eq!(stored_v1.tree["questions"][0]["content"], json!("Q1"));
}

// ---------------------------------------------------------------------------
// Unpublish
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unpublish_rolls_back_and_republish_diffs_against_v1() {
    let manager = manager_with(healthy_graph("Q1"));
    manager.publish(QID).await.unwrap();
    manager.store().put_graph(healthy_graph("Q1 updated"));
    manager.publish(QID).await.unwrap();

    let outcome = manager.unpublish(QID).await.unwrap();
    assert_eq!(
        outcome,
        UnpublishOutcome::RolledBack {
            discarded_version: 2,
            version: 1
        }
    );
    assert_eq!(version(&manager).await, 1);
    assert_eq!(manager.store().get_state(QID).await.unwrap(), PublishState::Draft);
    assert!(manager.snapshot(QID, 2).await.unwrap().is_none());

    // Editable content is untouched; republishing yields v2 again.
    manager.store().put_graph(healthy_graph("Q1 again"));
    let v2 = manager.publish(QID).await.unwrap();
    assert_eq!(v2.version, 2);
    assert_eq!(v2.change_log.len(), 1);
    assert_eq!(v2.change_log[0].old_value, Some(json!("Q1")));
    assert_eq!(v2.change_log[0].new_value, Some(json!("Q1 again")));
}

#[tokio::test]
async fn unpublish_of_draft_is_noop_success() {
    let manager = manager_with(healthy_graph("Q1"));
    assert_eq!(
        manager.unpublish(QID).await.unwrap(),
        UnpublishOutcome::AlreadyDraft { version: 0 }
    );

    manager.publish(QID).await.unwrap();
    manager.unpublish(QID).await.unwrap();
    assert_eq!(
        manager.unpublish(QID).await.unwrap(),
        UnpublishOutcome::AlreadyDraft { version: 0 }
    );
    assert!(manager.history(QID).await.unwrap().is_empty());
}

#[tokio::test]
async fn unpublish_of_first_version_empties_history() {
    let manager = manager_with(healthy_graph("Q1"));
    manager.publish(QID).await.unwrap();
    manager.unpublish(QID).await.unwrap();

    assert_eq!(version(&manager).await, 0);
    let v1 = manager.publish(QID).await.unwrap();
    assert_eq!(v1.version, 1);
    assert!(v1.change_log.is_empty());
}

// ---------------------------------------------------------------------------
// Read-only operations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn history_lists_newest_first_with_counts() {
    let manager = manager_with(healthy_graph("Q1"));
    manager.publish(QID).await.unwrap();
    manager.store().put_graph(healthy_graph("Q1 updated"));
    manager.publish(QID).await.unwrap();

    let history = manager.history(QID).await.unwrap();
    let versions: Vec<i32> = history.iter().map(|s| s.version).collect();
    assert_eq!(versions, vec![2, 1]);
    assert_eq!(history[0].changes.modified, 1);
    assert_eq!(history[1].changes.total(), 0);
}

#[tokio::test]
async fn preview_shows_pending_changes_without_persisting() {
    let manager = manager_with(healthy_graph("Q1"));

    let before_first = manager.preview(QID).await.unwrap();
    assert!(!before_first.is_empty());
    assert!(before_first.iter().all(|e| e.kind == ChangeKind::Added));

    manager.publish(QID).await.unwrap();
    assert!(manager.preview(QID).await.unwrap().is_empty());

    manager.store().put_graph(healthy_graph("Q1 draft"));
    let pending = manager.preview(QID).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].path, "$.questions[0].content");
    assert_eq!(version(&manager).await, 1);
}

#[tokio::test]
async fn preview_does_not_validate_branching() {
    let manager = manager_with(self_loop_graph());
    assert!(!manager.preview(QID).await.unwrap().is_empty());
    let report = manager.check(QID).await.unwrap();
    assert_eq!(report.verdict, HealthVerdict::Cyclic);
    assert_eq!(report.question_id, Some(10));
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn strict_policy_rejects_interior_dead_end() {
    let graph = QuestionnaireGraph::new(
        info(),
        vec![
            question(10, 1, "Q1", vec![answer(100, 10, Destination::None)]),
            question(20, 2, "Q2", vec![answer(200, 20, link())]),
        ],
    )
    .unwrap();

    let lenient = manager_with(graph.clone());
    assert_eq!(lenient.publish(QID).await.unwrap().version, 1);

    let store = Arc::new(InMemoryStore::new());
    store.put_graph(graph);
    let strict = PublishManager::new(
        store,
        PipelineConfig {
            dead_end_policy: DeadEndPolicy::AllQuestions,
            ..PipelineConfig::default()
        },
    );
    let err = strict.publish(QID).await.unwrap_err();
    assert_matches!(
        err,
        PublishError::Rejected(report)
            if report.verdict == HealthVerdict::Broken && report.answer_id == Some(100)
    );
}

#[tokio::test]
async fn oversized_graph_is_rejected_before_validation() {
    let store = Arc::new(InMemoryStore::new());
    store.put_graph(healthy_graph("Q1"));
    let manager = PublishManager::new(
        store,
        PipelineConfig {
            max_questions: 1,
            ..PipelineConfig::default()
        },
    );
    let err = manager.publish(QID).await.unwrap_err();
    assert_matches!(err, PublishError::Core(CoreError::Validation(_)));
    assert!(!err.is_retryable());
    assert_eq!(version(&manager).await, 0);
}

#[tokio::test]
async fn unknown_questionnaire_is_not_found() {
    let manager = manager_with(healthy_graph("Q1"));
    assert_matches!(manager.publish(99).await, Err(PublishError::NotFound(99)));
    assert_matches!(manager.unpublish(99).await, Err(PublishError::NotFound(99)));
}

// ---------------------------------------------------------------------------
// Conflicts and store failures
// ---------------------------------------------------------------------------

/// Wraps an [`InMemoryStore`], letting another writer publish a version
/// between the manager's read of the counter and its commit, `races` times.
struct RacingStore {
    inner: InMemoryStore,
    races: std::sync::Mutex<u32>,
}

impl RacingStore {
    fn new(races: u32) -> Self {
        let inner = InMemoryStore::new();
        inner.put_graph(healthy_graph("Q1"));
        Self {
            inner,
            races: std::sync::Mutex::new(races),
        }
    }

    fn take_race(&self) -> bool {
        let mut races = self.races.lock().unwrap();
        if *races > 0 {
            *races -= 1;
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl GraphSource for RacingStore {
    async fn load_graph(&self, id: DbId) -> StoreResult<QuestionnaireGraph> {
        self.inner.load_graph(id).await
    }
}

#[async_trait]
impl SnapshotStore for RacingStore {
    async fn get_version(&self, id: DbId) -> StoreResult<i32> {
        self.inner.get_version(id).await
    }
    async fn set_version(&self, id: DbId, version: i32) -> StoreResult<()> {
        self.inner.set_version(id, version).await
    }
    async fn get_state(&self, id: DbId) -> StoreResult<PublishState> {
        self.inner.get_state(id).await
    }
    async fn set_state(&self, id: DbId, state: PublishState) -> StoreResult<()> {
        self.inner.set_state(id, state).await
    }
    async fn save_snapshot(&self, snapshot: &Snapshot) -> StoreResult<()> {
        self.inner.save_snapshot(snapshot).await
    }
    async fn load_snapshot(&self, id: DbId, version: i32) -> StoreResult<Option<Snapshot>> {
        self.inner.load_snapshot(id, version).await
    }
    async fn delete_snapshot(&self, id: DbId, version: i32) -> StoreResult<bool> {
        self.inner.delete_snapshot(id, version).await
    }
    async fn list_snapshots(&self, id: DbId) -> StoreResult<Vec<Snapshot>> {
        self.inner.list_snapshots(id).await
    }
    async fn commit_publish(&self, snapshot: &Snapshot, expected: i32) -> StoreResult<()> {
        if self.take_race() {
            let foreign = Snapshot::new(
                snapshot.questionnaire_id,
                expected + 1,
                snapshot.tree.clone(),
                vec![],
                chrono::Utc::now(),
            );
            self.inner.commit_publish(&foreign, expected).await?;
        }
        self.inner.commit_publish(snapshot, expected).await
    }
}

#[tokio::test]
async fn conflict_is_retried_against_the_new_version() {
    let manager = PublishManager::new(Arc::new(RacingStore::new(1)), PipelineConfig::default());
    let snapshot = manager.publish(QID).await.unwrap();

    // The other writer took v1; the retry lands on v2 and diffs against it.
    assert_eq!(snapshot.version, 2);
    assert!(snapshot.change_log.is_empty());
    let versions: Vec<i32> = manager
        .history(QID)
        .await
        .unwrap()
        .iter()
        .map(|s| s.version)
        .collect();
    assert_eq!(versions, vec![2, 1]);
}

#[tokio::test]
async fn conflict_surfaces_when_retries_are_exhausted() {
    let manager = PublishManager::new(
        Arc::new(RacingStore::new(5)),
        PipelineConfig {
            max_conflict_retries: 1,
            ..PipelineConfig::default()
        },
    );
    let err = manager.publish(QID).await.unwrap_err();
    assert_matches!(err, PublishError::Conflict(_));
    assert!(err.is_retryable());

    // Only the two foreign versions exist; ours was never written.
    assert_eq!(manager.store().get_version(QID).await.unwrap(), 2);
}

/// Implements only the primitives, so the default commit operations run.
/// `set_state` and `delete_snapshot` can be switched to fail to exercise the
/// undo paths.
#[derive(Default)]
struct PrimitiveStore {
    inner: InMemoryStore,
    fail_set_state: AtomicBool,
    fail_delete: AtomicBool,
}

fn injected(what: &str) -> StoreError {
    StoreError::Core(CoreError::Internal(format!("{what} failed")))
}

#[async_trait]
impl GraphSource for PrimitiveStore {
    async fn load_graph(&self, id: DbId) -> StoreResult<QuestionnaireGraph> {
        self.inner.load_graph(id).await
    }
}

#[async_trait]
impl SnapshotStore for PrimitiveStore {
    async fn get_version(&self, id: DbId) -> StoreResult<i32> {
        self.inner.get_version(id).await
    }
    async fn set_version(&self, id: DbId, version: i32) -> StoreResult<()> {
        self.inner.set_version(id, version).await
    }
    async fn get_state(&self, id: DbId) -> StoreResult<PublishState> {
        self.inner.get_state(id).await
    }
    async fn set_state(&self, id: DbId, state: PublishState) -> StoreResult<()> {
        if self.fail_set_state.load(Ordering::SeqCst) {
            return Err(injected("state write"));
        }
        self.inner.set_state(id, state).await
    }
    async fn save_snapshot(&self, snapshot: &Snapshot) -> StoreResult<()> {
        self.inner.save_snapshot(snapshot).await
    }
    async fn load_snapshot(&self, id: DbId, version: i32) -> StoreResult<Option<Snapshot>> {
        self.inner.load_snapshot(id, version).await
    }
    async fn delete_snapshot(&self, id: DbId, version: i32) -> StoreResult<bool> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(injected("delete"));
        }
        self.inner.delete_snapshot(id, version).await
    }
    async fn list_snapshots(&self, id: DbId) -> StoreResult<Vec<Snapshot>> {
        self.inner.list_snapshots(id).await
    }
}

fn primitive_manager() -> PublishManager<PrimitiveStore> {
    let store = PrimitiveStore::default();
    store.inner.put_graph(healthy_graph("Q1"));
    PublishManager::new(Arc::new(store), PipelineConfig::default())
}

#[tokio::test]
async fn default_commits_drive_the_full_lifecycle() {
    let manager = primitive_manager();
    assert_eq!(manager.publish(QID).await.unwrap().version, 1);
    assert_eq!(manager.publish(QID).await.unwrap().version, 2);
    assert_eq!(
        manager.unpublish(QID).await.unwrap(),
        UnpublishOutcome::RolledBack {
            discarded_version: 2,
            version: 1
        }
    );
    assert!(manager.snapshot(QID, 2).await.unwrap().is_none());
    assert_eq!(manager.store().get_state(QID).await.unwrap(), PublishState::Draft);
}

#[tokio::test]
async fn failed_publish_leaves_nothing_behind() {
    let manager = primitive_manager();
    manager.store().fail_set_state.store(true, Ordering::SeqCst);
    let err = manager.publish(QID).await.unwrap_err();
    assert_matches!(err, PublishError::Core(CoreError::Internal(_)));

    assert_eq!(manager.store().get_version(QID).await.unwrap(), 0);
    assert!(manager.snapshot(QID, 1).await.unwrap().is_none());
    assert!(manager.history(QID).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_delete_keeps_version_published_and_retryable() {
    let manager = primitive_manager();
    manager.publish(QID).await.unwrap();

    manager.store().fail_delete.store(true, Ordering::SeqCst);
    let err = manager.unpublish(QID).await.unwrap_err();
    assert_matches!(err, PublishError::Core(CoreError::Internal(_)));
    assert_eq!(manager.store().get_state(QID).await.unwrap(), PublishState::Published);
    assert_eq!(manager.store().get_version(QID).await.unwrap(), 1);
    assert!(manager.snapshot(QID, 1).await.unwrap().is_some());

    manager.store().fail_delete.store(false, Ordering::SeqCst);
    assert_eq!(
        manager.unpublish(QID).await.unwrap(),
        UnpublishOutcome::RolledBack {
            discarded_version: 1,
            version: 0
        }
    );
    assert!(manager.snapshot(QID, 1).await.unwrap().is_none());
}

#[tokio::test]
async fn failed_state_flip_restores_discarded_version() {
    let manager = primitive_manager();
    let v1 = manager.publish(QID).await.unwrap();

    manager.store().fail_set_state.store(true, Ordering::SeqCst);
    assert!(manager.unpublish(QID).await.is_err());
    assert_eq!(manager.store().get_state(QID).await.unwrap(), PublishState::Published);
    assert_eq!(manager.store().get_version(QID).await.unwrap(), 1);
    assert_eq!(manager.snapshot(QID, 1).await.unwrap(), Some(v1));
}

// ---------------------------------------------------------------------------
// Damaged history
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_predecessor_records_every_leaf_as_added() {
    let manager = manager_with(healthy_graph("Q1"));
    manager.publish(QID).await.unwrap();
    manager.publish(QID).await.unwrap();
    assert!(manager.store().delete_snapshot(QID, 2).await.unwrap());

    let v3 = manager.publish(QID).await.unwrap();
    assert_eq!(v3.version, 3);
    assert_eq!(v3.change_log, qpub_core::diff::diff(None, Some(&v3.tree)));
    assert!(!v3.change_log.is_empty());
    assert!(v3.change_log.iter().all(|e| e.kind == ChangeKind::Added));
    assert_eq!(version(&manager).await, 3);
}

#[tokio::test]
async fn malformed_predecessor_fails_without_committing() {
    let manager = manager_with(healthy_graph("Q1"));
    let v1 = manager.publish(QID).await.unwrap();

    let store = manager.store();
    store.delete_snapshot(QID, 1).await.unwrap();
    store
        .save_snapshot(&Snapshot::new(
            QID,
            1,
            json!({"title": "Intake"}),
            vec![],
            v1.created_at,
        ))
        .await
        .unwrap();

    let err = manager.publish(QID).await.unwrap_err();
    assert_matches!(err, PublishError::Core(CoreError::Integrity(_)));
    assert!(!err.is_retryable());
    assert_eq!(version(&manager).await, 1);
    assert!(manager.snapshot(QID, 2).await.unwrap().is_none());
}
