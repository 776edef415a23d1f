//! In-process implementation of both collaborator traits.
//!
//! Every operation runs under a single mutex, so the commit operations are
//! atomic. Used by tests and by callers that keep questionnaires in memory.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use qpub_core::graph::QuestionnaireGraph;
use qpub_core::lifecycle::{PublishState, UNPUBLISHED_VERSION};
use qpub_core::snapshot::Snapshot;
use qpub_core::types::{DbId, Version};

use crate::error::StoreError;
use crate::store::{version_moved, GraphSource, SnapshotStore, StoreResult};

struct Record {
    graph: QuestionnaireGraph,
    state: PublishState,
    version: Version,
    snapshots: BTreeMap<Version, Snapshot>,
}

/// Questionnaires, their draft graphs and snapshot histories held in memory.
#[derive(Default)]
pub struct InMemoryStore {
    records: Mutex<HashMap<DbId, Record>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a questionnaire or replace its draft content. The version
    /// counter, state and history of an existing questionnaire are kept.
    pub fn put_graph(&self, graph: QuestionnaireGraph) {
        let id = graph.questionnaire().id;
        let mut records = self.records();
        match records.get_mut(&id) {
            Some(record) => record.graph = graph,
            None => {
                records.insert(
                    id,
                    Record {
                        graph,
                        state: PublishState::Draft,
                        version: UNPUBLISHED_VERSION,
                        snapshots: BTreeMap::new(),
                    },
                );
            }
        }
    }

    fn records(&self) -> MutexGuard<'_, HashMap<DbId, Record>> {
        // A panic while holding the lock cannot leave a record half-written:
        // every mutation below is a single assignment or insert.
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_record<T>(
        &self,
        id: DbId,
        f: impl FnOnce(&mut Record) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut records = self.records();
        let record = records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        f(record)
    }
}

#[async_trait]
impl GraphSource for InMemoryStore {
    async fn load_graph(&self, questionnaire_id: DbId) -> StoreResult<QuestionnaireGraph> {
        self.with_record(questionnaire_id, |r| Ok(r.graph.clone()))
    }
}

#[async_trait]
impl SnapshotStore for InMemoryStore {
    async fn get_version(&self, questionnaire_id: DbId) -> StoreResult<Version> {
        self.with_record(questionnaire_id, |r| Ok(r.version))
    }

    async fn set_version(&self, questionnaire_id: DbId, version: Version) -> StoreResult<()> {
        self.with_record(questionnaire_id, |r| {
            r.version = version;
            Ok(())
        })
    }

    async fn get_state(&self, questionnaire_id: DbId) -> StoreResult<PublishState> {
        self.with_record(questionnaire_id, |r| Ok(r.state))
    }

    async fn set_state(&self, questionnaire_id: DbId, state: PublishState) -> StoreResult<()> {
        self.with_record(questionnaire_id, |r| {
            r.state = state;
            Ok(())
        })
    }

    async fn save_snapshot(&self, snapshot: &Snapshot) -> StoreResult<()> {
        self.with_record(snapshot.questionnaire_id, |r| insert_snapshot(r, snapshot))
    }

    async fn load_snapshot(
        &self,
        questionnaire_id: DbId,
        version: Version,
    ) -> StoreResult<Option<Snapshot>> {
        self.with_record(questionnaire_id, |r| Ok(r.snapshots.get(&version).cloned()))
    }

    async fn delete_snapshot(&self, questionnaire_id: DbId, version: Version) -> StoreResult<bool> {
        self.with_record(questionnaire_id, |r| Ok(r.snapshots.remove(&version).is_some()))
    }

    async fn list_snapshots(&self, questionnaire_id: DbId) -> StoreResult<Vec<Snapshot>> {
        self.with_record(questionnaire_id, |r| {
            Ok(r.snapshots.values().rev().cloned().collect())
        })
    }

    async fn commit_publish(&self, snapshot: &Snapshot, expected_version: Version) -> StoreResult<()> {
        let id = snapshot.questionnaire_id;
        self.with_record(id, |r| {
            if r.version != expected_version {
                return Err(version_moved(id, expected_version, r.version));
            }
            insert_snapshot(r, snapshot)?;
            r.version = snapshot.version;
            r.state = PublishState::Published;
            Ok(())
        })
    }

    async fn commit_unpublish(&self, questionnaire_id: DbId, discard_version: Version) -> StoreResult<()> {
        self.with_record(questionnaire_id, |r| {
            if r.version != discard_version {
                return Err(version_moved(questionnaire_id, discard_version, r.version));
            }
            r.state = PublishState::Draft;
            r.snapshots.remove(&discard_version);
            r.version = discard_version - 1;
            Ok(())
        })
    }
}

fn insert_snapshot(record: &mut Record, snapshot: &Snapshot) -> StoreResult<()> {
    if record.snapshots.contains_key(&snapshot.version) {
        return Err(StoreError::Conflict(format!(
            "Questionnaire {} already has a snapshot for version {}",
            snapshot.questionnaire_id, snapshot.version
        )));
    }
    record.snapshots.insert(snapshot.version, snapshot.clone());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use qpub_core::graph::QuestionnaireInfo;
    use serde_json::json;

    fn empty_graph(id: DbId) -> QuestionnaireGraph {
        QuestionnaireGraph::new(
            QuestionnaireInfo {
                id,
                title: "T".to_string(),
                description: None,
            },
            vec![],
        )
        .unwrap()
    }

    fn snapshot(id: DbId, version: Version) -> Snapshot {
        Snapshot::new(id, version, json!({"questions": []}), vec![], chrono::Utc::now())
    }

    #[tokio::test]
    async fn unknown_questionnaire_is_not_found() {
        let store = InMemoryStore::new();
        assert!(matches!(store.get_version(1).await, Err(StoreError::NotFound(1))));
        assert!(matches!(store.load_graph(1).await, Err(StoreError::NotFound(1))));
    }

    #[tokio::test]
    async fn put_graph_keeps_version_and_state() {
        let store = InMemoryStore::new();
        store.put_graph(empty_graph(1));
        store.set_version(1, 3).await.unwrap();
        store.set_state(1, PublishState::Published).await.unwrap();

        store.put_graph(empty_graph(1));
        assert_eq!(store.get_version(1).await.unwrap(), 3);
        assert_eq!(store.get_state(1).await.unwrap(), PublishState::Published);
    }

    #[tokio::test]
    async fn duplicate_snapshot_version_conflicts() {
        let store = InMemoryStore::new();
        store.put_graph(empty_graph(1));
        store.save_snapshot(&snapshot(1, 1)).await.unwrap();
        assert!(matches!(
            store.save_snapshot(&snapshot(1, 1)).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn list_snapshots_newest_first() {
        let store = InMemoryStore::new();
        store.put_graph(empty_graph(1));
        for v in 1..=3 {
            store.save_snapshot(&snapshot(1, v)).await.unwrap();
        }
        let versions: Vec<Version> = store
            .list_snapshots(1)
            .await
            .unwrap()
            .iter()
            .map(|s| s.version)
            .collect();
        assert_eq!(versions, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn commit_publish_checks_expected_version() {
        let store = InMemoryStore::new();
        store.put_graph(empty_graph(1));
        assert!(matches!(
            store.commit_publish(&snapshot(1, 2), 1).await,
            Err(StoreError::Conflict(_))
        ));
        assert!(store.load_snapshot(1, 2).await.unwrap().is_none());
        assert_eq!(store.get_version(1).await.unwrap(), 0);
    }
}
