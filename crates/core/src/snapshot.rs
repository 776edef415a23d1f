//! Deterministic snapshot serialization.
//!
//! A published version stores the questionnaire as a generic JSON tree built
//! from [`SnapshotDocument`]. Field order and casing are fixed by the struct
//! definitions, so serializing an unchanged graph twice yields identical trees
//! and therefore an empty change log.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::diff::{summarize, ChangeLog, ChangeSummary};
use crate::error::CoreError;
use crate::graph::{Destination, QuestionnaireGraph};
use crate::types::{DbId, Timestamp, Version};

// ---------------------------------------------------------------------------
// Document shape
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    pub id: DbId,
    pub title: String,
    pub description: Option<String>,
    pub questions: Vec<QuestionDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionDocument {
    pub id: DbId,
    pub order: i32,
    pub content: String,
    pub answers: Vec<AnswerDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerDocument {
    pub id: DbId,
    pub content: String,
    pub destination: Destination,
    pub priority: Option<i32>,
}

impl SnapshotDocument {
    /// Expand a graph into its snapshot document.
    pub fn from_graph(graph: &QuestionnaireGraph) -> Self {
        let info = graph.questionnaire();
        Self {
            id: info.id,
            title: info.title.clone(),
            description: info.description.clone(),
            questions: graph
                .questions()
                .iter()
                .map(|q| QuestionDocument {
                    id: q.id,
                    order: q.order,
                    content: q.content.clone(),
                    answers: q
                        .answers
                        .iter()
                        .map(|a| AnswerDocument {
                            id: a.id,
                            content: a.content.clone(),
                            destination: a.destination.clone(),
                            priority: a.priority,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Serialize a graph into its snapshot tree.
pub fn to_tree(graph: &QuestionnaireGraph) -> Result<Value, CoreError> {
    serde_json::to_value(SnapshotDocument::from_graph(graph))
        .map_err(|e| CoreError::Internal(format!("Failed to serialize snapshot: {e}")))
}

/// Check that a stored tree still has the snapshot shape.
pub fn verify_tree(tree: &Value) -> Result<(), CoreError> {
    let obj = tree
        .as_object()
        .ok_or_else(|| CoreError::Integrity("Snapshot tree must be a JSON object".into()))?;
    match obj.get("questions") {
        Some(Value::Array(_)) => Ok(()),
        _ => Err(CoreError::Integrity(
            "Snapshot tree is missing its 'questions' array".into(),
        )),
    }
}

/// Decode a raw stored tree.
pub fn parse_tree(raw: &str) -> Result<Value, CoreError> {
    let tree: Value = serde_json::from_str(raw)
        .map_err(|e| CoreError::Integrity(format!("Snapshot tree is not valid JSON: {e}")))?;
    verify_tree(&tree)?;
    Ok(tree)
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// An immutable published version of a questionnaire.
///
/// There is no update path: a snapshot is written once and can only be
/// discarded while it is the most recent version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub questionnaire_id: DbId,
    pub version: Version,
    pub tree: Value,
    /// Changes against the previous version; empty for version 1.
    pub change_log: ChangeLog,
    pub created_at: Timestamp,
}

impl Snapshot {
    pub fn new(
        questionnaire_id: DbId,
        version: Version,
        tree: Value,
        change_log: ChangeLog,
        created_at: Timestamp,
    ) -> Self {
        Self {
            questionnaire_id,
            version,
            tree,
            change_log,
            created_at,
        }
    }

    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            questionnaire_id: self.questionnaire_id,
            version: self.version,
            changes: summarize(&self.change_log),
            created_at: self.created_at,
        }
    }
}

/// A history listing row without the tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotSummary {
    pub questionnaire_id: DbId,
    pub version: Version,
    pub changes: ChangeSummary,
    pub created_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
