//! Path-addressed structural diff of snapshot trees.
//!
//! Works on generic `serde_json::Value` trees so it is agnostic to the
//! questionnaire shape. Every entry describes a single leaf; object and array
//! differences are expressed as the union of their leaf entries.
//!
//! Paths start at [`ROOT_PATH`] and are extended with `.key` for identifier
//! keys, `["key"]` for any other key, and `[i]` for array indices, e.g.
//! `$.questions[0].answers[1].content`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Path of the tree root.
pub const ROOT_PATH: &str = "$";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How a leaf changed between the old and new tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Present only in the new tree.
    Added,
    /// Present only in the old tree.
    Removed,
    /// Present in both with different values.
    Modified,
}

impl ChangeKind {
    /// String representation for display, logging, and database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Modified => "modified",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single leaf-level difference.
///
/// An absent side is omitted from the serialized entry, so a JSON `null`
/// leaf (`Some(Value::Null)`) survives storage distinct from "no value".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub path: String,
    pub kind: ChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub old_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub new_value: Option<Value>,
}

/// A field that is present is a value, even when that value is `null`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Ordered list of changes between two trees.
pub type ChangeLog = Vec<ChangeEntry>;

/// Per-kind counts of a change log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
}

impl ChangeSummary {
    pub fn total(&self) -> usize {
        self.added + self.removed + self.modified
    }
}

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

/// Diff two trees. `None` stands for "no tree" (no predecessor, or fully
/// removed).
///
/// Entries come out depth-first with object keys in encounter order (old
/// tree's keys first, then keys only the new tree has). Identical inputs
/// always produce identical output.
pub fn diff(old: Option<&Value>, new: Option<&Value>) -> ChangeLog {
    let mut log = Vec::new();
    let mut path = String::from(ROOT_PATH);
    walk(&mut path, old, new, &mut log);
    log
}

fn walk(path: &mut String, old: Option<&Value>, new: Option<&Value>, log: &mut ChangeLog) {
    match (old, new) {
        (None, None) => {}
        (None, Some(b)) => mark_all(path, b, ChangeKind::Added, log),
        (Some(a), None) => mark_all(path, a, ChangeKind::Removed, log),
        (Some(Value::Array(a)), Some(Value::Array(b))) => {
            for i in 0..a.len().max(b.len()) {
                let len = path.len();
                push_index(path, i);
                walk(path, a.get(i), b.get(i), log);
                path.truncate(len);
            }
        }
        (Some(Value::Object(a)), Some(Value::Object(b))) => {
            let keys = a.keys().chain(b.keys().filter(|k| !a.contains_key(*k)));
            for key in keys {
                let len = path.len();
                push_key(path, key);
                walk(path, a.get(key), b.get(key), log);
                path.truncate(len);
            }
        }
        (Some(a), Some(b)) => {
            // Scalars compare by serialized form so `1` and `1.0` differ;
            // mismatched node kinds always land here as well.
            if is_container(a) || is_container(b) || a.to_string() != b.to_string() {
                log.push(ChangeEntry {
                    path: path.clone(),
                    kind: ChangeKind::Modified,
                    old_value: Some(a.clone()),
                    new_value: Some(b.clone()),
                });
            }
        }
    }
}

/// Emit one entry per leaf under `value`. Empty containers count as leaves.
fn mark_all(path: &mut String, value: &Value, kind: ChangeKind, log: &mut ChangeLog) {
    match value {
        Value::Array(items) if !items.is_empty() => {
            for (i, item) in items.iter().enumerate() {
                let len = path.len();
                push_index(path, i);
                mark_all(path, item, kind, log);
                path.truncate(len);
            }
        }
        Value::Object(map) if !map.is_empty() => {
            for (key, item) in map {
                let len = path.len();
                push_key(path, key);
                mark_all(path, item, kind, log);
                path.truncate(len);
            }
        }
        leaf => {
            let (old_value, new_value) = match kind {
                ChangeKind::Added => (None, Some(leaf.clone())),
                _ => (Some(leaf.clone()), None),
            };
            log.push(ChangeEntry {
                path: path.clone(),
                kind,
                old_value,
                new_value,
            });
        }
    }
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::Object(_))
}

fn push_index(path: &mut String, index: usize) {
    path.push('[');
    path.push_str(&index.to_string());
    path.push(']');
}

fn push_key(path: &mut String, key: &str) {
    if is_identifier(key) {
        path.push('.');
        path.push_str(key);
    } else {
        path.push('[');
        path.push_str(&Value::String(key.to_string()).to_string());
        path.push(']');
    }
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ---------------------------------------------------------------------------
// Helpers over change logs
// ---------------------------------------------------------------------------

/// Count entries per kind.
pub fn summarize(log: &[ChangeEntry]) -> ChangeSummary {
    log.iter().fold(ChangeSummary::default(), |mut acc, entry| {
        match entry.kind {
            ChangeKind::Added => acc.added += 1,
            ChangeKind::Removed => acc.removed += 1,
            ChangeKind::Modified => acc.modified += 1,
        }
        acc
    })
}

/// The log of the reverse comparison: Added and Removed swap, and old/new
/// values swap on every entry.
pub fn invert(log: &[ChangeEntry]) -> ChangeLog {
    log.iter()
        .map(|entry| ChangeEntry {
            path: entry.path.clone(),
            kind: match entry.kind {
                ChangeKind::Added => ChangeKind::Removed,
                ChangeKind::Removed => ChangeKind::Added,
                ChangeKind::Modified => ChangeKind::Modified,
            },
            old_value: entry.new_value.clone(),
            new_value: entry.old_value.clone(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
