//! Snapshot diffing
//!
//! Compares two documents and splits the difference into the members that
//! were added or changed and the members that disappeared. The two passes
//! share nothing and run on separate threads.

use serde_json::{Map, Value};

/// Difference between two snapshots of the same document
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotDiff {
    /// Changed leaves of the current snapshot, at their original paths
    pub modified: Value,
    /// Paths missing from the current snapshot, each set to `0`
    pub deleted: Value,
}

impl SnapshotDiff {
    /// Whether the snapshots are identical
    pub fn is_empty(&self) -> bool {
        is_empty_object(&self.modified) && is_empty_object(&self.deleted)
    }
}

/// Diff `previous` against `current`
///
/// Leaves are scalars and arrays; arrays are compared as a whole.
pub fn diff(previous: &Value, current: &Value) -> SnapshotDiff {
    let (modified, deleted) = crossbeam::thread::scope(|scope| {
        let modified = scope.spawn(|_| modifications(previous, current));
        let deleted = scope.spawn(|_| deletions(previous, current));
        (join(modified.join()), join(deleted.join()))
    })
    .unwrap_or_else(|panic| std::panic::resume_unwind(panic));

    tracing::trace!(
        modified = count_leaves(&modified),
        deleted = count_leaves(&deleted),
        "snapshot diffed"
    );
    SnapshotDiff { modified, deleted }
}

fn join<T>(result: std::thread::Result<T>) -> T {
    result.unwrap_or_else(|panic| std::panic::resume_unwind(panic))
}

fn modifications(previous: &Value, current: &Value) -> Value {
    match current {
        Value::Object(current) => {
            Value::Object(changed_members(previous.as_object(), current))
        }
        leaf if leaf != previous => leaf.clone(),
        _ => Value::Object(Map::new()),
    }
}

fn changed_members(previous: Option<&Map<String, Value>>, current: &Map<String, Value>) -> Map<String, Value> {
    let mut changed = Map::new();
    for (key, value) in current {
        let before = previous.and_then(|p| p.get(key));
        match value {
            Value::Object(members) if members.is_empty() => {
                if before.is_none() {
                    changed.insert(key.clone(), Value::Object(Map::new()));
                }
            }
            Value::Object(members) => {
                let nested = changed_members(before.and_then(Value::as_object), members);
                if !nested.is_empty() {
                    changed.insert(key.clone(), Value::Object(nested));
                }
            }
            leaf => {
                if before != Some(leaf) {
                    changed.insert(key.clone(), leaf.clone());
                }
            }
        }
    }
    changed
}

fn deletions(previous: &Value, current: &Value) -> Value {
    match previous {
        Value::Object(previous) => Value::Object(missing_members(previous, current.as_object())),
        _ => Value::Object(Map::new()),
    }
}

fn missing_members(previous: &Map<String, Value>, current: Option<&Map<String, Value>>) -> Map<String, Value> {
    let mut missing = Map::new();
    for (key, value) in previous {
        match current.and_then(|c| c.get(key)) {
            None => {
                missing.insert(key.clone(), Value::from(0));
            }
            Some(after) => {
                if let Value::Object(members) = value {
                    let nested = missing_members(members, after.as_object());
                    if !nested.is_empty() {
                        missing.insert(key.clone(), Value::Object(nested));
                    }
                }
            }
        }
    }
    missing
}

fn is_empty_object(value: &Value) -> bool {
    value.as_object().is_some_and(Map::is_empty)
}

fn count_leaves(value: &Value) -> usize {
    match value {
        Value::Object(members) if !members.is_empty() => members.values().map(count_leaves).sum(),
        Value::Object(_) => 0,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identical_snapshots() {
        let snapshot = json!({ "Data": { "Type": "Point", "x": 1 } });
        assert!(diff(&snapshot, &snapshot).is_empty());
    }

    #[test]
    fn test_changed_and_added_leaves() {
        let previous = json!({ "Data": { "x": 1, "y": 2, "tags": [1] } });
        let current = json!({ "Data": { "x": 1, "y": 3, "z": 4, "tags": [1, 2] } });
        let result = diff(&previous, &current);
        assert_eq!(
            result.modified,
            json!({ "Data": { "y": 3, "z": 4, "tags": [1, 2] } })
        );
        assert_eq!(result.deleted, json!({}));
    }

    #[test]
    fn test_deleted_paths_are_zeroed() {
        let previous = json!({ "a": { "b": { "c": 1 }, "d": 2 }, "e": 3 });
        let current = json!({ "a": { "d": 2 } });
        let result = diff(&previous, &current);
        assert_eq!(result.deleted, json!({ "a": { "b": 0 }, "e": 0 }));
        assert_eq!(result.modified, json!({}));
    }

    #[test]
    fn test_new_empty_object() {
        let previous = json!({ "a": {} });
        let current = json!({ "a": {}, "b": {} });
        assert_eq!(diff(&previous, &current).modified, json!({ "b": {} }));
    }

    #[test]
    fn test_leaf_replaced_by_object() {
        let previous = json!({ "a": 1 });
        let current = json!({ "a": { "b": 2 } });
        let result = diff(&previous, &current);
        assert_eq!(result.modified, json!({ "a": { "b": 2 } }));
        assert_eq!(result.deleted, json!({}));
    }
}
