//! Legacy document migration
//!
//! Older documents stored container members as bare JSON arrays under a
//! legacy key. The current shape is a typed container node under the new
//! member name:
//!
//! ```text
//! "Childs": [a, b]   →   "children": { "Type": "Vec<Node2D>", "Elements": [a, b] }
//! ```
//!
//! The rewrite is purely structural and does not consult the registry.

use super::{ELEMENTS_KEY, TYPE_KEY};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One legacy member rewrite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRule {
    /// Member name holding a bare array in legacy documents
    pub legacy_key: String,
    /// Member name of the typed container in current documents
    pub field: String,
    /// Type tag written on the container node
    pub container_type: String,
}

impl MigrationRule {
    /// Create a rule
    pub fn new(legacy_key: &str, field: &str, container_type: &str) -> Self {
        Self {
            legacy_key: legacy_key.to_owned(),
            field: field.to_owned(),
            container_type: container_type.to_owned(),
        }
    }

    /// Rules for the scene and animation containers renamed in older
    /// document versions
    pub fn legacy_defaults() -> Vec<Self> {
        vec![
            Self::new("Childs", "children", "Vec<Node2D>"),
            Self::new("Layers", "layers", "Vec<AnimationLayer>"),
            Self::new("Channels", "channels", "Vec<AnimationChannel>"),
            Self::new("Keys", "keys", "Vec<AnimationKey>"),
        ]
    }

    fn apply(&self, node: &mut Map<String, Value>) -> bool {
        if !node.get(&self.legacy_key).is_some_and(Value::is_array) {
            return false;
        }
        let elements = node.remove(&self.legacy_key).unwrap_or_default();
        let mut container = Map::new();
        container.insert(TYPE_KEY.to_owned(), Value::String(self.container_type.clone()));
        container.insert(ELEMENTS_KEY.to_owned(), elements);
        node.insert(self.field.clone(), Value::Object(container));
        true
    }
}

/// Applies migration rules to whole documents
#[derive(Debug, Clone, Default)]
pub struct SchemaMigrator {
    rules: Vec<MigrationRule>,
}

impl SchemaMigrator {
    /// Migrator applying `rules`
    pub fn new(rules: Vec<MigrationRule>) -> Self {
        Self { rules }
    }

    /// Rewrite `document` in place; returns whether anything changed
    pub fn migrate(&self, document: &mut Value) -> bool {
        let mut migrated = false;
        self.migrate_node(document, &mut migrated);
        migrated
    }

    fn migrate_node(&self, node: &mut Value, migrated: &mut bool) {
        match node {
            Value::Object(map) => {
                for rule in &self.rules {
                    if rule.apply(map) {
                        tracing::debug!(legacy_key = %rule.legacy_key, field = %rule.field, "legacy member migrated");
                        *migrated = true;
                    }
                }
                for child in map.values_mut() {
                    self.migrate_node(child, migrated);
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.migrate_node(item, migrated);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wraps_legacy_array() {
        let migrator = SchemaMigrator::new(MigrationRule::legacy_defaults());
        let mut document = json!({
            "Type": "Node2D",
            "Name": "root",
            "Childs": [{ "Type": "Node2D", "Name": "leaf" }]
        });
        assert!(migrator.migrate(&mut document));
        assert!(document.get("Childs").is_none());
        assert_eq!(
            document["children"],
            json!({
                "Type": "Vec<Node2D>",
                "Elements": [{ "Type": "Node2D", "Name": "leaf" }]
            })
        );
    }

    #[test]
    fn test_recurses_into_migrated_elements() {
        let migrator = SchemaMigrator::new(MigrationRule::legacy_defaults());
        let mut document = json!({
            "Childs": [{ "Childs": [{ "Layers": [] }] }]
        });
        assert!(migrator.migrate(&mut document));
        let inner = &document["children"]["Elements"][0]["children"]["Elements"][0];
        assert_eq!(inner["layers"]["Type"], "Vec<AnimationLayer>");
        assert_eq!(inner["layers"]["Elements"], json!([]));
    }

    #[test]
    fn test_non_array_values_untouched() {
        let migrator = SchemaMigrator::new(MigrationRule::legacy_defaults());
        let mut document = json!({ "Keys": { "Type": "Vec<AnimationKey>" }, "x": 1 });
        let before = document.clone();
        assert!(!migrator.migrate(&mut document));
        assert_eq!(document, before);
    }

    #[test]
    fn test_custom_rule() {
        let migrator = SchemaMigrator::new(vec![MigrationRule::new("Items", "items", "Vec<Any>")]);
        let mut document = json!({ "Items": [1, 2] });
        assert!(migrator.migrate(&mut document));
        assert_eq!(document, json!({ "items": { "Type": "Vec<Any>", "Elements": [1, 2] } }));
    }
}
