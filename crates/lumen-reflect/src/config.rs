//! Runtime configuration
//!
//! Limits and persistence options for a [`TypeRegistry`](crate::TypeRegistry).
//! Configuration is plain data and can be loaded from TOML:
//!
//! ```toml
//! boxed_value_capacity = 16384
//! max_depth = 100
//! float_precision = 5
//! migrate_legacy_documents = true
//!
//! [[migrations]]
//! legacy_key = "Childs"
//! field = "children"
//! container_type = "Vec<Node>"
//! ```

use crate::json::MigrationRule;
use crate::{ReflectError, ReflectResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of boxed values that may be live at once
pub const DEFAULT_BOXED_VALUE_CAPACITY: usize = 16384;

/// Default nesting limit for serialization and deserialization
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Default number of decimal places kept when writing floats
pub const DEFAULT_FLOAT_PRECISION: u32 = 5;

/// Registry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectConfig {
    /// Maximum number of live boxed values; exceeding it aborts the process
    pub boxed_value_capacity: usize,

    /// Maximum object nesting accepted by the serializer and deserializer
    pub max_depth: usize,

    /// Decimal places kept for floating-point values in documents
    pub float_precision: u32,

    /// Rewrite legacy bare-array members before loading a document
    pub migrate_legacy_documents: bool,

    /// Legacy member rewrite rules
    pub migrations: Vec<MigrationRule>,
}

impl Default for ReflectConfig {
    fn default() -> Self {
        Self {
            boxed_value_capacity: DEFAULT_BOXED_VALUE_CAPACITY,
            max_depth: DEFAULT_MAX_DEPTH,
            float_precision: DEFAULT_FLOAT_PRECISION,
            migrate_legacy_documents: true,
            migrations: MigrationRule::legacy_defaults(),
        }
    }
}

impl ReflectConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(source: &str) -> ReflectResult<Self> {
        toml::from_str(source).map_err(|e| ReflectError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> ReflectResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| ReflectError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ReflectConfig::default();
        assert_eq!(config.boxed_value_capacity, 16384);
        assert_eq!(config.max_depth, 100);
        assert_eq!(config.float_precision, 5);
        assert!(config.migrate_legacy_documents);
        assert_eq!(config.migrations.len(), 4);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ReflectConfig::from_toml_str("float_precision = 2\n").unwrap();
        assert_eq!(config.float_precision, 2);
        assert_eq!(config.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(config.migrations, MigrationRule::legacy_defaults());
    }

    #[test]
    fn test_migrations_from_toml() {
        let source = r#"
            migrate_legacy_documents = false

            [[migrations]]
            legacy_key = "Items"
            field = "items"
            container_type = "Vec<Item>"
        "#;
        let config = ReflectConfig::from_toml_str(source).unwrap();
        assert!(!config.migrate_legacy_documents);
        assert_eq!(config.migrations.len(), 1);
        assert_eq!(config.migrations[0].legacy_key, "Items");
        assert_eq!(config.migrations[0].container_type, "Vec<Item>");
    }

    #[test]
    fn test_invalid_toml() {
        let result = ReflectConfig::from_toml_str("max_depth = \"deep\"");
        assert!(matches!(result, Err(ReflectError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "boxed_value_capacity = 128").unwrap();
        let config = ReflectConfig::load(file.path()).unwrap();
        assert_eq!(config.boxed_value_capacity, 128);
    }

    #[test]
    fn test_load_missing_file() {
        let result = ReflectConfig::load("/nonexistent/lumen.toml");
        assert!(matches!(result, Err(ReflectError::Config(_))));
    }
}
