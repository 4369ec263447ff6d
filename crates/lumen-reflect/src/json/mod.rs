//! JSON object-graph persistence
//!
//! Documents have the shape
//!
//! ```text
//! { "Data": <node>, "MetaData": { "Objects": [<instance id>, ...] } }
//! ```
//!
//! Primitive values are written as JSON scalars. Every other value becomes
//! an object node tagged with its type name:
//!
//! ```text
//! { "Type": "Sprite", "InstanceId": 42, "position": {...}, "Elements": [...] }
//! ```
//!
//! `MetaData.Objects` lists every managed object written, so a loader can
//! remap ids that collide with objects already alive.

mod deserialize;
mod diff;
mod migrate;
mod serialize;

pub use diff::{diff, SnapshotDiff};
pub use migrate::{MigrationRule, SchemaMigrator};

use crate::types::{TypeDescriptor, TypeRegistry, AT, PUSH_BACK, RANGE, SET, SIZE};
use crate::value::Dynamic;
use crate::ReflectResult;
use serde_json::Value;

/// Top-level payload member
pub const DATA_KEY: &str = "Data";
/// Top-level metadata member
pub const META_DATA_KEY: &str = "MetaData";
/// Instance ids present in the document
pub const OBJECTS_KEY: &str = "Objects";
/// Type tag of an object node
pub const TYPE_KEY: &str = "Type";
/// Scalar payload of a memberless type
pub const VALUE_KEY: &str = "Value";
/// Container elements
pub const ELEMENTS_KEY: &str = "Elements";
/// Instance id of a managed object
pub const INSTANCE_ID_KEY: &str = "InstanceId";
/// Key of a map element
pub const KEY_KEY: &str = "Key";

/// Member attribute: skip this member when the containing member is not
/// its owner
pub const SERIALIZE_IF_OWNER: &str = "SerializeIfOwner";
/// Member attribute: the member holds a non-owning reference
pub const NOT_OWNER: &str = "NotOwner";
/// Method attribute: invoked once after an object is loaded
pub const AFTER_DESERIALIZE: &str = "AfterDeserialize";

impl TypeRegistry {
    /// Serialize a value graph into a document
    pub fn to_json_value(&self, value: &Dynamic) -> ReflectResult<Value> {
        serialize::Serializer::new(self).document(value)
    }

    /// Serialize a value graph into compact JSON text
    ///
    /// A null value produces an empty string.
    pub fn to_json(&self, value: &Dynamic) -> ReflectResult<String> {
        if value.is_null() {
            return Ok(String::new());
        }
        Ok(serde_json::to_string(&self.to_json_value(value)?)?)
    }

    /// Serialize a value graph into indented JSON text
    pub fn to_json_pretty(&self, value: &Dynamic) -> ReflectResult<String> {
        if value.is_null() {
            return Ok(String::new());
        }
        Ok(serde_json::to_string_pretty(&self.to_json_value(value)?)?)
    }

    /// Rebuild a value graph from a parsed document
    ///
    /// Legacy members are migrated first when enabled in the configuration.
    pub fn from_json_value(&self, mut document: Value) -> ReflectResult<Dynamic> {
        if self.config().migrate_legacy_documents {
            SchemaMigrator::new(self.config().migrations.clone()).migrate(&mut document);
        }
        deserialize::Deserializer::new(self).document(&document)
    }

    /// Rebuild a value graph from JSON text
    pub fn from_json(&self, text: &str) -> ReflectResult<Dynamic> {
        let document = serde_json::from_str(text).map_err(|err| {
            tracing::error!(error = %err, "document is not valid JSON");
            err
        })?;
        self.from_json_value(document)
    }
}

/// Container shape detected from a type's members
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    /// `PushBack`, `At` and `Size`
    Array,
    /// `Range`, `At`, `Size` and `Set`
    Map,
    Plain,
}

impl Shape {
    fn of(ty: &TypeDescriptor) -> Self {
        let has = |name: &str| ty.has_method(name);
        if has(PUSH_BACK) && has(AT) && has(SIZE) {
            Shape::Array
        } else if has(RANGE) && has(AT) && has(SIZE) && has(SET) {
            Shape::Map
        } else {
            Shape::Plain
        }
    }
}
