//! String-keyed bag of dynamic values

use crate::types::{Reflect, TypeBuilder};
use crate::value::{Data, Dynamic};
use std::collections::BTreeMap;

/// Managed object whose fields are added at run time
#[derive(Debug, Clone, Default)]
pub struct DynamicObject {
    fields: BTreeMap<String, Dynamic>,
}

impl DynamicObject {
    /// Create an empty object
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field; a null value removes it
    ///
    /// An existing entry keeps its type: the value is converted and written
    /// into it. Values that cannot be converted replace the entry.
    pub fn set_field(&mut self, name: &str, value: Dynamic) {
        let value = value.unboxed();
        if value.is_null() {
            self.fields.remove(name);
            return;
        }
        if let Some(existing) = self.fields.get(name).filter(|e| !e.is_null()) {
            match existing.set(&value) {
                Ok(()) => return,
                Err(err) => tracing::debug!(field = name, error = %err, "field replaced"),
            }
        }
        self.fields.insert(name.to_owned(), value);
    }

    /// Field value, or null if absent
    pub fn get_field(&self, name: &str) -> Dynamic {
        self.fields.get(name).cloned().unwrap_or_default()
    }

    /// Check if a field is present
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Number of fields
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Check if there are no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field names in sorted order
    pub fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }
}

impl Data for DynamicObject {}

impl Reflect for DynamicObject {
    const TYPE_NAME: &'static str = "DynamicObject";
    const MANAGED: bool = true;

    fn reflect(builder: &mut TypeBuilder<'_, Self>) {
        builder.default_constructor();
        builder.field("Fields", |o| &mut o.fields).attr("Hidden");
        builder.method("SetField", |o: &mut DynamicObject, name: String, value: Dynamic| {
            o.set_field(&name, value)
        });
        builder.const_method("GetField", |o: &DynamicObject, name: String| o.get_field(&name));
        builder.const_method("HasField", |o: &DynamicObject, name: String| o.has_field(&name));
        builder.const_method("GetFieldsCount", |o: &DynamicObject| o.field_count() as i32);
        builder.const_method("Empty", DynamicObject::is_empty);
        builder.const_method("GetFieldNames", DynamicObject::field_names);
    }
}
