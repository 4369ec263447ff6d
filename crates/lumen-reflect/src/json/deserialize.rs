//! JSON document → value graph

use super::{
    Shape, AFTER_DESERIALIZE, DATA_KEY, ELEMENTS_KEY, INSTANCE_ID_KEY, KEY_KEY, META_DATA_KEY,
    OBJECTS_KEY, TYPE_KEY, VALUE_KEY,
};
use crate::object::{ID_PTR_ATTRIBUTE, NO_INSTANCE, OBJECT_ID_FIELD};
use crate::types::{MemberKind, TypeRef, TypeRegistry, AT, PUSH_BACK, SET};
use crate::value::Dynamic;
use crate::{ReflectError, ReflectResult};
use rustc_hash::FxHashMap;
use serde_json::{Map, Number, Value};

pub(crate) struct Deserializer<'r> {
    registry: &'r TypeRegistry,
    max_depth: usize,
    /// Saved instance id → id to use in this process
    remap: FxHashMap<u64, u64>,
    /// Saved instance id → object already rebuilt
    restored: FxHashMap<u64, Dynamic>,
}

impl<'r> Deserializer<'r> {
    pub(crate) fn new(registry: &'r TypeRegistry) -> Self {
        Self {
            registry,
            max_depth: registry.config().max_depth,
            remap: FxHashMap::default(),
            restored: FxHashMap::default(),
        }
    }

    /// Load a full document; any structural failure fails the whole load
    pub(crate) fn document(mut self, document: &Value) -> ReflectResult<Dynamic> {
        self.load(document).map_err(|err| {
            tracing::error!(error = %err, "document could not be loaded");
            err
        })
    }

    fn load(&mut self, document: &Value) -> ReflectResult<Dynamic> {
        let mut data = document;
        if let Value::Object(root) = document {
            if let Some(payload) = root.get(DATA_KEY) {
                data = payload;
            }
            if let Some(ids) = root
                .get(META_DATA_KEY)
                .and_then(|meta| meta.get(OBJECTS_KEY))
            {
                self.build_remap(ids)?;
            }
        }

        self.node(data, 0)
    }

    /// Saved ids colliding with live objects get fresh ids; the rest are kept
    fn build_remap(&mut self, ids: &Value) -> ReflectResult<()> {
        let ids = ids
            .as_array()
            .ok_or_else(|| ReflectError::Malformed(format!("`{OBJECTS_KEY}` is not an array")))?;
        let identity = self.registry.identity();
        for id in ids {
            let saved = id
                .as_u64()
                .ok_or_else(|| ReflectError::Malformed(format!("invalid instance id `{id}`")))?;
            let assigned = if identity.contains(saved) {
                let fresh = identity.generate_id();
                tracing::debug!(saved, assigned = fresh, "instance id remapped");
                fresh
            } else {
                saved
            };
            self.remap.insert(saved, assigned);
        }
        Ok(())
    }

    fn node(&mut self, node: &Value, depth: usize) -> ReflectResult<Dynamic> {
        if depth > self.max_depth {
            return Err(ReflectError::DepthExceeded(self.max_depth));
        }
        match node {
            Value::Null => Ok(Dynamic::null()),
            Value::Bool(b) => Ok(self.registry.wrap(*b)),
            Value::Number(n) => Ok(self.number(n)),
            Value::String(s) => Ok(self.registry.wrap(s.clone())),
            Value::Array(_) => Err(ReflectError::Malformed(
                "bare array outside a container node".to_owned(),
            )),
            Value::Object(map) => self.object(map, depth),
        }
    }

    /// Integers become the narrowest of `i32`, `i64` and `u64`; the rest `f64`
    fn number(&self, number: &Number) -> Dynamic {
        if let Some(value) = number.as_i64() {
            return match i32::try_from(value) {
                Ok(small) => self.registry.wrap(small),
                Err(_) => self.registry.wrap(value),
            };
        }
        if let Some(value) = number.as_u64() {
            return self.registry.wrap(value);
        }
        self.registry.wrap(number.as_f64().unwrap_or_default())
    }

    fn object(&mut self, map: &Map<String, Value>, depth: usize) -> ReflectResult<Dynamic> {
        let type_name = map
            .get(TYPE_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| ReflectError::Malformed(format!("object node without `{TYPE_KEY}`")))?;
        let ty = self
            .registry
            .resolve(type_name)
            .ok_or_else(|| ReflectError::UnknownType(type_name.to_owned()))?;

        let saved_id = map.get(INSTANCE_ID_KEY).and_then(Value::as_u64);
        if let Some(existing) = saved_id.and_then(|id| self.restored.get(&id)) {
            return Ok(existing.clone());
        }

        let object = ty.new_instance();
        if object.is_null() {
            return Err(ReflectError::NoConstructor(type_name.to_owned()));
        }
        if let Some(saved) = saved_id {
            self.restore_identity(&object, saved);
        }

        let shape = Shape::of(&ty);
        if ty.field_count() == 0 && ty.property_count() == 0 && shape == Shape::Plain {
            if let Some(Value::String(text)) = map.get(VALUE_KEY) {
                if let Err(err) = object.set(&self.registry.wrap(text.clone())) {
                    tracing::warn!(type_name, error = %err, "scalar value not assigned");
                }
            }
        } else {
            self.members(&ty, &object, map, depth)?;
            if let Some(Value::Array(elements)) = map.get(ELEMENTS_KEY) {
                match shape {
                    Shape::Array => self.push_elements(&ty, &object, elements, depth)?,
                    Shape::Map => self.insert_entries(&object, elements, depth)?,
                    Shape::Plain => {}
                }
            }
        }

        if ty.has_attribute(ID_PTR_ATTRIBUTE) {
            self.remap_link(&object);
        }
        if let Some(hook) = ty.methods_by_tag(AFTER_DESERIALIZE).first() {
            if let Err(err) = hook.invoke(&object, &[]) {
                tracing::warn!(type_name, hook = hook.name(), error = %err, "post-load hook failed");
            }
        }
        Ok(object)
    }

    fn restore_identity(&mut self, object: &Dynamic, saved: u64) {
        let Some(handle) = object.object_ref() else {
            return;
        };
        match self.remap.get(&saved) {
            Some(&target) => {
                let assigned = self.registry.identity().rekey(&handle, target);
                self.remap.insert(saved, assigned);
            }
            None => tracing::warn!(
                saved,
                assigned = handle.instance_id(),
                "instance id missing from document metadata"
            ),
        }
        self.restored.insert(saved, object.clone());
    }

    fn members(
        &mut self,
        ty: &TypeRef,
        object: &Dynamic,
        map: &Map<String, Value>,
        depth: usize,
    ) -> ReflectResult<()> {
        for (key, value) in map {
            if value.is_array() || key == TYPE_KEY || key == INSTANCE_ID_KEY {
                continue;
            }
            let Some(member) = ty.member(key) else {
                tracing::trace!(type_name = ty.name(), member = %key, "unknown member skipped");
                continue;
            };
            if member.kind() == MemberKind::Method {
                continue;
            }
            if member.as_property().is_some_and(|p| !p.is_writable()) {
                tracing::trace!(type_name = ty.name(), member = %key, "read-only property skipped");
                continue;
            }
            let loaded = self.node(value, depth + 1)?;
            if let Err(err) = object.member_view(&member).set(&loaded) {
                tracing::warn!(type_name = ty.name(), member = %key, error = %err, "member not assigned");
            }
        }
        Ok(())
    }

    fn push_elements(
        &mut self,
        ty: &TypeRef,
        array: &Dynamic,
        elements: &[Value],
        depth: usize,
    ) -> ReflectResult<()> {
        let element_type = ty.member(AT).map(|at| at.value_type().clone());
        for element in elements {
            let mut loaded = self.node(element, depth + 1)?;
            if let Some(element_type) = &element_type {
                let converted = loaded.as_type(element_type);
                if !converted.is_null() {
                    loaded = converted;
                }
            }
            if let Err(err) = array.call(PUSH_BACK, &[loaded]) {
                tracing::warn!(type_name = ty.name(), error = %err, "element not added");
            }
        }
        Ok(())
    }

    fn insert_entries(
        &mut self,
        map: &Dynamic,
        entries: &[Value],
        depth: usize,
    ) -> ReflectResult<()> {
        for entry in entries {
            let (Some(key), Some(value)) = (entry.get(KEY_KEY), entry.get(VALUE_KEY)) else {
                continue;
            };
            let key = self.node(key, depth + 1)?;
            let value = self.node(value, depth + 1)?;
            if let Err(err) = map.call(SET, &[key, value]) {
                tracing::warn!(error = %err, "map entry not added");
            }
        }
        Ok(())
    }

    /// Id links follow their target through the remap table; links to
    /// objects absent from the document are cleared
    fn remap_link(&self, link: &Dynamic) {
        let field = link.member(OBJECT_ID_FIELD);
        let Ok(saved) = field.extract::<u64>() else {
            return;
        };
        let target = self.remap.get(&saved).copied().unwrap_or(NO_INSTANCE);
        if let Err(err) = field.set(&self.registry.wrap(target)) {
            tracing::warn!(error = %err, "id link not remapped");
        }
    }
}
