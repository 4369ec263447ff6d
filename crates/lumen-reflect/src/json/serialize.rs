//! Value graph → JSON document

use super::{
    Shape, DATA_KEY, ELEMENTS_KEY, INSTANCE_ID_KEY, KEY_KEY, META_DATA_KEY, NOT_OWNER,
    OBJECTS_KEY, SERIALIZE_IF_OWNER, TYPE_KEY, VALUE_KEY,
};
use crate::object::NO_INSTANCE;
use crate::types::{ClassMember, TypeDescriptor, TypeRegistry, AT, RANGE, SIZE};
use crate::value::Dynamic;
use crate::{ReflectError, ReflectResult};
use serde_json::{Map, Number, Value};
use std::collections::BTreeSet;
use std::rc::Rc;

pub(crate) struct Serializer<'r> {
    registry: &'r TypeRegistry,
    max_depth: usize,
    scale: f64,
    objects: BTreeSet<u64>,
}

impl<'r> Serializer<'r> {
    pub(crate) fn new(registry: &'r TypeRegistry) -> Self {
        let config = registry.config();
        Self {
            registry,
            max_depth: config.max_depth,
            scale: 10f64.powi(config.float_precision.min(15) as i32),
            objects: BTreeSet::new(),
        }
    }

    /// Write the full document: data node plus the object id table
    pub(crate) fn document(mut self, value: &Dynamic) -> ReflectResult<Value> {
        let data = self.node(value, None, 0)?;
        let objects = self.objects.iter().map(|&id| Value::from(id)).collect();

        let mut meta = Map::new();
        meta.insert(OBJECTS_KEY.to_owned(), Value::Array(objects));
        let mut document = Map::new();
        document.insert(DATA_KEY.to_owned(), data);
        document.insert(META_DATA_KEY.to_owned(), Value::Object(meta));
        Ok(Value::Object(document))
    }

    fn node(
        &mut self,
        value: &Dynamic,
        container: Option<&ClassMember>,
        depth: usize,
    ) -> ReflectResult<Value> {
        if depth > self.max_depth {
            return Err(ReflectError::DepthExceeded(self.max_depth));
        }
        let value = value.get()?;
        let Some(ty) = value.descriptor() else {
            return Ok(Value::Null);
        };
        if let Some(leaf) = self.primitive(&value, &ty)? {
            return Ok(leaf);
        }

        let mut node = Map::new();
        node.insert(TYPE_KEY.to_owned(), Value::String(ty.name().to_owned()));
        if let Some(id) = value.instance_id().filter(|&id| id != NO_INSTANCE) {
            self.objects.insert(id);
            node.insert(INSTANCE_ID_KEY.to_owned(), Value::from(id));
        }

        let fields = ty.fields();
        let properties = ty.properties();
        let shape = Shape::of(&ty);
        if fields.is_empty() && properties.is_empty() && shape == Shape::Plain {
            let text = self.scalar_text(&value);
            if !text.is_empty() {
                node.insert(VALUE_KEY.to_owned(), Value::String(text));
            }
            return Ok(Value::Object(node));
        }

        let owned = |member: &Rc<ClassMember>| {
            !(member.has_attribute(SERIALIZE_IF_OWNER)
                && container.is_some_and(|c| c.has_attribute(NOT_OWNER)))
        };
        for field in fields.iter().filter(|m| owned(m)) {
            let child = self.node(&value.member_view(field), Some(field.as_ref()), depth + 1)?;
            node.insert(field.name().to_owned(), child);
        }
        for property in properties.iter().filter(|m| owned(m)) {
            if !property.as_property().is_some_and(|p| p.is_readable()) {
                continue;
            }
            let child = self.node(&value.member_view(property), Some(property.as_ref()), depth + 1)?;
            node.insert(property.name().to_owned(), child);
        }

        let elements = match shape {
            Shape::Array => self.array_elements(&value, depth)?,
            Shape::Map => self.map_elements(&value, depth)?,
            Shape::Plain => Vec::new(),
        };
        if !elements.is_empty() {
            node.insert(ELEMENTS_KEY.to_owned(), Value::Array(elements));
        }
        Ok(Value::Object(node))
    }

    fn array_elements(&mut self, array: &Dynamic, depth: usize) -> ReflectResult<Vec<Value>> {
        let size = array.call(SIZE, &[])?.extract::<i32>()?;
        let mut elements = Vec::with_capacity(size.max(0) as usize);
        for index in 0..size {
            let element = array.call(AT, &[self.registry.wrap(index)])?;
            elements.push(self.node(&element, None, depth + 1)?);
        }
        Ok(elements)
    }

    fn map_elements(&mut self, map: &Dynamic, depth: usize) -> ReflectResult<Vec<Value>> {
        let keys = map.call(RANGE, &[])?;
        let count = keys.call(SIZE, &[])?.extract::<i32>()?;
        let mut elements = Vec::with_capacity(count.max(0) as usize);
        for index in 0..count {
            let key = keys.call(AT, &[self.registry.wrap(index)])?;
            let value = map.call(AT, std::slice::from_ref(&key))?;
            let mut entry = Map::new();
            entry.insert(KEY_KEY.to_owned(), self.node(&key, None, depth + 1)?);
            entry.insert(VALUE_KEY.to_owned(), self.node(&value, None, depth + 1)?);
            elements.push(Value::Object(entry));
        }
        Ok(elements)
    }

    /// Memberless types are written through their `String` conversion
    fn scalar_text(&self, value: &Dynamic) -> String {
        let string = self.registry.descriptor_of::<String>();
        value
            .as_type(&string)
            .try_extract::<String>()
            .unwrap_or_default()
    }

    fn float(&self, value: f64) -> Value {
        let rounded = (value * self.scale).round() / self.scale;
        let rounded = if rounded.is_finite() { rounded } else { value };
        Number::from_f64(rounded).map_or(Value::Null, Value::Number)
    }

    fn primitive(&self, value: &Dynamic, ty: &TypeDescriptor) -> ReflectResult<Option<Value>> {
        macro_rules! leaf {
            ($($t:ty => $convert:expr),* $(,)?) => {
                $(
                    if ty.is::<$t>() {
                        let native = value.with_ref(|v: &$t| v.clone())?;
                        return Ok(Some(($convert)(native)));
                    }
                )*
            };
        }
        leaf! {
            bool => Value::Bool,
            i8 => Value::from,
            i16 => Value::from,
            i32 => Value::from,
            i64 => Value::from,
            u8 => Value::from,
            u16 => Value::from,
            u32 => Value::from,
            u64 => Value::from,
            usize => |v: usize| Value::from(v as u64),
            f32 => |v: f32| self.float(f64::from(v)),
            f64 => |v: f64| self.float(v),
            String => Value::String,
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReflectConfig;
    use crate::types::{Reflect, TypeBuilder};
    use crate::value::Data;
    use serde_json::json;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Sample {
        count: u16,
        ratio: f32,
        name: String,
        flags: Vec<bool>,
    }

    impl Data for Sample {}

    impl Reflect for Sample {
        const TYPE_NAME: &'static str = "Sample";

        fn reflect(builder: &mut TypeBuilder<'_, Self>) {
            builder.default_constructor();
            builder.field("count", |s| &mut s.count);
            builder.field("ratio", |s| &mut s.ratio);
            builder.field("name", |s| &mut s.name);
            builder.field("flags", |s| &mut s.flags);
        }
    }

    fn registry() -> TypeRegistry {
        let registry = TypeRegistry::new();
        registry.register::<Sample>();
        registry.reflect_all();
        registry
    }

    #[test]
    fn test_primitive_leaves_and_rounding() {
        let registry = registry();
        let value = registry.wrap(Sample {
            count: 7,
            ratio: 0.1,
            name: "probe".to_owned(),
            flags: vec![true, false],
        });
        let document = registry.to_json_value(&value).unwrap();
        assert_eq!(
            document,
            json!({
                "Data": {
                    "Type": "Sample",
                    "count": 7,
                    "ratio": 0.1,
                    "name": "probe",
                    "flags": { "Type": "Vec<bool>", "Elements": [true, false] }
                },
                "MetaData": { "Objects": [] }
            })
        );
    }

    #[test]
    fn test_null_document() {
        let registry = registry();
        assert_eq!(registry.to_json(&Dynamic::null()).unwrap(), "");
        let document = registry.to_json_value(&Dynamic::null()).unwrap();
        assert_eq!(document["Data"], Value::Null);
    }

    #[test]
    fn test_float_precision_from_config() {
        let registry = TypeRegistry::with_config(ReflectConfig {
            float_precision: 2,
            ..ReflectConfig::default()
        });
        let document = registry.to_json_value(&registry.wrap(1.23456f64)).unwrap();
        assert_eq!(document["Data"], json!(1.23));
    }

    #[test]
    fn test_depth_limit() {
        let registry = TypeRegistry::with_config(ReflectConfig {
            max_depth: 1,
            ..ReflectConfig::default()
        });
        let nested = registry.wrap(vec![vec![1i32]]);
        assert!(matches!(
            registry.to_json_value(&nested),
            Err(ReflectError::DepthExceeded(1))
        ));
    }
}
