//! Standard types installed into every registry
//!
//! Primitives, `Any`, `void`, the generic array and map shapes used by the
//! persistence layer, identity links and dynamic objects.

use super::{TypeBuilder, TypeRef, TypeRegistry};
use crate::dynamic_object::DynamicObject;
use crate::object::IdLink;
use crate::value::{Data, Dynamic};
use std::collections::BTreeMap;

/// Name of the type accepted by and convertible to every type
pub const ANY_TYPE_NAME: &str = "Any";

/// Name of the unit return type
pub const VOID_TYPE_NAME: &str = "void";

/// Name of static conversion functions
pub const CONVERSION_NAME: &str = "(cast)";

/// Array shape members
pub(crate) const PUSH_BACK: &str = "PushBack";
pub(crate) const AT: &str = "At";
pub(crate) const SIZE: &str = "Size";

/// Map shape members (besides `At` and `Size`)
pub(crate) const RANGE: &str = "Range";
pub(crate) const SET: &str = "Set";

macro_rules! casts {
    ($builder:ident, $from:ty => $($to:ty),+) => {
        $( $builder.conversion(|v: $from| v as $to); )+
    };
}

/// Integer conversions; out-of-range values convert to null
macro_rules! checked_casts {
    ($builder:ident, $from:ty => $($to:ty),+) => {
        $( $builder.conversion(|v: $from| <$to>::try_from(v).ok()); )+
    };
}

pub(crate) fn install(registry: &TypeRegistry) {
    registry.register_with::<(), _>(VOID_TYPE_NAME, |_| {});
    registry.register_with::<Dynamic, _>(ANY_TYPE_NAME, |_| {});

    registry.register_with::<bool, _>("bool", |b| {
        b.default_constructor();
    });
    registry.register_with::<i8, _>("i8", |b| {
        b.default_constructor();
        checked_casts!(b, i8 => i32, i64);
    });
    registry.register_with::<i16, _>("i16", |b| {
        b.default_constructor();
        checked_casts!(b, i16 => i32, i64);
    });
    registry.register_with::<i32, _>("i32", |b| {
        b.default_constructor();
        checked_casts!(b, i32 => i8, i16, i64, u8, u16, u32, u64, usize);
        casts!(b, i32 => f32, f64);
    });
    registry.register_with::<i64, _>("i64", |b| {
        b.default_constructor();
        checked_casts!(b, i64 => i8, i16, i32, u8, u16, u32, u64, usize);
        casts!(b, i64 => f32, f64);
    });
    registry.register_with::<u8, _>("u8", |b| {
        b.default_constructor();
        checked_casts!(b, u8 => i32, i64);
    });
    registry.register_with::<u16, _>("u16", |b| {
        b.default_constructor();
        checked_casts!(b, u16 => i32, i64);
    });
    registry.register_with::<u32, _>("u32", |b| {
        b.default_constructor();
        checked_casts!(b, u32 => i64, u64);
    });
    registry.register_with::<u64, _>("u64", |b| {
        b.default_constructor();
        checked_casts!(b, u64 => i32, i64, u32, usize);
        casts!(b, u64 => f64);
    });
    registry.register_with::<usize, _>("usize", |b| {
        b.default_constructor();
        checked_casts!(b, usize => i64, u64);
    });
    registry.register_with::<f32, _>("f32", |b| {
        b.default_constructor();
        casts!(b, f32 => f64);
    });
    registry.register_with::<f64, _>("f64", |b| {
        b.default_constructor();
        casts!(b, f64 => f32);
    });
    registry.register_with::<String, _>("String", |b| {
        b.default_constructor();
    });

    registry.register_array::<Dynamic>("Vec<Any>");
    registry.register_map::<String, Dynamic>("StringAnyMap");
    registry.register::<IdLink>();
    registry.register::<DynamicObject>();
}

fn reflect_array<T: Data>(b: &mut TypeBuilder<'_, Vec<T>>) {
    b.default_constructor();
    b.copy_constructor();
    b.method(PUSH_BACK, |v: &mut Vec<T>, item: T| v.push(item));
    b.const_method(AT, |v: &Vec<T>, index: i32| {
        usize::try_from(index).ok().and_then(|i| v.get(i)).cloned()
    });
    b.const_method(SIZE, |v: &Vec<T>| v.len() as i32);
}

fn reflect_map<K: Data + Ord, V: Data>(b: &mut TypeBuilder<'_, BTreeMap<K, V>>) {
    b.default_constructor();
    b.copy_constructor();
    b.const_method(RANGE, |m: &BTreeMap<K, V>| m.keys().cloned().collect::<Vec<K>>());
    b.const_method(AT, |m: &BTreeMap<K, V>, key: K| m.get(&key).cloned());
    b.method(SET, |m: &mut BTreeMap<K, V>, key: K, value: V| {
        m.insert(key, value);
    });
    b.const_method(SIZE, |m: &BTreeMap<K, V>| m.len() as i32);
}

impl TypeRegistry {
    /// Register `Vec<T>` under `name` with the array shape
    /// (`PushBack`, `At`, `Size`)
    pub fn register_array<T: Data>(&self, name: &str) -> TypeRef {
        self.value_type::<Vec<T>>();
        self.register_with::<Vec<T>, _>(name, reflect_array::<T>)
    }

    /// Register `BTreeMap<K, V>` under `name` with the map shape
    /// (`Range`, `At`, `Size`, `Set`)
    ///
    /// The key list returned by `Range` is a `Vec<K>`, registered as
    /// `Vec<KeyName>` unless already known.
    pub fn register_map<K: Data + Ord, V: Data>(&self, name: &str) -> TypeRef {
        self.array_type::<K>();
        self.value_type::<BTreeMap<K, V>>();
        self.register_with::<BTreeMap<K, V>, _>(name, reflect_map::<K, V>)
    }

    /// Descriptor for `Vec<T>`, registered as `Vec<ElementName>` on first use
    pub fn array_type<T: Data>(&self) -> TypeRef {
        let ty = self.value_type::<Vec<T>>();
        if !ty.is_registered() {
            let element = T::declared_type(self).name().to_owned();
            self.register_array::<T>(&format!("Vec<{element}>"));
            self.reflect_all();
        }
        ty
    }

    /// Descriptor for `BTreeMap<K, V>`, registered as `Map<KeyName, ValueName>`
    /// on first use
    pub fn map_type<K: Data + Ord, V: Data>(&self) -> TypeRef {
        let ty = self.value_type::<BTreeMap<K, V>>();
        if !ty.is_registered() {
            let key = K::declared_type(self).name().to_owned();
            let value = V::declared_type(self).name().to_owned();
            self.register_map::<K, V>(&format!("Map<{key}, {value}>"));
            self.reflect_all();
        }
        ty
    }
}
