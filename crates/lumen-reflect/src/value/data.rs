//! Native types crossing the dynamic boundary

use super::Dynamic;
use crate::object::Obj;
use crate::types::{RawPtr, TypeRef, TypeRegistry};
use crate::{ReflectError, ReflectResult};
use std::collections::BTreeMap;

/// A native type usable as a field, argument or return value
///
/// The defaults cover plain value types; an empty `impl Data for T {}` is
/// enough for any `Clone` type. Arguments are copied out of their dynamic
/// holders, converting through the registry when the types differ.
pub trait Data: Clone + 'static {
    /// Type recorded in signatures and member declarations
    fn declared_type(registry: &TypeRegistry) -> TypeRef {
        registry.value_type::<Self>()
    }

    /// Move the value into a new dynamic holder
    fn into_dynamic(self, registry: &TypeRegistry) -> Dynamic {
        Dynamic::construct_as(Self::declared_type(registry), self, registry)
    }

    /// Value produced from a null argument
    fn from_null() -> ReflectResult<Self> {
        Err(ReflectError::NullValue(std::any::type_name::<Self>().to_owned()))
    }

    /// Copy a native value out of a dynamic holder
    fn from_dynamic(value: &Dynamic, registry: &TypeRegistry) -> ReflectResult<Self> {
        let target = Self::declared_type(registry);
        debug_assert!(target.is::<Self>());
        let Some(boxed) = value.try_boxed()? else {
            return Self::from_null();
        };
        let source = boxed.descriptor().clone();
        let conversion_error = || ReflectError::Conversion {
            from: source.name().to_owned(),
            to: target.name().to_owned(),
        };

        if let Some(ptr) = boxed.data(&target) {
            // SAFETY: `data` resolved the storage as a live `Self`.
            return Ok(unsafe { ptr.cast::<Self>().as_ref() }.clone());
        }
        let converted = registry
            .convert(&Dynamic::from_rc(boxed), &target)
            .try_boxed()?
            .ok_or_else(conversion_error)?;
        let ptr = converted.data(&target).ok_or_else(conversion_error)?;
        // SAFETY: as above; `converted` holds the storage.
        Ok(unsafe { ptr.cast::<Self>().as_ref() }.clone())
    }

    /// Holder for a field of this type stored at `ptr` inside `owner`
    ///
    /// The default borrows the field in place. `Option<T>` returns a
    /// snapshot: a copy of the held value, so writes through the result
    /// never reach the field. `Dynamic` and `Obj<T>` return the handle the
    /// field stores; writes reach the shared value but cannot replace the
    /// field's handle. Write the field's own view to replace its content.
    fn view_at(ptr: RawPtr, owner: &Dynamic, registry: &TypeRegistry) -> Dynamic {
        Dynamic::borrowed(Self::declared_type(registry), ptr, owner, registry)
    }

    /// Store `value` into a field of this type at `ptr`
    fn write_at(ptr: RawPtr, value: &Dynamic, registry: &TypeRegistry) -> ReflectResult<()> {
        let value = Self::from_dynamic(value, registry)?;
        // SAFETY: field pointers address live storage of the field's type.
        unsafe { *ptr.cast::<Self>().as_ptr() = value };
        Ok(())
    }
}

macro_rules! impl_value_data {
    ($($ty:ty),* $(,)?) => {
        $(impl Data for $ty {})*
    };
}

impl_value_data!(bool, i8, i16, i32, i64, u8, u16, u32, u64, usize, f32, f64, String);

impl Data for () {
    fn declared_type(registry: &TypeRegistry) -> TypeRef {
        registry.void_type()
    }

    fn into_dynamic(self, _registry: &TypeRegistry) -> Dynamic {
        Dynamic::null()
    }

    fn from_null() -> ReflectResult<Self> {
        Ok(())
    }

    fn from_dynamic(_value: &Dynamic, _registry: &TypeRegistry) -> ReflectResult<Self> {
        Ok(())
    }

    fn view_at(_ptr: RawPtr, _owner: &Dynamic, _registry: &TypeRegistry) -> Dynamic {
        Dynamic::null()
    }
}

/// `Any`: holds whatever value it is given
impl Data for Dynamic {
    fn declared_type(registry: &TypeRegistry) -> TypeRef {
        registry.any_type()
    }

    fn into_dynamic(self, _registry: &TypeRegistry) -> Dynamic {
        self
    }

    fn from_null() -> ReflectResult<Self> {
        Ok(Dynamic::null())
    }

    fn from_dynamic(value: &Dynamic, _registry: &TypeRegistry) -> ReflectResult<Self> {
        value.get()
    }

    fn view_at(ptr: RawPtr, _owner: &Dynamic, _registry: &TypeRegistry) -> Dynamic {
        // SAFETY: field pointers address live storage of the field's type.
        unsafe { ptr.cast::<Dynamic>().as_ref() }.clone()
    }
}

/// Nullable values: `None` maps to null
impl<T: Data> Data for Option<T> {
    fn declared_type(registry: &TypeRegistry) -> TypeRef {
        T::declared_type(registry)
    }

    fn into_dynamic(self, registry: &TypeRegistry) -> Dynamic {
        match self {
            Some(value) => value.into_dynamic(registry),
            None => Dynamic::null(),
        }
    }

    fn from_null() -> ReflectResult<Self> {
        Ok(None)
    }

    fn from_dynamic(value: &Dynamic, registry: &TypeRegistry) -> ReflectResult<Self> {
        let value = value.get()?;
        if value.is_null() {
            return Ok(None);
        }
        T::from_dynamic(&value, registry).map(Some)
    }

    fn view_at(ptr: RawPtr, _owner: &Dynamic, registry: &TypeRegistry) -> Dynamic {
        // SAFETY: field pointers address live storage of the field's type.
        unsafe { ptr.cast::<Self>().as_ref() }
            .clone()
            .into_dynamic(registry)
    }
}

impl<T: Data> Data for Vec<T> {
    fn declared_type(registry: &TypeRegistry) -> TypeRef {
        registry.array_type::<T>()
    }
}

impl<K: Data + Ord, V: Data> Data for BTreeMap<K, V> {
    fn declared_type(registry: &TypeRegistry) -> TypeRef {
        registry.map_type::<K, V>()
    }
}

/// Shared handle to a managed object
impl<T: 'static> Data for Obj<T> {
    fn declared_type(registry: &TypeRegistry) -> TypeRef {
        registry.object_type::<T>()
    }

    fn into_dynamic(self, registry: &TypeRegistry) -> Dynamic {
        Dynamic::object(self.into_object(), registry)
    }

    fn from_dynamic(value: &Dynamic, registry: &TypeRegistry) -> ReflectResult<Self> {
        let Some(boxed) = value.try_boxed()? else {
            return Self::from_null();
        };
        let conversion_error = || ReflectError::Conversion {
            from: boxed.descriptor().name().to_owned(),
            to: registry.descriptor_of::<T>().name().to_owned(),
        };
        let object = boxed.object().ok_or_else(conversion_error)?.clone();
        Obj::from_object(object, registry).ok_or_else(conversion_error)
    }

    fn view_at(ptr: RawPtr, _owner: &Dynamic, registry: &TypeRegistry) -> Dynamic {
        // SAFETY: field pointers address live storage of the field's type.
        unsafe { ptr.cast::<Self>().as_ref() }.to_dynamic(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Tag(u8);

    impl Data for Tag {}

    #[test]
    fn test_value_round_trip() {
        let registry = TypeRegistry::new();
        let value = registry.wrap(Tag(3));
        assert_eq!(value.extract::<Tag>().unwrap(), Tag(3));
        assert_eq!(value.type_name().as_deref(), Some(std::any::type_name::<Tag>()));
    }

    #[test]
    fn test_unit_and_none_are_null() {
        let registry = TypeRegistry::new();
        assert!(registry.wrap(()).is_null());
        assert!(registry.wrap(None::<i32>).is_null());
        assert_eq!(registry.wrap(Some(4i32)).extract::<i32>().unwrap(), 4);
    }

    #[test]
    fn test_vec_registers_array_shape() {
        let registry = TypeRegistry::new();
        let ty = <Vec<i32> as Data>::declared_type(&registry);
        assert_eq!(ty.name(), "Vec<i32>");
        assert!(ty.is_reflected());
        assert!(ty.has_method("PushBack"));

        let values = registry.wrap(vec![1i32, 2, 3]);
        assert_eq!(values.call("Size", &[]).unwrap().extract::<i32>().unwrap(), 3);
    }

    #[test]
    fn test_optional_field_reads_are_snapshots() {
        use crate::types::{Reflect, TypeBuilder};

        #[derive(Debug, Clone, Default)]
        struct Slot {
            tag: Option<i32>,
        }

        impl Data for Slot {}

        impl Reflect for Slot {
            const TYPE_NAME: &'static str = "Slot";

            fn reflect(builder: &mut TypeBuilder<'_, Self>) {
                builder.field("tag", |s| &mut s.tag);
            }
        }

        let registry = TypeRegistry::new();
        registry.register::<Slot>();
        registry.reflect_all();

        let slot = registry.wrap(Slot { tag: Some(1) });
        let snapshot = slot.member("tag").get().unwrap();
        snapshot.set(&registry.wrap(2i32)).unwrap();
        assert_eq!(slot.extract::<Slot>().unwrap().tag, Some(1));

        slot.member("tag").set(&registry.wrap(3i32)).unwrap();
        assert_eq!(slot.extract::<Slot>().unwrap().tag, Some(3));
        slot.member("tag").set(&Dynamic::null()).unwrap();
        assert_eq!(slot.extract::<Slot>().unwrap().tag, None);
    }

    #[test]
    fn test_any_holds_inner_value() {
        let registry = TypeRegistry::new();
        let inner = registry.wrap(8i32);
        let any = Dynamic::from_dynamic(&inner, &registry).unwrap();
        assert!(any.same_value(&inner));
        assert_eq!(any.descriptor().unwrap().name(), "i32");
    }

    #[test]
    fn test_object_handle_requires_object() {
        let registry = TypeRegistry::new();
        let object = Obj::new(&registry, Tag(1));
        let value = object.to_dynamic(&registry);
        let back = Obj::<Tag>::from_dynamic(&value, &registry).unwrap();
        assert!(back.ptr_eq(&object));
        assert!(Obj::<Tag>::from_dynamic(&registry.wrap(2i32), &registry).is_err());
    }
}
