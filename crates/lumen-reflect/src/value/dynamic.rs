//! Type-erased value handle

use super::{BoxPool, BoxedKind, BoxedValue, Data};
use crate::callable::{resolve_overload, Callable};
use crate::object::{Obj, ObjectRef};
use crate::types::{ClassMember, RawPtr, TypeDescriptor, TypeRef, TypeRegistry};
use crate::{ReflectError, ReflectResult};
use std::fmt;
use std::ptr::NonNull;
use std::rc::Rc;

/// Shared, type-erased handle to a boxed value, or null
///
/// Cloning a `Dynamic` shares the boxed value; it never copies the native
/// value. Use [`TypeDescriptor::copy`] for a deep copy.
#[derive(Clone, Default)]
pub struct Dynamic {
    value: Option<Rc<BoxedValue>>,
}

impl Dynamic {
    /// The null value
    pub fn null() -> Self {
        Self::default()
    }

    pub(crate) fn from_rc(boxed: Rc<BoxedValue>) -> Self {
        Self { value: Some(boxed) }
    }

    /// Move `value` into owned storage described by `ty`
    pub(crate) fn owned<T: 'static>(ty: TypeRef, value: T, registry: &TypeRegistry) -> Self {
        debug_assert!(ty.is::<T>(), "descriptor `{}` does not describe the value", ty.name());
        let ptr = NonNull::from(Box::leak(Box::new(value))).cast::<u8>();
        Self::from_rc(BoxedValue::new(ty, BoxedKind::Owned(ptr), registry.pool()))
    }

    /// Non-owning holder over storage that `keep_alive` owns
    pub(crate) fn borrowed(
        ty: TypeRef,
        data: RawPtr,
        keep_alive: &Dynamic,
        registry: &TypeRegistry,
    ) -> Self {
        let kind = BoxedKind::Borrowed {
            data,
            keep_alive: keep_alive.clone(),
        };
        Self::from_rc(BoxedValue::new(ty, kind, registry.pool()))
    }

    /// Hold a managed object
    pub fn object(object: ObjectRef, registry: &TypeRegistry) -> Self {
        let ty = object.descriptor().clone();
        Self::from_rc(BoxedValue::new(ty, BoxedKind::Object(object), registry.pool()))
    }

    /// Box a freshly constructed `T`; managed types become objects
    pub(crate) fn construct<T: 'static>(registry: &TypeRegistry, value: T) -> Self {
        Self::construct_as(registry.descriptor_of::<T>(), value, registry)
    }

    pub(crate) fn construct_as<T: 'static>(ty: TypeRef, value: T, registry: &TypeRegistry) -> Self {
        if ty.is_managed() {
            Obj::new(registry, value).to_dynamic(registry)
        } else {
            Self::owned(ty, value, registry)
        }
    }

    pub(crate) fn view(parent: Dynamic, member: Rc<ClassMember>, pool: &Rc<BoxPool>) -> Self {
        let ty = member.value_type().clone();
        Self::from_rc(BoxedValue::new(ty, BoxedKind::Member { parent, member }, pool))
    }

    // ===== Inspection =====

    /// The boxed value as stored, views included
    pub fn raw(&self) -> Option<&Rc<BoxedValue>> {
        self.value.as_ref()
    }

    /// The boxed value with field and property views resolved
    pub fn try_boxed(&self) -> ReflectResult<Option<Rc<BoxedValue>>> {
        let mut current = self.value.clone();
        while let Some(boxed) = current.as_ref().filter(|b| b.is_unboxable()) {
            current = BoxedValue::get(boxed)?.value;
        }
        Ok(current)
    }

    /// Like [`Dynamic::try_boxed`], treating read failures as null
    pub fn boxed(&self) -> Option<Rc<BoxedValue>> {
        match self.try_boxed() {
            Ok(boxed) => boxed,
            Err(err) => {
                tracing::debug!(error = %err, "view could not be resolved");
                None
            }
        }
    }

    /// Current value with views resolved
    pub fn unboxed(&self) -> Dynamic {
        Self {
            value: self.boxed(),
        }
    }

    /// Check for null
    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    /// Check whether this is a live member view
    pub fn is_view(&self) -> bool {
        self.value.as_ref().is_some_and(|b| b.member().is_some())
    }

    /// Type of the held value; for views, the member's declared type
    pub fn descriptor(&self) -> Option<TypeRef> {
        self.value.as_ref().map(|b| b.descriptor().clone())
    }

    /// Name of the held value's type
    pub fn type_name(&self) -> Option<String> {
        self.value.as_ref().map(|b| b.descriptor().name().to_owned())
    }

    /// The managed object held, if any
    pub fn object_ref(&self) -> Option<ObjectRef> {
        self.boxed().and_then(|b| b.object().cloned())
    }

    /// Instance id of the managed object held, if any
    pub fn instance_id(&self) -> Option<u64> {
        self.boxed().and_then(|b| b.instance_id())
    }

    /// Registry the value's type belongs to
    pub fn registry(&self) -> Option<TypeRegistry> {
        self.value.as_ref().and_then(|b| b.descriptor().registry())
    }

    // ===== Members =====

    /// Live view of a named member
    ///
    /// Returns null if the type has no such member.
    ///
    /// # Panics
    ///
    /// Panics if `self` is null.
    pub fn member(&self, name: &str) -> Dynamic {
        match self.try_member(name) {
            Ok(view) => view,
            Err(ReflectError::NullValue(_)) => {
                panic!("member `{name}` accessed on a null value")
            }
            Err(err) => {
                tracing::trace!(member = name, error = %err, "member lookup failed");
                Dynamic::null()
            }
        }
    }

    /// Live view of a named member
    pub fn try_member(&self, name: &str) -> ReflectResult<Dynamic> {
        let boxed = self
            .try_boxed()?
            .ok_or_else(|| ReflectError::NullValue(format!("member `{name}`")))?;
        let ty = boxed.descriptor();
        let member = ty.member(name).ok_or_else(|| ReflectError::MissingMember {
            type_name: ty.name().to_owned(),
            member: name.to_owned(),
        })?;
        Ok(Dynamic::from_rc(boxed).member_view(&member))
    }

    /// Live view of `member` on this value
    pub fn member_view(&self, member: &Rc<ClassMember>) -> Dynamic {
        match &self.value {
            Some(boxed) => Self::view(self.clone(), member.clone(), boxed.pool()),
            None => Dynamic::null(),
        }
    }

    /// Current value; reads through field and property views
    pub fn get(&self) -> ReflectResult<Dynamic> {
        Ok(Self {
            value: self.try_boxed()?,
        })
    }

    /// Invoke a method view
    pub fn invoke(&self, args: &[Dynamic]) -> ReflectResult<Dynamic> {
        match &self.value {
            Some(boxed) => boxed.invoke(args),
            None => Err(ReflectError::NullValue("invocation".to_owned())),
        }
    }

    /// Call a method by name with overload resolution
    ///
    /// Methods declared on the value's own type are considered before
    /// those of its bases.
    pub fn call(&self, name: &str, args: &[Dynamic]) -> ReflectResult<Dynamic> {
        let boxed = self
            .try_boxed()?
            .ok_or_else(|| ReflectError::NullValue(format!("call to `{name}`")))?;
        let ty = boxed.descriptor().clone();
        let registry = ty.registry().ok_or(ReflectError::RegistryDropped)?;

        let mut candidates = Vec::new();
        collect_callables(&ty, name, &mut candidates);
        if candidates.is_empty() {
            return Err(ReflectError::MissingMember {
                type_name: ty.name().to_owned(),
                member: name.to_owned(),
            });
        }
        let callable = resolve_overload(&candidates, name, args, &registry)?.ok_or_else(|| {
            ReflectError::NotCallable(format!("no overload of `{name}` accepts the given arguments"))
        })?;

        if callable.is_static() {
            return callable.invoke(args);
        }
        let owner = callable
            .owner()
            .ok_or_else(|| ReflectError::NotCallable(name.to_owned()))?;
        let target = boxed.data(owner).ok_or_else(|| ReflectError::Conversion {
            from: ty.name().to_owned(),
            to: owner.name().to_owned(),
        })?;
        callable.invoke_on(target, args)
    }

    // ===== Conversion and assignment =====

    /// Convert to `target`, or null if no conversion exists
    pub fn as_type(&self, target: &TypeDescriptor) -> Dynamic {
        let value = self.unboxed();
        let Some(ty) = value.descriptor() else {
            return Dynamic::null();
        };
        if ty.id() == target.id() {
            return value;
        }
        match ty.registry() {
            Some(registry) => registry.convert(&value, target),
            None => Dynamic::null(),
        }
    }

    /// Assign `other` to this value
    ///
    /// A null handle adopts `other`; otherwise the value is written into
    /// the existing storage (see [`Dynamic::set`]).
    pub fn assign(&mut self, other: &Dynamic) -> ReflectResult<()> {
        if self.is_null() {
            self.value = other.try_boxed()?;
            return Ok(());
        }
        self.set(other)
    }

    /// Write `other` into the storage this value refers to
    ///
    /// Views write through their member. Values of another type are
    /// converted first; a failed conversion is an error.
    pub fn set(&self, other: &Dynamic) -> ReflectResult<()> {
        match &self.value {
            Some(boxed) => boxed.set(other),
            None => Err(ReflectError::NullValue("assignment to a null value".to_owned())),
        }
    }

    /// Copy the value out as a native `T`, converting if needed
    pub fn extract<T: Data>(&self) -> ReflectResult<T> {
        match self.registry() {
            Some(registry) => T::from_dynamic(self, &registry),
            None => T::from_null(),
        }
    }

    /// Like [`Dynamic::extract`], discarding the error
    pub fn try_extract<T: Data>(&self) -> Option<T> {
        self.extract().ok()
    }

    fn native<T: 'static>(&self) -> ReflectResult<(Rc<BoxedValue>, NonNull<T>)> {
        let boxed = self
            .try_boxed()?
            .ok_or_else(|| ReflectError::NullValue(std::any::type_name::<T>().to_owned()))?;
        let registry = boxed.descriptor().registry().ok_or(ReflectError::RegistryDropped)?;
        let target = registry.descriptor_of::<T>();
        let ptr = boxed.data(&target).ok_or_else(|| ReflectError::Conversion {
            from: boxed.descriptor().name().to_owned(),
            to: target.name().to_owned(),
        })?;
        Ok((boxed, ptr.cast()))
    }

    /// Borrow the value as `T` without copying
    pub fn with_ref<T: 'static, R>(&self, f: impl FnOnce(&T) -> R) -> ReflectResult<R> {
        let (_boxed, ptr) = self.native::<T>()?;
        // SAFETY: `_boxed` keeps the storage alive for the duration of `f`.
        Ok(f(unsafe { ptr.as_ref() }))
    }

    /// Mutate the value in place as `T`
    pub fn with_mut<T: 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> ReflectResult<R> {
        let (_boxed, ptr) = self.native::<T>()?;
        // SAFETY: values are confined to one thread and `_boxed` keeps the
        // storage alive for the duration of `f`.
        Ok(f(unsafe { &mut *ptr.as_ptr() }))
    }

    /// Check whether two handles refer to the same storage
    pub fn same_value(&self, other: &Dynamic) -> bool {
        match (self.boxed(), other.boxed()) {
            (None, None) => true,
            (Some(a), Some(b)) => {
                if Rc::ptr_eq(&a, &b) {
                    return true;
                }
                let ty = a.descriptor();
                a.data(ty).is_some() && a.data(ty) == b.data(ty)
            }
            _ => false,
        }
    }
}

fn collect_callables(ty: &TypeDescriptor, name: &str, out: &mut Vec<Rc<Callable>>) {
    out.extend(ty.own_callables().filter(|c| c.name() == name).cloned());
    for link in ty.bases() {
        collect_callables(link.base(), name, out);
    }
}

impl fmt::Debug for Dynamic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(boxed) => f.debug_tuple("Dynamic").field(boxed).finish(),
            None => f.write_str("Dynamic(null)"),
        }
    }
}
