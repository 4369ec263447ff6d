//! Type registry
//!
//! The registry owns every type descriptor, assigns numeric ids in
//! first-use order and indexes descriptors by name, id and Rust `TypeId`.
//! It also owns the identity registry and the boxed-value pool shared by
//! all values created through it.
//!
//! Registration is two-phase: [`TypeRegistry::register_with`] records a
//! name and a deferred callback, and [`TypeRegistry::reflect_all`] runs the
//! callbacks. Callbacks may register further types; `reflect_all` repeats
//! until nothing is left pending.

use super::descriptor::TypeShape;
use super::{Reflect, TypeBuilder, TypeDescriptor, TypeKey, TypeRef, CONVERSION_NAME};
use crate::callable::Callable;
use crate::config::ReflectConfig;
use crate::object::{IdentityRegistry, Obj};
use crate::value::{BoxPool, Data, Dynamic, PoolStats};
use rustc_hash::FxHashMap;
use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

#[derive(Default)]
struct Tables {
    by_name: FxHashMap<String, TypeRef>,
    by_id: FxHashMap<TypeKey, TypeRef>,
    by_rust: FxHashMap<TypeId, TypeRef>,
    registered: Vec<TypeRef>,
}

pub(crate) struct RegistryInner {
    tables: RefCell<Tables>,
    next_id: Cell<TypeKey>,
    reflecting: Cell<bool>,
    identity: IdentityRegistry,
    pool: Rc<BoxPool>,
    config: ReflectConfig,
}

/// Registry of runtime type information
///
/// Cheap to clone; clones share the same descriptors.
#[derive(Clone)]
pub struct TypeRegistry {
    inner: Rc<RegistryInner>,
}

/// Non-owning handle to a [`TypeRegistry`]
#[derive(Clone, Default)]
pub struct WeakRegistry {
    inner: Weak<RegistryInner>,
}

impl WeakRegistry {
    /// Get the registry if it is still alive
    pub fn upgrade(&self) -> Option<TypeRegistry> {
        self.inner.upgrade().map(|inner| TypeRegistry { inner })
    }
}

impl TypeRegistry {
    /// Create a registry with the standard types and default configuration
    pub fn new() -> Self {
        Self::with_config(ReflectConfig::default())
    }

    /// Create a registry with the standard types
    pub fn with_config(config: ReflectConfig) -> Self {
        let registry = Self {
            inner: Rc::new(RegistryInner {
                tables: RefCell::new(Tables::default()),
                next_id: Cell::new(1),
                reflecting: Cell::new(false),
                identity: IdentityRegistry::new(),
                pool: Rc::new(BoxPool::new(config.boxed_value_capacity)),
                config,
            }),
        };
        super::standard::install(&registry);
        registry.reflect_all();
        registry
    }

    /// Create a non-owning handle
    pub fn downgrade(&self) -> WeakRegistry {
        WeakRegistry {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Check if two handles refer to the same registry
    pub fn ptr_eq(&self, other: &TypeRegistry) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Registry configuration
    pub fn config(&self) -> &ReflectConfig {
        &self.inner.config
    }

    /// Live managed objects by instance id
    pub fn identity(&self) -> &IdentityRegistry {
        &self.inner.identity
    }

    pub(crate) fn pool(&self) -> &Rc<BoxPool> {
        &self.inner.pool
    }

    /// Boxed-value pool usage
    pub fn pool_stats(&self) -> PoolStats {
        self.inner.pool.stats()
    }

    // ===== Descriptors =====

    /// Descriptor for `T`, created on first use
    pub fn descriptor_of<T: 'static>(&self) -> TypeRef {
        let key = TypeId::of::<T>();
        if let Some(ty) = self.inner.tables.borrow().by_rust.get(&key) {
            return ty.clone();
        }

        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        let ty = Rc::new(TypeDescriptor::new::<T>(id, self.downgrade()));

        let mut tables = self.inner.tables.borrow_mut();
        tables.by_rust.insert(key, ty.clone());
        tables.by_id.insert(id, ty.clone());
        tracing::trace!(id, rust_type = std::any::type_name::<T>(), "descriptor created");
        ty
    }

    /// Descriptor for a type used by value
    pub fn value_type<T: Clone + 'static>(&self) -> TypeRef {
        let ty = self.descriptor_of::<T>();
        ty.enable_assign::<T>();
        ty
    }

    /// Descriptor for a managed object type
    pub fn object_type<T: 'static>(&self) -> TypeRef {
        let ty = self.descriptor_of::<T>();
        ty.mark_managed();
        ty
    }

    /// The `Any` type, accepted by and convertible to every type
    pub fn any_type(&self) -> TypeRef {
        self.descriptor_of::<Dynamic>()
    }

    /// The `void` type used as the return type of unit functions
    pub fn void_type(&self) -> TypeRef {
        self.descriptor_of::<()>()
    }

    /// Check whether a descriptor is the `Any` type
    pub fn is_any(&self, ty: &TypeDescriptor) -> bool {
        ty.is::<Dynamic>()
    }

    // ===== Registration =====

    /// Register a type implementing [`Reflect`]
    pub fn register<T: Reflect>(&self) -> TypeRef {
        if T::MANAGED {
            self.register_object_with::<T, _>(T::TYPE_NAME, T::reflect)
        } else {
            self.register_with::<T, _>(T::TYPE_NAME, T::reflect)
        }
    }

    /// Register `T` under `name` with a deferred reflection callback
    ///
    /// Registering a name twice, or the same type under two names, logs a
    /// warning and keeps the first registration.
    pub fn register_with<T, F>(&self, name: &str, reflect: F) -> TypeRef
    where
        T: 'static,
        F: FnOnce(&mut TypeBuilder<'_, T>) + 'static,
    {
        let ty = self.descriptor_of::<T>();
        let mut tables = self.inner.tables.borrow_mut();
        if let Some(existing) = tables.by_name.get(name) {
            tracing::warn!(
                type_name = name,
                existing_id = existing.id(),
                "type name already registered, keeping the first registration"
            );
            return ty;
        }
        if !ty.set_name(name) {
            tracing::warn!(
                type_name = name,
                registered_as = ty.name(),
                "type already registered under another name"
            );
            return ty;
        }
        tables.by_name.insert(name.to_owned(), ty.clone());
        tables.registered.push(ty.clone());
        drop(tables);

        ty.set_reflect(Box::new(move |registry, descriptor| {
            let mut builder = TypeBuilder::<T>::new(registry, descriptor.clone());
            reflect(&mut builder);
            builder.finish()
        }));
        tracing::debug!(type_name = name, id = ty.id(), "type registered");
        ty
    }

    /// Register a managed object type under `name`
    pub fn register_object_with<T, F>(&self, name: &str, reflect: F) -> TypeRef
    where
        T: 'static,
        F: FnOnce(&mut TypeBuilder<'_, T>) + 'static,
    {
        let ty = self.register_with::<T, F>(name, reflect);
        ty.mark_managed();
        ty
    }

    /// Run every pending reflection callback
    ///
    /// Operates on a snapshot of the registered types and repeats while
    /// callbacks keep registering new ones. Calls made from inside a
    /// callback return immediately; the outer pass picks up the new types.
    pub fn reflect_all(&self) {
        if self.inner.reflecting.replace(true) {
            return;
        }
        loop {
            let pending: Vec<TypeRef> = self
                .inner
                .tables
                .borrow()
                .registered
                .iter()
                .filter(|ty| !ty.is_reflected())
                .cloned()
                .collect();
            if pending.is_empty() {
                break;
            }
            for ty in &pending {
                self.reflect_type(ty);
            }
        }
        self.inner.reflecting.set(false);
    }

    fn reflect_type(&self, ty: &TypeRef) {
        if ty.is_reflected() {
            return;
        }
        let shape = match ty.take_reflect() {
            Some(callback) => callback(self, ty),
            None => TypeShape::default(),
        };
        if !ty.install_shape(shape) {
            tracing::warn!(type_name = ty.name(), "type reflected twice");
            return;
        }
        tracing::debug!(
            type_name = ty.name(),
            members = ty.own_members().len(),
            bases = ty.bases().len(),
            "type reflected"
        );
    }

    // ===== Lookup =====

    /// Find a registered type by name
    pub fn resolve(&self, name: &str) -> Option<TypeRef> {
        self.inner.tables.borrow().by_name.get(name).cloned()
    }

    /// Find a type by numeric id
    pub fn resolve_id(&self, id: TypeKey) -> Option<TypeRef> {
        self.inner.tables.borrow().by_id.get(&id).cloned()
    }

    /// Name of the type with the given id
    pub fn type_name(&self, id: TypeKey) -> Option<String> {
        self.resolve_id(id).map(|ty| ty.name().to_owned())
    }

    /// Id of the type registered under `name`
    pub fn type_id(&self, name: &str) -> Option<TypeKey> {
        self.resolve(name).map(|ty| ty.id())
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.inner.tables.borrow().registered.len()
    }

    /// Check if no types are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered types in registration order
    pub fn types(&self) -> Vec<TypeRef> {
        self.inner.tables.borrow().registered.clone()
    }

    /// `"[TypeName]"` for a value, `"[null]"` for null
    pub fn describe(&self, value: &Dynamic) -> String {
        match value.descriptor() {
            Some(ty) => format!("[{}]", ty.name()),
            None => "[null]".to_owned(),
        }
    }

    // ===== Values =====

    /// Box a native value
    pub fn wrap<T: Data>(&self, value: T) -> Dynamic {
        value.into_dynamic(self)
    }

    /// Allocate a managed object
    pub fn create<T: 'static>(&self, value: T) -> Obj<T> {
        Obj::new(self, value)
    }

    /// Default-construct a registered type by name; null if unknown or
    /// not default-constructible
    pub fn new_instance(&self, name: &str) -> Dynamic {
        self.resolve(name)
            .map(|ty| ty.new_instance())
            .unwrap_or_default()
    }

    // ===== Conversion =====

    /// Find a `(cast)` static function converting exactly `from` into `to`
    ///
    /// Both the source and the target type are searched.
    pub fn find_conversion(&self, from: &TypeDescriptor, to: &TypeDescriptor) -> Option<Rc<Callable>> {
        from.own_callables()
            .chain(to.own_callables())
            .find(|c| {
                c.name() == CONVERSION_NAME
                    && c.arg_count() == 1
                    && c.arg_type(0).is_some_and(|arg| arg.id() == from.id())
                    && c.return_type().id() == to.id()
            })
            .cloned()
    }

    fn related(&self, from: &TypeDescriptor, to: &TypeDescriptor) -> bool {
        from.id() == to.id()
            || self.is_any(from)
            || self.is_any(to)
            || from.is_derived_from(to)
            || to.is_derived_from(from)
    }

    /// Check whether values of `from` can become values of `to`
    ///
    /// Conversions are never chained.
    pub fn can_convert(&self, from: &TypeDescriptor, to: &TypeDescriptor) -> bool {
        self.related(from, to) || self.find_conversion(from, to).is_some()
    }

    /// Convert `value` to `to`, or null if there is no conversion
    ///
    /// Related types yield the same underlying value; pointer adjustment
    /// happens when the storage is accessed.
    pub fn convert(&self, value: &Dynamic, to: &TypeDescriptor) -> Dynamic {
        let value = value.unboxed();
        let Some(from) = value.descriptor() else {
            return Dynamic::null();
        };
        if self.related(&from, to) {
            return value;
        }
        let Some(cast) = self.find_conversion(&from, to) else {
            return Dynamic::null();
        };
        match cast.invoke(std::slice::from_ref(&value)) {
            Ok(converted) => converted,
            Err(err) => {
                tracing::debug!(from = from.name(), to = to.name(), error = %err, "conversion failed");
                Dynamic::null()
            }
        }
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.len())
            .field("objects", &self.identity().len())
            .field("pool", &self.pool_stats())
            .finish()
    }
}
