//! Managed objects
//!
//! Managed values live in a heap block with an intrusive reference count
//! and a stable 64-bit instance id. The block is registered with the
//! identity registry on allocation and unregistered when the last
//! reference drops.
//!
//! # Memory Layout
//!
//! ```text
//! ObjectRef ──► ┌──────────────────────────────┐
//!               │ refs, instance_id            │
//!               │ runtime type descriptor      │
//!               │ identity registry handle     │
//!               │ data ─────────────────────────────► Box<T>
//!               └──────────────────────────────┘
//! ```

mod identity;
mod link;

pub use identity::{IdentityRegistry, DELETED_ID, EMPTY_ID, NO_INSTANCE};
pub use link::{IdLink, ID_PTR_ATTRIBUTE, OBJECT_ID_FIELD};

use crate::types::{RawPtr, TypeRef, TypeRegistry};
use crate::value::Dynamic;
use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;

struct ObjectHeader {
    refs: Cell<usize>,
    instance_id: Cell<u64>,
    descriptor: TypeRef,
    identity: IdentityRegistry,
    data: RawPtr,
}

/// Reference-counted handle to a managed object of any type
pub struct ObjectRef {
    header: NonNull<ObjectHeader>,
}

impl ObjectRef {
    /// Allocate a managed object and register its identity
    pub(crate) fn allocate<T: 'static>(registry: &TypeRegistry, value: T) -> Self {
        let descriptor = registry.object_type::<T>();
        let data = NonNull::from(Box::leak(Box::new(value))).cast::<u8>();
        let header = Box::new(ObjectHeader {
            refs: Cell::new(1),
            instance_id: Cell::new(NO_INSTANCE),
            descriptor,
            identity: registry.identity().clone(),
            data,
        });
        let object = Self {
            header: NonNull::from(Box::leak(header)),
        };
        object.header().identity.register(&object);
        object
    }

    /// Create a new handle from a live header
    ///
    /// # Safety
    ///
    /// `header` must point to the header of a live object.
    unsafe fn from_header(header: NonNull<ObjectHeader>) -> Self {
        let refs = &header.as_ref().refs;
        refs.set(refs.get() + 1);
        Self { header }
    }

    fn header(&self) -> &ObjectHeader {
        // SAFETY: the header stays allocated while any handle exists.
        unsafe { self.header.as_ref() }
    }

    /// Stable instance id
    pub fn instance_id(&self) -> u64 {
        self.header().instance_id.get()
    }

    /// Runtime type of the object
    pub fn descriptor(&self) -> &TypeRef {
        &self.header().descriptor
    }

    /// Address of the object's data
    pub fn data(&self) -> RawPtr {
        self.header().data
    }

    /// Number of live handles
    pub fn ref_count(&self) -> usize {
        self.header().refs.get()
    }

    /// Check if two handles refer to the same object
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        self.header == other.header
    }

    /// Wrap as a dynamic value
    pub fn to_dynamic(&self, registry: &TypeRegistry) -> Dynamic {
        Dynamic::object(self.clone(), registry)
    }
}

impl Clone for ObjectRef {
    fn clone(&self) -> Self {
        // SAFETY: `self` keeps the header alive.
        unsafe { Self::from_header(self.header) }
    }
}

impl Drop for ObjectRef {
    fn drop(&mut self) {
        let refs = self.header().refs.get() - 1;
        self.header().refs.set(refs);
        if refs > 0 {
            return;
        }
        // SAFETY: this was the last handle; header and data were leaked
        // boxes owned by the object.
        unsafe {
            let header = Box::from_raw(self.header.as_ptr());
            header
                .identity
                .unregister(header.instance_id.get(), self.header);
            header.descriptor.table().drop_value(header.data);
        }
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("instance_id", &self.instance_id())
            .field("type", &self.descriptor().name())
            .field("refs", &self.ref_count())
            .finish()
    }
}

/// Typed handle to a managed object
///
/// The object may be of `T` or of any type deriving from `T`; the stored
/// pointer is already adjusted to the `T` sub-object.
pub struct Obj<T: 'static> {
    object: ObjectRef,
    ptr: NonNull<T>,
    _marker: PhantomData<T>,
}

impl<T: 'static> Obj<T> {
    /// Allocate a managed `T`
    pub fn new(registry: &TypeRegistry, value: T) -> Self {
        let object = ObjectRef::allocate(registry, value);
        let ptr = object.data().cast();
        Self {
            object,
            ptr,
            _marker: PhantomData,
        }
    }

    /// View an object as `T`; `None` unless its runtime type is `T` or
    /// derives from `T`
    pub fn from_object(object: ObjectRef, registry: &TypeRegistry) -> Option<Self> {
        let target = registry.descriptor_of::<T>();
        let ptr = object
            .descriptor()
            .upcast_pointer(object.data(), &target)?
            .cast();
        Some(Self {
            object,
            ptr,
            _marker: PhantomData,
        })
    }

    /// The untyped handle
    pub fn object(&self) -> &ObjectRef {
        &self.object
    }

    /// Convert into the untyped handle
    pub fn into_object(self) -> ObjectRef {
        self.object
    }

    /// Stable instance id
    pub fn instance_id(&self) -> u64 {
        self.object.instance_id()
    }

    /// View the same object through one of its bases
    pub fn upcast<B: 'static>(&self, registry: &TypeRegistry) -> Option<Obj<B>> {
        Obj::from_object(self.object.clone(), registry)
    }

    /// Check if two handles refer to the same object
    pub fn ptr_eq<U>(&self, other: &Obj<U>) -> bool {
        self.object.ptr_eq(&other.object)
    }

    /// Mutate the object in place
    ///
    /// The closure must not reach the same object through another handle.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        // SAFETY: objects are confined to one thread and the pointer stays
        // valid while `self` holds a reference.
        f(unsafe { &mut *self.ptr.as_ptr() })
    }

    /// Wrap as a dynamic value
    pub fn to_dynamic(&self, registry: &TypeRegistry) -> Dynamic {
        self.object.to_dynamic(registry)
    }
}

impl<T: 'static> Clone for Obj<T> {
    fn clone(&self) -> Self {
        Self {
            object: self.object.clone(),
            ptr: self.ptr,
            _marker: PhantomData,
        }
    }
}

impl<T: 'static> Deref for Obj<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the object stays alive while `self` holds a reference.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: 'static> fmt::Debug for Obj<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Obj").field(&self.object).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        hits: u32,
    }

    #[test]
    fn test_allocation_registers_identity() {
        let registry = TypeRegistry::new();
        let counter = Obj::new(&registry, Counter { hits: 0 });
        let id = counter.instance_id();
        assert!(IdentityRegistry::is_valid_id(id));
        assert!(registry.identity().contains(id));
        assert!(registry.descriptor_of::<Counter>().is_managed());
    }

    #[test]
    fn test_last_drop_unregisters() {
        let registry = TypeRegistry::new();
        let counter = Obj::new(&registry, Counter { hits: 0 });
        let id = counter.instance_id();
        let second = counter.clone();
        assert_eq!(counter.object().ref_count(), 2);

        drop(counter);
        assert!(registry.identity().contains(id));
        drop(second);
        assert!(!registry.identity().contains(id));
    }

    #[test]
    fn test_with_mut_and_deref() {
        let registry = TypeRegistry::new();
        let counter = Obj::new(&registry, Counter { hits: 1 });
        counter.with_mut(|c| c.hits += 2);
        assert_eq!(counter.hits, 3);
    }

    #[test]
    fn test_lookup_returns_same_object() {
        let registry = TypeRegistry::new();
        let counter = Obj::new(&registry, Counter { hits: 5 });
        let found = registry.identity().lookup(counter.instance_id()).unwrap();
        assert!(found.ptr_eq(counter.object()));
        assert_eq!(found.ref_count(), 2);
    }

    #[test]
    fn test_from_object_rejects_unrelated_type() {
        let registry = TypeRegistry::new();
        let counter = Obj::new(&registry, Counter { hits: 0 });
        assert!(Obj::<String>::from_object(counter.object().clone(), &registry).is_none());
        assert!(Obj::<Counter>::from_object(counter.object().clone(), &registry).is_some());
    }
}
