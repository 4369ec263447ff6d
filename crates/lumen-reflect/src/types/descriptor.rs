//! Type descriptors
//!
//! A descriptor holds everything known about one native type: identity,
//! layout, the raw operation table used by boxed storage, and the shape
//! (members, bases, attributes) filled in by the reflection callback.

use super::{Attributes, ClassMember, MemberKind, RawPtr, TypeKey, TypeRef, TypeRegistry, WeakRegistry};
use crate::callable::{Callable, CallableKind};
use crate::value::Dynamic;
use crate::{ReflectError, ReflectResult};
use once_cell::unsync::OnceCell;
use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Deferred reflection callback, run once per type
pub(crate) type ReflectCallback = Box<dyn FnOnce(&TypeRegistry, &TypeRef) -> TypeShape>;

/// Drop a boxed `T` stored behind a raw pointer
///
/// # Safety
///
/// `ptr` must come from `Box::<T>::into_raw` and must not be used afterwards.
unsafe fn drop_raw<T>(ptr: RawPtr) {
    drop(Box::from_raw(ptr.cast::<T>().as_ptr()));
}

/// Clone-assign one `T` onto another
///
/// # Safety
///
/// Both pointers must address live values of type `T`.
unsafe fn assign_raw<T: Clone>(dst: RawPtr, src: RawPtr) {
    let value = src.cast::<T>().as_ref().clone();
    *dst.cast::<T>().as_ptr() = value;
}

/// Raw operations for values of one type
pub(crate) struct TypeTable {
    drop: unsafe fn(RawPtr),
    assign: OnceCell<unsafe fn(RawPtr, RawPtr)>,
}

impl TypeTable {
    fn new<T: 'static>() -> Self {
        Self {
            drop: drop_raw::<T>,
            assign: OnceCell::new(),
        }
    }

    /// Release storage allocated as `Box<T>`
    ///
    /// # Safety
    ///
    /// `ptr` must be an owned allocation of this table's type.
    pub(crate) unsafe fn drop_value(&self, ptr: RawPtr) {
        (self.drop)(ptr)
    }
}

/// Link from a derived type to one of its bases
pub struct BaseLink {
    base: TypeRef,
    to_base: Box<dyn Fn(RawPtr) -> RawPtr>,
    to_derived: Box<dyn Fn(RawPtr) -> RawPtr>,
}

impl BaseLink {
    /// Base embedded at a fixed byte offset inside the derived type
    pub(crate) fn at_offset(base: TypeRef, offset: usize) -> Self {
        Self {
            base,
            // SAFETY: the offset was taken with `offset_of!` on the derived type,
            // so the adjusted pointer stays inside the same allocation.
            to_base: Box::new(move |ptr| unsafe { ptr.add(offset) }),
            to_derived: Box::new(move |ptr| unsafe { ptr.sub(offset) }),
        }
    }

    /// Base reached through caller-provided adjustments
    pub(crate) fn custom(
        base: TypeRef,
        to_base: impl Fn(RawPtr) -> RawPtr + 'static,
        to_derived: impl Fn(RawPtr) -> RawPtr + 'static,
    ) -> Self {
        Self {
            base,
            to_base: Box::new(to_base),
            to_derived: Box::new(to_derived),
        }
    }

    /// The base type
    pub fn base(&self) -> &TypeRef {
        &self.base
    }

    /// Adjust a derived pointer to the base sub-object
    pub fn to_base(&self, ptr: RawPtr) -> RawPtr {
        (self.to_base)(ptr)
    }

    /// Adjust a base pointer back to the enclosing derived object
    pub fn to_derived(&self, ptr: RawPtr) -> RawPtr {
        (self.to_derived)(ptr)
    }
}

impl fmt::Debug for BaseLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BaseLink").field(&self.base.name()).finish()
    }
}

/// Members, bases and attributes of a reflected type
#[derive(Default)]
pub(crate) struct TypeShape {
    pub(crate) members: Vec<Rc<ClassMember>>,
    pub(crate) bases: Vec<BaseLink>,
    pub(crate) attributes: Attributes,
}

/// Runtime description of one native type
pub struct TypeDescriptor {
    id: TypeKey,
    name: OnceCell<String>,
    rust_name: &'static str,
    rust_type: TypeId,
    size: usize,
    align: usize,
    managed: Cell<bool>,
    table: TypeTable,
    reflect: RefCell<Option<ReflectCallback>>,
    shape: OnceCell<TypeShape>,
    default_ctor: OnceCell<Option<Rc<Callable>>>,
    copy_ctor: OnceCell<Option<Rc<Callable>>>,
    assign_op: OnceCell<Option<Rc<Callable>>>,
    registry: WeakRegistry,
}

impl TypeDescriptor {
    pub(crate) fn new<T: 'static>(id: TypeKey, registry: WeakRegistry) -> Self {
        Self {
            id,
            name: OnceCell::new(),
            rust_name: std::any::type_name::<T>(),
            rust_type: TypeId::of::<T>(),
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            managed: Cell::new(false),
            table: TypeTable::new::<T>(),
            reflect: RefCell::new(None),
            shape: OnceCell::new(),
            default_ctor: OnceCell::new(),
            copy_ctor: OnceCell::new(),
            assign_op: OnceCell::new(),
            registry,
        }
    }

    /// Numeric type id
    pub fn id(&self) -> TypeKey {
        self.id
    }

    /// Registered name, or the Rust type name for unregistered types
    pub fn name(&self) -> &str {
        self.name.get().map(String::as_str).unwrap_or(self.rust_name)
    }

    /// Whether the type was registered under a name
    pub fn is_registered(&self) -> bool {
        self.name.get().is_some()
    }

    /// Rust type id of the described type
    pub fn rust_type(&self) -> TypeId {
        self.rust_type
    }

    /// Check if this descriptor describes `T`
    pub fn is<T: 'static>(&self) -> bool {
        self.rust_type == TypeId::of::<T>()
    }

    /// Size of the type in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Alignment requirement
    pub fn align(&self) -> usize {
        self.align
    }

    /// Managed types live in reference-counted objects with an instance id
    pub fn is_managed(&self) -> bool {
        self.managed.get()
    }

    /// Whether the reflection callback has run
    pub fn is_reflected(&self) -> bool {
        self.shape.get().is_some()
    }

    /// The registry owning this descriptor, if still alive
    pub fn registry(&self) -> Option<TypeRegistry> {
        self.registry.upgrade()
    }

    pub(crate) fn set_name(&self, name: &str) -> bool {
        self.name.set(name.to_owned()).is_ok()
    }

    pub(crate) fn mark_managed(&self) {
        self.managed.set(true);
    }

    pub(crate) fn table(&self) -> &TypeTable {
        &self.table
    }

    pub(crate) fn enable_assign<T: Clone + 'static>(&self) {
        debug_assert!(self.is::<T>());
        let _ = self.table.assign.set(assign_raw::<T>);
    }

    pub(crate) fn set_reflect(&self, callback: ReflectCallback) {
        *self.reflect.borrow_mut() = Some(callback);
    }

    pub(crate) fn take_reflect(&self) -> Option<ReflectCallback> {
        self.reflect.borrow_mut().take()
    }

    pub(crate) fn install_shape(&self, shape: TypeShape) -> bool {
        self.shape.set(shape).is_ok()
    }

    // ===== Members =====

    /// Members declared on this type, excluding bases
    pub fn own_members(&self) -> &[Rc<ClassMember>] {
        self.shape.get().map(|s| s.members.as_slice()).unwrap_or(&[])
    }

    /// Direct bases in declaration order
    pub fn bases(&self) -> &[BaseLink] {
        self.shape.get().map(|s| s.bases.as_slice()).unwrap_or(&[])
    }

    /// Type-level attributes
    pub fn attributes(&self) -> Option<&Attributes> {
        self.shape.get().map(|s| &s.attributes)
    }

    /// Check for a type-level attribute
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes().is_some_and(|a| a.contains(name))
    }

    /// Value of a type-level attribute
    pub fn attribute(&self, name: &str) -> Option<Dynamic> {
        self.attributes().and_then(|a| a.get(name)).cloned()
    }

    /// Find a member by name: own members first, then each base in order
    pub fn member(&self, name: &str) -> Option<Rc<ClassMember>> {
        if let Some(member) = self.own_members().iter().find(|m| m.name() == name) {
            return Some(member.clone());
        }
        self.bases().iter().find_map(|link| link.base().member(name))
    }

    fn collect(&self, kind: MemberKind, out: &mut Vec<Rc<ClassMember>>) {
        for link in self.bases() {
            link.base().collect(kind, out);
        }
        out.extend(self.own_members().iter().filter(|m| m.kind() == kind).cloned());
    }

    fn members_of_kind(&self, kind: MemberKind) -> Vec<Rc<ClassMember>> {
        let mut out = Vec::new();
        self.collect(kind, &mut out);
        out
    }

    /// All fields, base fields first
    pub fn fields(&self) -> Vec<Rc<ClassMember>> {
        self.members_of_kind(MemberKind::Field)
    }

    /// All properties, base properties first
    pub fn properties(&self) -> Vec<Rc<ClassMember>> {
        self.members_of_kind(MemberKind::Property)
    }

    /// All methods, base methods first
    pub fn methods(&self) -> Vec<Rc<ClassMember>> {
        self.members_of_kind(MemberKind::Method)
    }

    /// Number of fields including inherited ones
    pub fn field_count(&self) -> usize {
        self.fields().len()
    }

    /// Number of properties including inherited ones
    pub fn property_count(&self) -> usize {
        self.properties().len()
    }

    /// Number of methods including inherited ones
    pub fn method_count(&self) -> usize {
        self.methods().len()
    }

    /// Methods carrying the given attribute
    pub fn methods_by_tag(&self, tag: &str) -> Vec<Rc<ClassMember>> {
        let mut methods = self.methods();
        methods.retain(|m| m.has_attribute(tag));
        methods
    }

    /// Properties carrying the given attribute
    pub fn properties_by_tag(&self, tag: &str) -> Vec<Rc<ClassMember>> {
        let mut properties = self.properties();
        properties.retain(|m| m.has_attribute(tag));
        properties
    }

    /// Check for a method by name, including inherited ones
    pub fn has_method(&self, name: &str) -> bool {
        self.member(name).is_some_and(|m| m.kind() == MemberKind::Method)
    }

    /// Callables declared directly on this type
    pub fn own_callables(&self) -> impl Iterator<Item = &Rc<Callable>> + '_ {
        self.own_members().iter().filter_map(|m| m.callable())
    }

    // ===== Inheritance =====

    /// Whether this type has at least one base
    pub fn in_class_hierarchy(&self) -> bool {
        !self.bases().is_empty()
    }

    /// Check if `other` is a direct or indirect base of this type
    pub fn is_derived_from(&self, other: &TypeDescriptor) -> bool {
        self.base_path(other).is_some()
    }

    /// Chain of base links leading from this type to `target`
    ///
    /// Searched depth-first in base declaration order; the first path found
    /// wins, so diamond hierarchies resolve deterministically.
    fn base_path<'a>(&'a self, target: &TypeDescriptor) -> Option<Vec<&'a BaseLink>> {
        for link in self.bases() {
            if link.base().id == target.id {
                return Some(vec![link]);
            }
            if let Some(mut rest) = link.base().base_path(target) {
                rest.insert(0, link);
                return Some(rest);
            }
        }
        None
    }

    /// Convert a pointer to this type into a pointer to `target`
    ///
    /// Works in both directions along the hierarchy. Returns `None` if the
    /// two types are unrelated.
    pub fn cast_pointer(&self, ptr: RawPtr, target: &TypeDescriptor) -> Option<RawPtr> {
        if let Some(adjusted) = self.upcast_pointer(ptr, target) {
            return Some(adjusted);
        }
        let path = target.base_path(self)?;
        Some(path.iter().rev().fold(ptr, |p, link| link.to_derived(p)))
    }

    /// Convert a pointer to this type into a pointer to one of its bases
    pub fn upcast_pointer(&self, ptr: RawPtr, target: &TypeDescriptor) -> Option<RawPtr> {
        if self.id == target.id {
            return Some(ptr);
        }
        let path = self.base_path(target)?;
        Some(path.iter().fold(ptr, |p, link| link.to_base(p)))
    }

    // ===== Construction and copy =====

    fn find_own(&self, pick: impl Fn(&Callable) -> bool) -> Option<Rc<Callable>> {
        self.own_callables().find(|c| pick(c)).cloned()
    }

    fn cached(
        &self,
        cell: &OnceCell<Option<Rc<Callable>>>,
        pick: impl Fn(&Callable) -> bool,
    ) -> Option<Rc<Callable>> {
        if !self.is_reflected() {
            return None;
        }
        cell.get_or_init(|| self.find_own(pick)).clone()
    }

    /// The zero-argument constructor
    pub fn default_constructor(&self) -> Option<Rc<Callable>> {
        self.cached(&self.default_ctor, |c| {
            c.kind() == CallableKind::Constructor && c.arg_count() == 0
        })
    }

    /// The registered copy constructor
    pub fn copy_constructor(&self) -> Option<Rc<Callable>> {
        self.cached(&self.copy_ctor, |c| c.kind() == CallableKind::CopyConstructor)
    }

    /// The registered assignment operator
    pub fn assignment_operator(&self) -> Option<Rc<Callable>> {
        self.cached(&self.assign_op, |c| c.kind() == CallableKind::Assignment)
    }

    /// Create a default instance, or null if there is no default constructor
    pub fn new_instance(&self) -> Dynamic {
        let Some(ctor) = self.default_constructor() else {
            return Dynamic::null();
        };
        match ctor.invoke(&[]) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(type_name = self.name(), error = %err, "default constructor failed");
                Dynamic::null()
            }
        }
    }

    /// Copy a value through the copy constructor
    pub fn copy(&self, value: &Dynamic) -> ReflectResult<Dynamic> {
        let ctor = self.copy_constructor().ok_or_else(|| {
            ReflectError::Unsupported(format!("`{}` has no copy constructor", self.name()))
        })?;
        ctor.invoke(std::slice::from_ref(value))
    }

    /// Assign `src` onto the value at `dst`
    ///
    /// Uses the registered assignment operator, falling back to the clone
    /// assignment recorded when the type is used by value.
    pub(crate) fn assign_to(&self, dst: RawPtr, src: &Dynamic) -> ReflectResult<()> {
        if let Some(op) = self.assignment_operator() {
            op.invoke_on(dst, std::slice::from_ref(src))?;
            return Ok(());
        }
        let assign = self.table.assign.get().ok_or_else(|| {
            ReflectError::Unsupported(format!("`{}` is not assignable", self.name()))
        })?;
        let boxed = src
            .boxed()
            .ok_or_else(|| ReflectError::NullValue(format!("assignment to `{}`", self.name())))?;
        let src_ptr = boxed.data(self).ok_or_else(|| ReflectError::Conversion {
            from: boxed.descriptor().name().to_owned(),
            to: self.name().to_owned(),
        })?;
        if src_ptr != dst {
            // SAFETY: both pointers address live values of this descriptor's type.
            unsafe { assign(dst, src_ptr) };
        }
        Ok(())
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeDescriptor {}

impl Hash for TypeDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("size", &self.size)
            .field("managed", &self.is_managed())
            .field("bases", &self.bases())
            .field(
                "members",
                &self.own_members().iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
