//! Runtime type information
//!
//! Every reflected Rust type is represented by exactly one
//! [`TypeDescriptor`], owned by a [`TypeRegistry`]. Descriptors are created
//! lazily the first time a type is used and are populated once by a
//! reflection callback during [`TypeRegistry::reflect_all`].

mod builder;
mod descriptor;
mod member;
mod registry;
mod standard;

pub use builder::{MemberAttrs, TypeBuilder, ASSIGNMENT_NAME, CONSTRUCTOR_NAME, COPY_CONSTRUCTOR_NAME};
pub use descriptor::{BaseLink, TypeDescriptor};
pub use member::{ClassMember, FieldInfo, MemberKind, MethodInfo, PropertyInfo};
pub use registry::{TypeRegistry, WeakRegistry};
pub use standard::{ANY_TYPE_NAME, CONVERSION_NAME, VOID_TYPE_NAME};

pub(crate) use descriptor::TypeShape;
pub(crate) use standard::{AT, PUSH_BACK, RANGE, SET, SIZE};

use crate::value::Dynamic;
use std::fmt;
use std::ptr::NonNull;
use std::rc::Rc;

/// Untyped address of a live native value
pub type RawPtr = NonNull<u8>;

/// Numeric type identifier, assigned in first-use order
pub type TypeKey = u32;

/// Shared handle to a type descriptor
pub type TypeRef = Rc<TypeDescriptor>;

/// A native type that describes its own members
///
/// ```ignore
/// impl Reflect for Point {
///     const TYPE_NAME: &'static str = "Point";
///
///     fn reflect(builder: &mut TypeBuilder<'_, Self>) {
///         builder.default_constructor();
///         builder.field("x", |p| &mut p.x);
///         builder.field("y", |p| &mut p.y);
///     }
/// }
/// ```
pub trait Reflect: Sized + 'static {
    /// Registered type name
    const TYPE_NAME: &'static str;

    /// Managed types are heap objects with instance identity
    const MANAGED: bool = false;

    /// Describe members, bases and attributes
    fn reflect(builder: &mut TypeBuilder<'_, Self>);
}

/// Named attributes attached to a type or member
///
/// Attribute values are optional; a flag attribute carries a null value.
#[derive(Clone, Default)]
pub struct Attributes {
    entries: Vec<(String, Dynamic)>,
}

impl Attributes {
    /// Add or replace an attribute
    pub fn insert(&mut self, name: impl Into<String>, value: Dynamic) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Check whether an attribute is present
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    /// Get the value attached to an attribute
    pub fn get(&self, name: &str) -> Option<&Dynamic> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Attribute names in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Number of attributes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no attributes
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
