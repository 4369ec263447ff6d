//! Boxed values
//!
//! The closed set of storage holders behind a [`Dynamic`]:
//! - `Owned`: heap storage released with the value
//! - `Borrowed`: storage owned elsewhere, kept alive by a parent value
//! - `Object`: a reference-counted managed object
//! - `Member`: a live view of a field, property or method of a parent

use super::pool::{BoxPool, PoolToken};
use super::Dynamic;
use crate::callable::Callable;
use crate::object::ObjectRef;
use crate::types::{ClassMember, MemberKind, RawPtr, TypeDescriptor, TypeRef};
use crate::{ReflectError, ReflectResult};
use std::fmt;
use std::rc::Rc;

pub(crate) enum BoxedKind {
    Owned(RawPtr),
    Borrowed {
        data: RawPtr,
        // Never read; holds the owner of `data`.
        #[allow(dead_code)]
        keep_alive: Dynamic,
    },
    Object(ObjectRef),
    Member {
        parent: Dynamic,
        member: Rc<ClassMember>,
    },
}

/// A type-erased value holder
pub struct BoxedValue {
    descriptor: TypeRef,
    kind: BoxedKind,
    _token: PoolToken,
}

impl BoxedValue {
    pub(crate) fn new(descriptor: TypeRef, kind: BoxedKind, pool: &Rc<BoxPool>) -> Rc<Self> {
        Rc::new(Self {
            descriptor,
            kind,
            _token: pool.acquire(),
        })
    }

    pub(crate) fn pool(&self) -> &Rc<BoxPool> {
        self._token.pool()
    }

    /// Type of the held value; for views, the member's declared type
    pub fn descriptor(&self) -> &TypeRef {
        &self.descriptor
    }

    /// Field and property views must be unboxed before their value is used
    pub fn is_unboxable(&self) -> bool {
        match &self.kind {
            BoxedKind::Member { member, .. } => member.kind() != MemberKind::Method,
            _ => false,
        }
    }

    /// Whether dropping this holder releases the storage
    pub fn is_data_owner(&self) -> bool {
        matches!(self.kind, BoxedKind::Owned(_))
    }

    /// The managed object held, if any
    pub fn object(&self) -> Option<&ObjectRef> {
        match &self.kind {
            BoxedKind::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Instance id of the managed object held, if any
    pub fn instance_id(&self) -> Option<u64> {
        self.object().map(ObjectRef::instance_id)
    }

    /// The member viewed, if this is a view
    pub fn member(&self) -> Option<&Rc<ClassMember>> {
        match &self.kind {
            BoxedKind::Member { member, .. } => Some(member),
            _ => None,
        }
    }

    /// The callable behind a method view
    pub fn callable(&self) -> Option<&Rc<Callable>> {
        self.member().and_then(|m| m.callable())
    }

    /// Storage address adjusted to `target`
    ///
    /// Only derived-to-base adjustments are applied. Returns `None` for
    /// views and for unrelated types.
    pub fn data(&self, target: &TypeDescriptor) -> Option<RawPtr> {
        match &self.kind {
            BoxedKind::Owned(ptr) | BoxedKind::Borrowed { data: ptr, .. } => {
                self.descriptor.upcast_pointer(*ptr, target)
            }
            BoxedKind::Object(object) => object.descriptor().upcast_pointer(object.data(), target),
            BoxedKind::Member { .. } => None,
        }
    }

    /// Current value: reads through field and property views, returns
    /// every other holder (method views included) as is
    pub fn get(this: &Rc<Self>) -> ReflectResult<Dynamic> {
        match &this.kind {
            BoxedKind::Member { parent, member } if this.is_unboxable() => member.read(parent),
            _ => Ok(Dynamic::from_rc(Rc::clone(this))),
        }
    }

    /// Type-checked assignment into the held storage
    ///
    /// Values of other types go through registry conversion first.
    pub fn set(&self, value: &Dynamic) -> ReflectResult<()> {
        match &self.kind {
            BoxedKind::Owned(ptr) | BoxedKind::Borrowed { data: ptr, .. } => {
                self.assign_storage(*ptr, value)
            }
            BoxedKind::Object(object) => self.assign_storage(object.data(), value),
            BoxedKind::Member { parent, member } => member.write(parent, value),
        }
    }

    fn assign_storage(&self, dst: RawPtr, value: &Dynamic) -> ReflectResult<()> {
        let registry = self.descriptor.registry().ok_or(ReflectError::RegistryDropped)?;
        let source = value
            .descriptor()
            .ok_or_else(|| ReflectError::NullValue(format!("assignment to `{}`", self.descriptor)))?;
        let converted = registry.convert(value, &self.descriptor);
        if converted.is_null() {
            return Err(ReflectError::Conversion {
                from: source.name().to_owned(),
                to: self.descriptor.name().to_owned(),
            });
        }
        self.descriptor.assign_to(dst, &converted)
    }

    /// Invoke a method view
    pub fn invoke(&self, args: &[Dynamic]) -> ReflectResult<Dynamic> {
        match &self.kind {
            BoxedKind::Member { parent, member } => member.invoke(parent, args),
            _ => Err(ReflectError::NotCallable(self.descriptor.name().to_owned())),
        }
    }
}

impl Drop for BoxedValue {
    fn drop(&mut self) {
        if let BoxedKind::Owned(ptr) = self.kind {
            // SAFETY: owned storage was allocated as a box of the descriptor's
            // type and is released exactly once, here.
            unsafe { self.descriptor.table().drop_value(ptr) };
        }
    }
}

impl fmt::Debug for BoxedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            BoxedKind::Owned(_) => "owned",
            BoxedKind::Borrowed { .. } => "borrowed",
            BoxedKind::Object(_) => "object",
            BoxedKind::Member { .. } => "view",
        };
        f.debug_struct("BoxedValue")
            .field("type", &self.descriptor.name())
            .field("kind", &kind)
            .finish()
    }
}
