//! Class members: fields, properties and methods
//!
//! Members are shared (`Rc`) between a descriptor and every view created
//! from it. Reads and writes always go through the owning value, whose
//! storage pointer is adjusted to the member's declaring type first.

use super::{Attributes, RawPtr, TypeRef, TypeRegistry};
use crate::callable::Callable;
use crate::value::{BoxedValue, Dynamic};
use crate::{ReflectError, ReflectResult};
use std::fmt;
use std::rc::Rc;

/// Read a field value given its address and the owning value
pub(crate) type ReadFn = fn(RawPtr, &Dynamic, &TypeRegistry) -> Dynamic;

/// Write a dynamic value into a field address
pub(crate) type WriteFn = fn(RawPtr, &Dynamic, &TypeRegistry) -> ReflectResult<()>;

/// Kind of class member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    /// Stored field
    Field,
    /// Getter/setter pair
    Property,
    /// Callable
    Method,
}

/// Resolve the owning value's storage as a pointer to `owner`
fn owner_pointer(object: &Dynamic, owner: &TypeRef) -> ReflectResult<(Rc<BoxedValue>, RawPtr)> {
    let boxed = object
        .boxed()
        .ok_or_else(|| ReflectError::NullValue(format!("member access on `{}`", owner.name())))?;
    let ptr = boxed.data(owner).ok_or_else(|| ReflectError::Conversion {
        from: boxed.descriptor().name().to_owned(),
        to: owner.name().to_owned(),
    })?;
    Ok((boxed, ptr))
}

fn registry_of(ty: &TypeRef) -> ReflectResult<TypeRegistry> {
    ty.registry().ok_or(ReflectError::RegistryDropped)
}

/// A stored field
pub struct FieldInfo {
    pub(crate) name: String,
    pub(crate) attributes: Attributes,
    pub(crate) owner: TypeRef,
    pub(crate) ty: TypeRef,
    pub(crate) project: Box<dyn Fn(RawPtr) -> RawPtr>,
    pub(crate) read: ReadFn,
    pub(crate) write: WriteFn,
}

impl FieldInfo {
    /// Declaring type
    pub fn owner(&self) -> &TypeRef {
        &self.owner
    }

    /// Declared field type
    pub fn field_type(&self) -> &TypeRef {
        &self.ty
    }

    /// Read the field of `object`
    ///
    /// Value-typed fields are returned as non-owning holders that keep
    /// `object` alive; writes through them land in the field.
    pub fn read(&self, object: &Dynamic) -> ReflectResult<Dynamic> {
        let (boxed, base) = owner_pointer(object, &self.owner)?;
        let registry = registry_of(&self.owner)?;
        let address = (self.project)(base);
        Ok((self.read)(address, &Dynamic::from_rc(boxed), &registry))
    }

    /// Write `value` into the field of `object`
    pub fn write(&self, object: &Dynamic, value: &Dynamic) -> ReflectResult<()> {
        let (_boxed, base) = owner_pointer(object, &self.owner)?;
        let registry = registry_of(&self.owner)?;
        (self.write)((self.project)(base), value, &registry)
    }
}

/// A getter/setter pair; either side may be absent
pub struct PropertyInfo {
    pub(crate) name: String,
    pub(crate) attributes: Attributes,
    pub(crate) owner: TypeRef,
    pub(crate) ty: TypeRef,
    pub(crate) getter: Option<Rc<Callable>>,
    pub(crate) setter: Option<Rc<Callable>>,
}

impl PropertyInfo {
    /// Declaring type
    pub fn owner(&self) -> &TypeRef {
        &self.owner
    }

    /// Property value type
    pub fn property_type(&self) -> &TypeRef {
        &self.ty
    }

    /// Whether a getter is registered
    pub fn is_readable(&self) -> bool {
        self.getter.is_some()
    }

    /// Whether a setter is registered
    pub fn is_writable(&self) -> bool {
        self.setter.is_some()
    }

    /// Invoke the getter on `object`
    pub fn read(&self, object: &Dynamic) -> ReflectResult<Dynamic> {
        let getter = self
            .getter
            .as_ref()
            .ok_or_else(|| ReflectError::NotReadable(self.name.clone()))?;
        let (_boxed, base) = owner_pointer(object, &self.owner)?;
        getter.invoke_on(base, &[])
    }

    /// Invoke the setter on `object`
    pub fn write(&self, object: &Dynamic, value: &Dynamic) -> ReflectResult<()> {
        let setter = self
            .setter
            .as_ref()
            .ok_or_else(|| ReflectError::NotWritable(self.name.clone()))?;
        let (_boxed, base) = owner_pointer(object, &self.owner)?;
        setter.invoke_on(base, std::slice::from_ref(value))?;
        Ok(())
    }
}

/// A method, static function or constructor exposed as a member
pub struct MethodInfo {
    pub(crate) name: String,
    pub(crate) attributes: Attributes,
    pub(crate) callable: Rc<Callable>,
}

impl MethodInfo {
    /// The underlying callable
    pub fn callable(&self) -> &Rc<Callable> {
        &self.callable
    }

    /// Invoke on `object`; static callables ignore the object
    pub fn invoke(&self, object: &Dynamic, args: &[Dynamic]) -> ReflectResult<Dynamic> {
        if self.callable.is_static() {
            return self.callable.invoke(args);
        }
        let owner = self
            .callable
            .owner()
            .ok_or_else(|| ReflectError::NotCallable(self.name.clone()))?;
        let (_boxed, base) = owner_pointer(object, owner)?;
        self.callable.invoke_on(base, args)
    }
}

/// A named member of a reflected type
pub enum ClassMember {
    /// Stored field
    Field(FieldInfo),
    /// Getter/setter pair
    Property(PropertyInfo),
    /// Callable
    Method(MethodInfo),
}

impl ClassMember {
    /// Member name
    pub fn name(&self) -> &str {
        match self {
            ClassMember::Field(f) => &f.name,
            ClassMember::Property(p) => &p.name,
            ClassMember::Method(m) => &m.name,
        }
    }

    /// Member kind
    pub fn kind(&self) -> MemberKind {
        match self {
            ClassMember::Field(_) => MemberKind::Field,
            ClassMember::Property(_) => MemberKind::Property,
            ClassMember::Method(_) => MemberKind::Method,
        }
    }

    /// Member attributes
    pub fn attributes(&self) -> &Attributes {
        match self {
            ClassMember::Field(f) => &f.attributes,
            ClassMember::Property(p) => &p.attributes,
            ClassMember::Method(m) => &m.attributes,
        }
    }

    pub(crate) fn attributes_mut(&mut self) -> &mut Attributes {
        match self {
            ClassMember::Field(f) => &mut f.attributes,
            ClassMember::Property(p) => &mut p.attributes,
            ClassMember::Method(m) => &mut m.attributes,
        }
    }

    /// Check for a member attribute
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes().contains(name)
    }

    /// Value of a member attribute
    pub fn attribute(&self, name: &str) -> Option<Dynamic> {
        self.attributes().get(name).cloned()
    }

    /// Type of the value the member yields: field type, property type or
    /// method return type
    pub fn value_type(&self) -> &TypeRef {
        match self {
            ClassMember::Field(f) => &f.ty,
            ClassMember::Property(p) => &p.ty,
            ClassMember::Method(m) => m.callable.return_type(),
        }
    }

    /// Field details
    pub fn as_field(&self) -> Option<&FieldInfo> {
        match self {
            ClassMember::Field(f) => Some(f),
            _ => None,
        }
    }

    /// Property details
    pub fn as_property(&self) -> Option<&PropertyInfo> {
        match self {
            ClassMember::Property(p) => Some(p),
            _ => None,
        }
    }

    /// Method details
    pub fn as_method(&self) -> Option<&MethodInfo> {
        match self {
            ClassMember::Method(m) => Some(m),
            _ => None,
        }
    }

    /// The callable behind a method member
    pub fn callable(&self) -> Option<&Rc<Callable>> {
        self.as_method().map(MethodInfo::callable)
    }

    /// Read the member's current value on `object`
    pub fn read(&self, object: &Dynamic) -> ReflectResult<Dynamic> {
        match self {
            ClassMember::Field(f) => f.read(object),
            ClassMember::Property(p) => p.read(object),
            ClassMember::Method(m) => Err(ReflectError::NotReadable(m.name.clone())),
        }
    }

    /// Write `value` into the member on `object`
    pub fn write(&self, object: &Dynamic, value: &Dynamic) -> ReflectResult<()> {
        match self {
            ClassMember::Field(f) => f.write(object, value),
            ClassMember::Property(p) => p.write(object, value),
            ClassMember::Method(m) => Err(ReflectError::NotWritable(m.name.clone())),
        }
    }

    /// Invoke a method member on `object`
    pub fn invoke(&self, object: &Dynamic, args: &[Dynamic]) -> ReflectResult<Dynamic> {
        match self {
            ClassMember::Method(m) => m.invoke(object, args),
            _ => Err(ReflectError::NotCallable(self.name().to_owned())),
        }
    }
}

impl fmt::Debug for ClassMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassMember")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("type", &self.value_type().name())
            .field("attributes", self.attributes())
            .finish()
    }
}
