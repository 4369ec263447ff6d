//! Type builder handed to reflection callbacks

use super::descriptor::{BaseLink, TypeShape};
use super::member::{ClassMember, FieldInfo, MethodInfo, PropertyInfo};
use super::{Attributes, RawPtr, TypeRef, TypeRegistry, CONVERSION_NAME};
use crate::callable::{
    Callable, CallableKind, IntoConstMethod, IntoConstructor, IntoFunction, IntoMethod,
};
use crate::value::{Data, Dynamic};
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::rc::Rc;

/// Name given to constructors
pub const CONSTRUCTOR_NAME: &str = "new";

/// Name given to copy constructors
pub const COPY_CONSTRUCTOR_NAME: &str = "copy";

/// Name given to assignment operators
pub const ASSIGNMENT_NAME: &str = "assign";

/// Attribute setter for the member just added
pub struct MemberAttrs<'a> {
    attributes: &'a mut Attributes,
}

impl MemberAttrs<'_> {
    /// Attach a flag attribute
    pub fn attr(self, name: &str) -> Self {
        self.attributes.insert(name, Dynamic::null());
        self
    }

    /// Attach an attribute carrying a value
    pub fn attr_value(self, name: &str, value: Dynamic) -> Self {
        self.attributes.insert(name, value);
        self
    }
}

/// Collects the shape of `T` during reflection
///
/// Members are listed in registration order. Bases must be declared with
/// [`inherit!`](crate::inherit) or [`TypeBuilder::base_at`] so pointers can
/// be adjusted between the derived type and each base.
pub struct TypeBuilder<'r, T> {
    registry: &'r TypeRegistry,
    descriptor: TypeRef,
    members: Vec<ClassMember>,
    bases: Vec<BaseLink>,
    attributes: Attributes,
    _marker: PhantomData<fn() -> T>,
}

impl<'r, T: 'static> TypeBuilder<'r, T> {
    pub(crate) fn new(registry: &'r TypeRegistry, descriptor: TypeRef) -> Self {
        Self {
            registry,
            descriptor,
            members: Vec::new(),
            bases: Vec::new(),
            attributes: Attributes::default(),
            _marker: PhantomData,
        }
    }

    /// Registry the type belongs to
    pub fn registry(&self) -> &TypeRegistry {
        self.registry
    }

    /// Descriptor being built
    pub fn descriptor(&self) -> &TypeRef {
        &self.descriptor
    }

    pub(crate) fn finish(self) -> TypeShape {
        TypeShape {
            members: self.members.into_iter().map(Rc::new).collect(),
            bases: self.bases,
            attributes: self.attributes,
        }
    }

    fn push(&mut self, member: ClassMember) -> MemberAttrs<'_> {
        self.members.push(member);
        let last = self.members.len() - 1;
        MemberAttrs {
            attributes: self.members[last].attributes_mut(),
        }
    }

    fn push_callable(&mut self, callable: Callable) -> MemberAttrs<'_> {
        self.push(ClassMember::Method(MethodInfo {
            name: callable.name().to_owned(),
            attributes: Attributes::default(),
            callable: Rc::new(callable),
        }))
    }

    // ===== Type-level settings =====

    /// Attach a flag attribute to the type
    pub fn attribute(&mut self, name: &str) -> &mut Self {
        self.attributes.insert(name, Dynamic::null());
        self
    }

    /// Attach an attribute carrying a value to the type
    pub fn attribute_value(&mut self, name: &str, value: Dynamic) -> &mut Self {
        self.attributes.insert(name, value);
        self
    }

    /// Mark the type as managed: constructors produce reference-counted
    /// objects with an instance id
    pub fn managed(&mut self) -> &mut Self {
        self.descriptor.mark_managed();
        self
    }

    /// Declare a base embedded at `offset` bytes inside `T`
    ///
    /// # Safety
    ///
    /// `offset` must be the offset of a field of type `B` inside `T`, as
    /// returned by `std::mem::offset_of!`. Prefer the [`inherit!`](crate::inherit)
    /// macro, which checks the field type.
    pub unsafe fn base_at<B: 'static>(&mut self, offset: usize) -> &mut Self {
        let base = self.registry.descriptor_of::<B>();
        self.bases.push(BaseLink::at_offset(base, offset));
        self
    }

    /// Declare a base reached through custom pointer adjustments
    ///
    /// # Safety
    ///
    /// `to_base` must map any valid `T` pointer to its `B` sub-object and
    /// `to_derived` must be its exact inverse.
    pub unsafe fn base_with<B: 'static>(
        &mut self,
        to_base: impl Fn(RawPtr) -> RawPtr + 'static,
        to_derived: impl Fn(RawPtr) -> RawPtr + 'static,
    ) -> &mut Self {
        let base = self.registry.descriptor_of::<B>();
        self.bases.push(BaseLink::custom(base, to_base, to_derived));
        self
    }

    // ===== Fields and properties =====

    /// Register a stored field through a projection from `T`
    pub fn field<F: Data>(&mut self, name: &str, accessor: fn(&mut T) -> &mut F) -> MemberAttrs<'_> {
        let project = move |ptr: RawPtr| -> RawPtr {
            // SAFETY: `ptr` addresses a live `T`; the accessor only projects into it.
            let owner = unsafe { &mut *ptr.cast::<T>().as_ptr() };
            NonNull::from(accessor(owner)).cast()
        };
        let member = ClassMember::Field(FieldInfo {
            name: name.to_owned(),
            attributes: Attributes::default(),
            owner: self.descriptor.clone(),
            ty: F::declared_type(self.registry),
            project: Box::new(project),
            read: F::view_at,
            write: F::write_at,
        });
        self.push(member)
    }

    fn getter<R, G>(&self, name: &str, getter: G) -> Callable
    where
        R: Data,
        G: Fn(&T) -> R + 'static,
    {
        Callable::new(
            name,
            CallableKind::ConstMethod,
            Some(self.descriptor.clone()),
            <G as IntoConstMethod<T, fn(&T) -> R>>::signature(self.registry),
            self.registry,
            <G as IntoConstMethod<T, fn(&T) -> R>>::into_invoker(getter),
        )
    }

    fn setter<V, S>(&self, name: &str, setter: S) -> Callable
    where
        V: Data,
        S: Fn(&mut T, V) + 'static,
    {
        Callable::new(
            name,
            CallableKind::Method,
            Some(self.descriptor.clone()),
            <S as IntoMethod<T, fn(&mut T, V)>>::signature(self.registry),
            self.registry,
            <S as IntoMethod<T, fn(&mut T, V)>>::into_invoker(setter),
        )
    }

    fn push_property(
        &mut self,
        name: &str,
        ty: TypeRef,
        getter: Option<Callable>,
        setter: Option<Callable>,
    ) -> MemberAttrs<'_> {
        let member = ClassMember::Property(PropertyInfo {
            name: name.to_owned(),
            attributes: Attributes::default(),
            owner: self.descriptor.clone(),
            ty,
            getter: getter.map(Rc::new),
            setter: setter.map(Rc::new),
        });
        self.push(member)
    }

    /// Register a readable and writable property
    pub fn property<R, V, G, S>(&mut self, name: &str, getter: G, setter: S) -> MemberAttrs<'_>
    where
        R: Data,
        V: Data,
        G: Fn(&T) -> R + 'static,
        S: Fn(&mut T, V) + 'static,
    {
        let getter = self.getter(name, getter);
        let setter = self.setter(name, setter);
        let ty = getter.return_type().clone();
        self.push_property(name, ty, Some(getter), Some(setter))
    }

    /// Register a property with only a getter
    pub fn readonly_property<R, G>(&mut self, name: &str, getter: G) -> MemberAttrs<'_>
    where
        R: Data,
        G: Fn(&T) -> R + 'static,
    {
        let getter = self.getter(name, getter);
        let ty = getter.return_type().clone();
        self.push_property(name, ty, Some(getter), None)
    }

    /// Register a property with only a setter
    pub fn writeonly_property<V, S>(&mut self, name: &str, setter: S) -> MemberAttrs<'_>
    where
        V: Data,
        S: Fn(&mut T, V) + 'static,
    {
        let setter = self.setter(name, setter);
        let ty = V::declared_type(self.registry);
        self.push_property(name, ty, None, Some(setter))
    }

    // ===== Callables =====

    /// Register a method taking `&mut T`
    pub fn method<M, F: IntoMethod<T, M>>(&mut self, name: &str, method: F) -> MemberAttrs<'_> {
        self.method_of_kind(name, CallableKind::Method, method)
    }

    /// Register a closure adapted into a method of `T`
    pub fn external<M, F: IntoMethod<T, M>>(&mut self, name: &str, method: F) -> MemberAttrs<'_> {
        self.method_of_kind(name, CallableKind::External, method)
    }

    fn method_of_kind<M, F: IntoMethod<T, M>>(
        &mut self,
        name: &str,
        kind: CallableKind,
        method: F,
    ) -> MemberAttrs<'_> {
        let callable = Callable::new(
            name,
            kind,
            Some(self.descriptor.clone()),
            F::signature(self.registry),
            self.registry,
            method.into_invoker(),
        );
        self.push_callable(callable)
    }

    /// Register a method taking `&T`
    pub fn const_method<M, F: IntoConstMethod<T, M>>(
        &mut self,
        name: &str,
        method: F,
    ) -> MemberAttrs<'_> {
        let callable = Callable::new(
            name,
            CallableKind::ConstMethod,
            Some(self.descriptor.clone()),
            F::signature(self.registry),
            self.registry,
            method.into_invoker(),
        );
        self.push_callable(callable)
    }

    /// Register a static function of `T`
    pub fn static_fn<M, F: IntoFunction<M>>(&mut self, name: &str, function: F) -> MemberAttrs<'_> {
        self.function_of_kind(name, CallableKind::Static, function)
    }

    fn function_of_kind<M, F: IntoFunction<M>>(
        &mut self,
        name: &str,
        kind: CallableKind,
        function: F,
    ) -> MemberAttrs<'_> {
        let callable = Callable::new(
            name,
            kind,
            Some(self.descriptor.clone()),
            F::signature(self.registry),
            self.registry,
            function.into_invoker(),
        );
        self.push_callable(callable)
    }

    /// Register a constructor
    pub fn constructor<M, F: IntoConstructor<T, M>>(&mut self, ctor: F) -> MemberAttrs<'_> {
        self.constructor_of_kind(CONSTRUCTOR_NAME, CallableKind::Constructor, ctor)
    }

    fn constructor_of_kind<M, F: IntoConstructor<T, M>>(
        &mut self,
        name: &str,
        kind: CallableKind,
        ctor: F,
    ) -> MemberAttrs<'_> {
        let callable = Callable::new(
            name,
            kind,
            Some(self.descriptor.clone()),
            F::signature(self.registry),
            self.registry,
            ctor.into_invoker(),
        );
        self.push_callable(callable)
    }

    /// Register `T::default` as the zero-argument constructor
    pub fn default_constructor(&mut self) -> MemberAttrs<'_>
    where
        T: Default,
    {
        self.constructor(T::default)
    }

    /// Register a copy constructor built on `Clone`
    pub fn copy_constructor(&mut self) -> MemberAttrs<'_>
    where
        T: Data,
    {
        self.registry.value_type::<T>();
        self.constructor_of_kind(COPY_CONSTRUCTOR_NAME, CallableKind::CopyConstructor, |value: T| value)
    }

    /// Register an assignment operator built on `Clone`
    pub fn assignment(&mut self) -> MemberAttrs<'_>
    where
        T: Data,
    {
        self.registry.value_type::<T>();
        self.method_of_kind(ASSIGNMENT_NAME, CallableKind::Assignment, |dst: &mut T, src: T| {
            *dst = src
        })
    }

    /// Register a conversion from `T` to `U`
    pub fn conversion<U, F>(&mut self, convert: F) -> MemberAttrs<'_>
    where
        T: Data,
        U: Data,
        F: Fn(T) -> U + 'static,
    {
        self.registry.value_type::<T>();
        self.function_of_kind::<fn(T) -> U, F>(CONVERSION_NAME, CallableKind::Static, convert)
    }

    /// Register a conversion from `U` to `T`
    pub fn conversion_from<U, F>(&mut self, convert: F) -> MemberAttrs<'_>
    where
        T: Data,
        U: Data,
        F: Fn(U) -> T + 'static,
    {
        self.registry.value_type::<T>();
        self.function_of_kind::<fn(U) -> T, F>(CONVERSION_NAME, CallableKind::Static, convert)
    }
}

/// Declare that a field of the derived type embeds a base type
///
/// ```ignore
/// fn reflect(builder: &mut TypeBuilder<'_, Sprite>) {
///     inherit!(builder, Sprite, node: Node);
/// }
/// ```
#[macro_export]
macro_rules! inherit {
    ($builder:expr, $derived:ty, $field:ident : $base:ty) => {{
        let _: fn(&$derived) -> &$base = |value| &value.$field;
        // SAFETY: the offset names a field of type `$base` inside `$derived`.
        unsafe {
            $crate::types::TypeBuilder::<$derived>::base_at::<$base>(
                $builder,
                ::std::mem::offset_of!($derived, $field),
            )
        }
    }};
}
