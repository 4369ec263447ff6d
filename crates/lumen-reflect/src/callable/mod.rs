//! Callable descriptors
//!
//! A [`Callable`] is the uniform runtime face of any invocable native entity:
//! free functions, methods, const methods, constructors, copy constructors,
//! assignment operators, adapted closures and static functions. Arguments
//! arrive as [`Dynamic`] values and are converted to the declared native
//! parameter types before the call.

mod wrap;

pub use wrap::{IntoConstMethod, IntoConstructor, IntoFunction, IntoMethod};

#[doc(hidden)]
pub use wrap::{Invoker, Signature};

use crate::types::{RawPtr, TypeRef, TypeRegistry, WeakRegistry};
use crate::value::Dynamic;
use crate::{ReflectError, ReflectResult};
use std::fmt;
use std::rc::Rc;

/// Kind of callable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallableKind {
    /// Free function
    Function,
    /// Method taking `&mut self`
    Method,
    /// Method taking `&self`
    ConstMethod,
    /// Constructor producing a new value of the owning type
    Constructor,
    /// Constructor copying an existing value
    CopyConstructor,
    /// Assignment operator
    Assignment,
    /// Closure adapted into a method
    External,
    /// Static function of a type
    Static,
}

impl CallableKind {
    /// Whether invocation needs a target object
    pub fn needs_target(self) -> bool {
        matches!(
            self,
            CallableKind::Method
                | CallableKind::ConstMethod
                | CallableKind::Assignment
                | CallableKind::External
        )
    }
}

/// Runtime descriptor of an invocable entity
pub struct Callable {
    name: String,
    kind: CallableKind,
    owner: Option<TypeRef>,
    signature: Signature,
    registry: WeakRegistry,
    invoker: Invoker,
}

impl Callable {
    pub(crate) fn new(
        name: &str,
        kind: CallableKind,
        owner: Option<TypeRef>,
        signature: Signature,
        registry: &TypeRegistry,
        invoker: Invoker,
    ) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            owner,
            signature,
            registry: registry.downgrade(),
            invoker,
        }
    }

    /// Callable name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Callable kind
    pub fn kind(&self) -> CallableKind {
        self.kind
    }

    /// Owning type, absent for free functions
    pub fn owner(&self) -> Option<&TypeRef> {
        self.owner.as_ref()
    }

    /// Number of declared arguments
    pub fn arg_count(&self) -> usize {
        self.signature.args.len()
    }

    /// Declared type of argument `index`
    pub fn arg_type(&self, index: usize) -> Option<&TypeRef> {
        self.signature.args.get(index)
    }

    /// Declared argument types
    pub fn arg_types(&self) -> &[TypeRef] {
        &self.signature.args
    }

    /// Declared return type (`void` for unit)
    pub fn return_type(&self) -> &TypeRef {
        &self.signature.ret
    }

    /// Whether the callable runs without a target object
    pub fn is_static(&self) -> bool {
        !self.kind.needs_target()
    }

    /// Invoke a static callable
    pub fn invoke(&self, args: &[Dynamic]) -> ReflectResult<Dynamic> {
        if !self.is_static() {
            return Err(ReflectError::NotCallable(format!(
                "`{}` needs a target object",
                self.name
            )));
        }
        self.call(None, args)
    }

    /// Invoke on a target already adjusted to the owning type
    pub fn invoke_on(&self, target: RawPtr, args: &[Dynamic]) -> ReflectResult<Dynamic> {
        self.call(Some(target), args)
    }

    fn call(&self, target: Option<RawPtr>, args: &[Dynamic]) -> ReflectResult<Dynamic> {
        if args.len() != self.arg_count() {
            return Err(ReflectError::ArgumentCount {
                name: self.name.clone(),
                expected: self.arg_count(),
                got: args.len(),
            });
        }
        let registry = self.registry.upgrade().ok_or(ReflectError::RegistryDropped)?;
        (self.invoker)(&registry, target, args)
    }

    /// Check how well `args` match the declared argument types
    ///
    /// Returns `Some(true)` for an exact match, `Some(false)` when every
    /// argument is at least convertible, `None` otherwise. Null arguments
    /// match any parameter but never exactly.
    pub fn match_args(&self, args: &[Dynamic], registry: &TypeRegistry) -> Option<bool> {
        if args.len() != self.arg_count() {
            return None;
        }
        let mut exact = true;
        for (arg, expected) in args.iter().zip(self.arg_types()) {
            match arg.unboxed().descriptor() {
                None => exact = false,
                Some(actual) if actual.id() == expected.id() => {}
                Some(actual) if registry.can_convert(&actual, expected) => exact = false,
                Some(_) => return None,
            }
        }
        Some(exact)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("owner", &self.owner.as_ref().map(|o| o.name()))
            .field("signature", &self.to_string())
            .finish()
    }
}

impl fmt::Display for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}(", self.return_type().name(), self.name)?;
        for (i, arg) in self.arg_types().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(arg.name())?;
        }
        f.write_str(")")
    }
}

/// Pick the callable best matching `args` among same-named candidates
///
/// An exact type match wins. Otherwise a single candidate with convertible
/// arguments is chosen; several convertible candidates are ambiguous.
pub fn resolve_overload<'a>(
    candidates: impl IntoIterator<Item = &'a Rc<Callable>>,
    name: &str,
    args: &[Dynamic],
    registry: &TypeRegistry,
) -> ReflectResult<Option<Rc<Callable>>> {
    let mut convertible = Vec::new();
    for candidate in candidates.into_iter().filter(|c| c.name() == name) {
        match candidate.match_args(args, registry) {
            Some(true) => return Ok(Some(candidate.clone())),
            Some(false) => convertible.push(candidate),
            None => {}
        }
    }
    match convertible.as_slice() {
        [] => Ok(None),
        [only] => Ok(Some(Rc::clone(only))),
        _ => Err(ReflectError::AmbiguousCall(name.to_owned())),
    }
}
