//! Marshaling wrappers
//!
//! Turns native functions and closures of up to six arguments into
//! type-erased invokers. The marker type parameter carries the native
//! signature so a single registration method accepts any arity.

use crate::types::{RawPtr, TypeRef, TypeRegistry};
use crate::value::{Data, Dynamic};
use crate::{ReflectError, ReflectResult};
use std::slice;

/// Type-erased invocation: registry, adjusted target, arguments
#[doc(hidden)]
pub type Invoker =
    Box<dyn Fn(&TypeRegistry, Option<RawPtr>, &[Dynamic]) -> ReflectResult<Dynamic>>;

/// Declared argument and return types
#[doc(hidden)]
pub struct Signature {
    pub(crate) args: Vec<TypeRef>,
    pub(crate) ret: TypeRef,
}

/// A free or static function
pub trait IntoFunction<Marker>: 'static {
    #[doc(hidden)]
    fn signature(registry: &TypeRegistry) -> Signature;
    #[doc(hidden)]
    fn into_invoker(self) -> Invoker;
}

/// A method taking `&mut T`
pub trait IntoMethod<T, Marker>: 'static {
    #[doc(hidden)]
    fn signature(registry: &TypeRegistry) -> Signature;
    #[doc(hidden)]
    fn into_invoker(self) -> Invoker;
}

/// A method taking `&T`
pub trait IntoConstMethod<T, Marker>: 'static {
    #[doc(hidden)]
    fn signature(registry: &TypeRegistry) -> Signature;
    #[doc(hidden)]
    fn into_invoker(self) -> Invoker;
}

/// A function producing a new `T`
pub trait IntoConstructor<T, Marker>: 'static {
    #[doc(hidden)]
    fn signature(registry: &TypeRegistry) -> Signature;
    #[doc(hidden)]
    fn into_invoker(self) -> Invoker;
}

fn next_arg<'a>(args: &mut slice::Iter<'a, Dynamic>) -> ReflectResult<&'a Dynamic> {
    args.next()
        .ok_or_else(|| ReflectError::Unsupported("argument list exhausted".to_owned()))
}

fn require_target(target: Option<RawPtr>) -> ReflectResult<RawPtr> {
    target.ok_or_else(|| ReflectError::NullValue("method called without a target".to_owned()))
}

macro_rules! impl_into_callable {
    ($($arg:ident $val:ident),*) => {
        impl<F, R, $($arg,)*> IntoFunction<fn($($arg,)*) -> R> for F
        where
            F: Fn($($arg,)*) -> R + 'static,
            R: Data,
            $($arg: Data,)*
        {
            fn signature(registry: &TypeRegistry) -> Signature {
                Signature {
                    args: vec![$(<$arg as Data>::declared_type(registry),)*],
                    ret: R::declared_type(registry),
                }
            }

            #[allow(unused_variables, unused_mut)]
            fn into_invoker(self) -> Invoker {
                Box::new(move |registry, _target, args| {
                    let mut args = args.iter();
                    $(let $val = <$arg as Data>::from_dynamic(next_arg(&mut args)?, registry)?;)*
                    Ok(self($($val,)*).into_dynamic(registry))
                })
            }
        }

        impl<T, F, R, $($arg,)*> IntoMethod<T, fn(&mut T, $($arg,)*) -> R> for F
        where
            T: 'static,
            F: Fn(&mut T, $($arg,)*) -> R + 'static,
            R: Data,
            $($arg: Data,)*
        {
            fn signature(registry: &TypeRegistry) -> Signature {
                Signature {
                    args: vec![$(<$arg as Data>::declared_type(registry),)*],
                    ret: R::declared_type(registry),
                }
            }

            #[allow(unused_variables, unused_mut)]
            fn into_invoker(self) -> Invoker {
                Box::new(move |registry, target, args| {
                    let target = require_target(target)?;
                    let mut args = args.iter();
                    $(let $val = <$arg as Data>::from_dynamic(next_arg(&mut args)?, registry)?;)*
                    // SAFETY: callers adjust `target` to the method's owning type.
                    let object = unsafe { &mut *target.cast::<T>().as_ptr() };
                    Ok(self(object, $($val,)*).into_dynamic(registry))
                })
            }
        }

        impl<T, F, R, $($arg,)*> IntoConstMethod<T, fn(&T, $($arg,)*) -> R> for F
        where
            T: 'static,
            F: Fn(&T, $($arg,)*) -> R + 'static,
            R: Data,
            $($arg: Data,)*
        {
            fn signature(registry: &TypeRegistry) -> Signature {
                Signature {
                    args: vec![$(<$arg as Data>::declared_type(registry),)*],
                    ret: R::declared_type(registry),
                }
            }

            #[allow(unused_variables, unused_mut)]
            fn into_invoker(self) -> Invoker {
                Box::new(move |registry, target, args| {
                    let target = require_target(target)?;
                    let mut args = args.iter();
                    $(let $val = <$arg as Data>::from_dynamic(next_arg(&mut args)?, registry)?;)*
                    // SAFETY: callers adjust `target` to the method's owning type.
                    let object = unsafe { target.cast::<T>().as_ref() };
                    Ok(self(object, $($val,)*).into_dynamic(registry))
                })
            }
        }

        impl<T, F, $($arg,)*> IntoConstructor<T, fn($($arg,)*) -> T> for F
        where
            T: 'static,
            F: Fn($($arg,)*) -> T + 'static,
            $($arg: Data,)*
        {
            fn signature(registry: &TypeRegistry) -> Signature {
                Signature {
                    args: vec![$(<$arg as Data>::declared_type(registry),)*],
                    ret: registry.descriptor_of::<T>(),
                }
            }

            #[allow(unused_variables, unused_mut)]
            fn into_invoker(self) -> Invoker {
                Box::new(move |registry, _target, args| {
                    let mut args = args.iter();
                    $(let $val = <$arg as Data>::from_dynamic(next_arg(&mut args)?, registry)?;)*
                    Ok(Dynamic::construct(registry, self($($val,)*)))
                })
            }
        }
    };
}

impl_into_callable!();
impl_into_callable!(A1 a1);
impl_into_callable!(A1 a1, A2 a2);
impl_into_callable!(A1 a1, A2 a2, A3 a3);
impl_into_callable!(A1 a1, A2 a2, A3 a3, A4 a4);
impl_into_callable!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5);
impl_into_callable!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6);
