//! Scripting-engine boundary
//!
//! A script engine sees reflected values through three per-type hooks:
//! converting a native value into a script value, testing whether a script
//! value fits a type, and boxing a script value back into a [`Dynamic`].
//! The hooks live in a [`ScriptBindings`] side table keyed by type id, so
//! several engines can bind the same registry.
//!
//! Script code never gets called from here; the engine layer drives member
//! access, assignment and invocation through the helpers below.

use crate::types::{TypeDescriptor, TypeKey, TypeRegistry};
use crate::value::{Data, Dynamic};
use crate::{ReflectError, ReflectResult};
use rustc_hash::FxHashMap;
use serde_json::Value;

/// A scripting engine's value representation
pub trait ScriptEngine: 'static {
    /// Value type handled by the engine
    type Value: Clone + 'static;
}

/// Native type exchangeable with engine `E`
pub trait ScriptConvert<E: ScriptEngine>: Data {
    /// Convert to a script value
    fn to_script(&self) -> E::Value;

    /// Check whether a script value can become `Self`
    fn is_script_value(value: &E::Value) -> bool;

    /// Convert from a script value
    fn from_script(value: &E::Value) -> Option<Self>;
}

struct Hooks<E: ScriptEngine> {
    to_script: fn(&Dynamic) -> Option<E::Value>,
    is_compatible: fn(&E::Value) -> bool,
    box_value: fn(&E::Value, &TypeRegistry) -> Option<Dynamic>,
}

fn to_script_hook<E: ScriptEngine, T: ScriptConvert<E>>(value: &Dynamic) -> Option<E::Value> {
    value.with_ref(<T as ScriptConvert<E>>::to_script).ok()
}

fn box_value_hook<E: ScriptEngine, T: ScriptConvert<E>>(
    value: &E::Value,
    registry: &TypeRegistry,
) -> Option<Dynamic> {
    <T as ScriptConvert<E>>::from_script(value).map(|native| registry.wrap(native))
}

/// Per-type script hooks for one engine
pub struct ScriptBindings<E: ScriptEngine> {
    registry: TypeRegistry,
    hooks: FxHashMap<TypeKey, Hooks<E>>,
    /// Bound types in binding order; `Any` targets try them in turn
    order: Vec<TypeKey>,
}

impl<E: ScriptEngine> ScriptBindings<E> {
    /// Empty bindings over `registry`
    pub fn new(registry: &TypeRegistry) -> Self {
        Self {
            registry: registry.clone(),
            hooks: FxHashMap::default(),
            order: Vec::new(),
        }
    }

    /// Install the hooks of `T`
    pub fn bind<T: ScriptConvert<E>>(&mut self) -> &mut Self {
        let id = T::declared_type(&self.registry).id();
        let hooks = Hooks {
            to_script: to_script_hook::<E, T>,
            is_compatible: <T as ScriptConvert<E>>::is_script_value,
            box_value: box_value_hook::<E, T>,
        };
        if self.hooks.insert(id, hooks).is_none() {
            self.order.push(id);
        }
        self
    }

    /// Check whether `ty` has hooks installed
    pub fn is_bound(&self, ty: &TypeDescriptor) -> bool {
        self.hooks.contains_key(&ty.id())
    }

    /// Convert a value to a script value; views are read first
    ///
    /// Returns `None` for null values and unbound types.
    pub fn to_script(&self, value: &Dynamic) -> Option<E::Value> {
        let value = value.unboxed();
        let hooks = self.hooks.get(&value.descriptor()?.id())?;
        (hooks.to_script)(&value)
    }

    /// Check whether a script value can be boxed as `ty`
    pub fn is_compatible(&self, value: &E::Value, ty: &TypeDescriptor) -> bool {
        if self.registry.is_any(ty) {
            return self.any_hooks(value).is_some();
        }
        self.hooks
            .get(&ty.id())
            .is_some_and(|hooks| (hooks.is_compatible)(value))
    }

    /// Box a script value as `ty`
    ///
    /// An `Any` target takes the first bound type accepting the value.
    pub fn box_value(&self, value: &E::Value, ty: &TypeDescriptor) -> ReflectResult<Dynamic> {
        let hooks = if self.registry.is_any(ty) {
            self.any_hooks(value)
        } else {
            self.hooks.get(&ty.id()).filter(|h| (h.is_compatible)(value))
        };
        hooks
            .and_then(|hooks| (hooks.box_value)(value, &self.registry))
            .ok_or_else(|| ReflectError::Conversion {
                from: "script value".to_owned(),
                to: ty.name().to_owned(),
            })
    }

    fn any_hooks(&self, value: &E::Value) -> Option<&Hooks<E>> {
        self.order
            .iter()
            .filter_map(|id| self.hooks.get(id))
            .find(|hooks| (hooks.is_compatible)(value))
    }

    /// Assign a script value to `target`, boxed through its declared type
    pub fn assign_from_script(&self, target: &Dynamic, value: &E::Value) -> ReflectResult<()> {
        let ty = target
            .descriptor()
            .ok_or_else(|| ReflectError::NullValue("script assignment".to_owned()))?;
        let boxed = self.box_value(value, &ty)?;
        target.set(&boxed)
    }

    /// Invoke a method view with script arguments
    ///
    /// Each argument is boxed through the declared argument type. A null
    /// result comes back as `None`.
    pub fn invoke_from_script(&self, method: &Dynamic, args: &[E::Value]) -> ReflectResult<Option<E::Value>> {
        let callable = method
            .raw()
            .and_then(|boxed| boxed.callable().cloned())
            .ok_or_else(|| ReflectError::NotCallable(method.type_name().unwrap_or_default()))?;
        if callable.arg_count() != args.len() {
            return Err(ReflectError::ArgumentCount {
                name: callable.name().to_owned(),
                expected: callable.arg_count(),
                got: args.len(),
            });
        }
        let boxed = callable
            .arg_types()
            .iter()
            .zip(args)
            .map(|(ty, arg)| self.box_value(arg, ty))
            .collect::<ReflectResult<Vec<_>>>()?;
        let result = method.invoke(&boxed)?;
        Ok(self.to_script(&result))
    }
}

/// Engine whose script values are JSON values
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonScript;

impl ScriptEngine for JsonScript {
    type Value = Value;
}

impl ScriptBindings<JsonScript> {
    /// JSON bindings for booleans, numbers and strings
    pub fn json(registry: &TypeRegistry) -> Self {
        let mut bindings = Self::new(registry);
        bindings
            .bind::<bool>()
            .bind::<i32>()
            .bind::<i64>()
            .bind::<u64>()
            .bind::<f64>()
            .bind::<f32>()
            .bind::<String>();
        bindings
    }
}

impl ScriptConvert<JsonScript> for bool {
    fn to_script(&self) -> Value {
        Value::Bool(*self)
    }

    fn is_script_value(value: &Value) -> bool {
        value.is_boolean()
    }

    fn from_script(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

macro_rules! json_integer {
    ($($t:ty => $read:ident),* $(,)?) => {
        $(
            impl ScriptConvert<JsonScript> for $t {
                fn to_script(&self) -> Value {
                    Value::from(*self)
                }

                fn is_script_value(value: &Value) -> bool {
                    Self::from_script(value).is_some()
                }

                fn from_script(value: &Value) -> Option<Self> {
                    value.$read().and_then(|n| <$t>::try_from(n).ok())
                }
            }
        )*
    };
}

json_integer! {
    i32 => as_i64,
    i64 => as_i64,
    u64 => as_u64,
}

impl ScriptConvert<JsonScript> for f64 {
    fn to_script(&self) -> Value {
        Value::from(*self)
    }

    fn is_script_value(value: &Value) -> bool {
        value.is_number()
    }

    fn from_script(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl ScriptConvert<JsonScript> for f32 {
    fn to_script(&self) -> Value {
        Value::from(f64::from(*self))
    }

    fn is_script_value(value: &Value) -> bool {
        value.is_number()
    }

    fn from_script(value: &Value) -> Option<Self> {
        value.as_f64().map(|n| n as f32)
    }
}

impl ScriptConvert<JsonScript> for String {
    fn to_script(&self) -> Value {
        Value::String(self.clone())
    }

    fn is_script_value(value: &Value) -> bool {
        value.is_string()
    }

    fn from_script(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Reflect, TypeBuilder};
    use serde_json::json;

    #[derive(Debug, Clone, Default)]
    struct Counter {
        value: i32,
        label: String,
    }

    impl Data for Counter {}

    impl Reflect for Counter {
        const TYPE_NAME: &'static str = "Counter";

        fn reflect(builder: &mut TypeBuilder<'_, Self>) {
            builder.default_constructor();
            builder.field("value", |c| &mut c.value);
            builder.field("label", |c| &mut c.label);
            builder.method("Add", |c: &mut Counter, amount: i32| {
                c.value += amount;
                c.value
            });
        }
    }

    fn setup() -> (TypeRegistry, ScriptBindings<JsonScript>) {
        let registry = TypeRegistry::new();
        registry.register::<Counter>();
        registry.reflect_all();
        let bindings = ScriptBindings::json(&registry);
        (registry, bindings)
    }

    #[test]
    fn test_to_script_reads_views() {
        let (registry, bindings) = setup();
        let counter = registry.wrap(Counter {
            value: 4,
            label: "hits".to_owned(),
        });
        assert_eq!(bindings.to_script(&counter.member("value")), Some(json!(4)));
        assert_eq!(bindings.to_script(&counter.member("label")), Some(json!("hits")));
        assert_eq!(bindings.to_script(&counter), None);
        assert_eq!(bindings.to_script(&Dynamic::null()), None);
    }

    #[test]
    fn test_compatibility() {
        let (registry, bindings) = setup();
        let i32_type = registry.descriptor_of::<i32>();
        assert!(bindings.is_bound(&i32_type));
        assert!(bindings.is_compatible(&json!(7), &i32_type));
        assert!(!bindings.is_compatible(&json!(5_000_000_000i64), &i32_type));
        assert!(!bindings.is_compatible(&json!("7"), &i32_type));
        assert!(bindings.is_compatible(&json!("7"), &registry.any_type()));
        assert!(!bindings.is_compatible(&json!([1]), &registry.any_type()));
    }

    #[test]
    fn test_box_value_for_any_uses_binding_order() {
        let (registry, bindings) = setup();
        let boxed = bindings.box_value(&json!(3), &registry.any_type()).unwrap();
        assert_eq!(boxed.type_name().as_deref(), Some("i32"));
        let boxed = bindings.box_value(&json!(0.5), &registry.any_type()).unwrap();
        assert_eq!(boxed.type_name().as_deref(), Some("f64"));
        assert!(bindings.box_value(&json!(null), &registry.any_type()).is_err());
    }

    #[test]
    fn test_assign_from_script() {
        let (registry, bindings) = setup();
        let counter = registry.wrap(Counter::default());
        bindings.assign_from_script(&counter.member("value"), &json!(12)).unwrap();
        bindings.assign_from_script(&counter.member("label"), &json!("set")).unwrap();
        assert_eq!(counter.member("value").extract::<i32>().unwrap(), 12);
        assert_eq!(counter.member("label").extract::<String>().unwrap(), "set");

        let result = bindings.assign_from_script(&counter.member("value"), &json!("twelve"));
        assert!(matches!(result, Err(ReflectError::Conversion { .. })));
    }

    #[test]
    fn test_invoke_from_script() {
        let (registry, bindings) = setup();
        let counter = registry.wrap(Counter::default());
        let add = counter.member("Add");
        assert_eq!(bindings.invoke_from_script(&add, &[json!(2)]).unwrap(), Some(json!(2)));
        assert_eq!(bindings.invoke_from_script(&add, &[json!(3)]).unwrap(), Some(json!(5)));
        assert!(matches!(
            bindings.invoke_from_script(&add, &[]),
            Err(ReflectError::ArgumentCount { expected: 1, got: 0, .. })
        ));
        assert!(bindings.invoke_from_script(&counter.member("value"), &[]).is_err());
    }
}
