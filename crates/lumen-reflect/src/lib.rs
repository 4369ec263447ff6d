//! Lumen Reflection Runtime
//!
//! This crate provides runtime reflection for native Rust types:
//! - Type registry with named descriptors and per-type reflection callbacks
//! - Fields, properties and methods addressable by name on live values
//! - Single and multiple inheritance with pointer adjustment
//! - Type-erased dynamic values (`Dynamic`) with conversion and assignment
//! - Reference-counted managed objects with stable instance identity
//! - JSON object-graph persistence with identity preservation and
//!   legacy-schema migration
//! - Snapshot diffing and a scripting-engine boundary

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod callable;
pub mod config;
pub mod dynamic_object;
pub mod json;
pub mod object;
pub mod script;
pub mod types;
pub mod value;

pub use callable::{Callable, CallableKind};
pub use config::ReflectConfig;
pub use dynamic_object::DynamicObject;
pub use object::{IdLink, IdentityRegistry, Obj, ObjectRef};
pub use types::{
    Attributes, ClassMember, MemberKind, RawPtr, Reflect, TypeBuilder, TypeDescriptor, TypeKey,
    TypeRef, TypeRegistry,
};
pub use value::{BoxedValue, Data, Dynamic, PoolStats};

/// Reflection errors
#[derive(Debug, thiserror::Error)]
pub enum ReflectError {
    /// No type registered under this name
    #[error("Unknown type: {0}")]
    UnknownType(String),

    /// Type has no member with this name
    #[error("Type `{type_name}` has no member `{member}`")]
    MissingMember {
        /// Type that was searched
        type_name: String,
        /// Requested member name
        member: String,
    },

    /// Value cannot be invoked
    #[error("Not callable: {0}")]
    NotCallable(String),

    /// Wrong number of arguments passed to a callable
    #[error("`{name}` expects {expected} argument(s), got {got}")]
    ArgumentCount {
        /// Callable name
        name: String,
        /// Declared argument count
        expected: usize,
        /// Supplied argument count
        got: usize,
    },

    /// No conversion path between two types
    #[error("Cannot convert `{from}` to `{to}`")]
    Conversion {
        /// Source type name
        from: String,
        /// Target type name
        to: String,
    },

    /// Operation requires a non-null value
    #[error("Null value: {0}")]
    NullValue(String),

    /// Property has no getter
    #[error("Property `{0}` is not readable")]
    NotReadable(String),

    /// Property has no setter
    #[error("Property `{0}` is not writable")]
    NotWritable(String),

    /// More than one overload accepts the arguments
    #[error("Ambiguous call to `{0}`")]
    AmbiguousCall(String),

    /// Type has no default constructor
    #[error("Type `{0}` has no default constructor")]
    NoConstructor(String),

    /// Operation not supported by the value or type
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Document does not follow the persisted layout
    #[error("Malformed document: {0}")]
    Malformed(String),

    /// Nesting deeper than the configured limit
    #[error("Maximum nesting depth of {0} exceeded")]
    DepthExceeded(usize),

    /// Type registry was dropped while a descriptor was still in use
    #[error("Type registry is no longer alive")]
    RegistryDropped,

    /// JSON parse or write error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Reflection result
pub type ReflectResult<T> = Result<T, ReflectError>;
