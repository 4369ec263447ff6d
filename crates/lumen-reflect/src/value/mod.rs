//! Dynamic values
//!
//! A [`Dynamic`] is a type-erased, shared handle to a [`BoxedValue`]. Boxed
//! values either own their storage, borrow storage owned by another value,
//! hold a managed object, or are live views of a member of another value.
//!
//! Native types cross the dynamic boundary through the [`Data`] trait.

mod boxed;
mod data;
mod dynamic;
mod pool;

pub use boxed::BoxedValue;
pub use data::Data;
pub use dynamic::Dynamic;
pub use pool::PoolStats;

pub(crate) use boxed::BoxedKind;
pub(crate) use pool::{BoxPool, PoolToken};
