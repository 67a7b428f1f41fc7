//! Call contexts and the interception engine.
//!
//! Every advised call is turned into a [`CallContext`] by a facade and executed
//! by [`invoke`] against an ordered slice of [`Interceptor`]s. Each interceptor
//! decides whether and how often to continue via [`Invocation::proceed`]; once
//! the cursor is exhausted the call is dispatched to the [`Target`].

/// Error categories used to classify failures.
pub mod category;
/// Per-call context and the shared attribute map.
pub mod context;
/// Type and operation descriptors supplied by facades.
pub mod descriptor;
/// Cursor-driven execution of interceptor chains.
pub mod engine;
/// Invocation error taxonomy.
pub mod error;
/// Interceptor trait and closure adapter.
pub mod interceptor;
/// Terminal dispatch target trait.
pub mod target;
/// Type-erased call values.
pub mod value;

#[cfg(test)]
mod invariants;

pub use category::ErrorCategory;
pub use context::{Attributes, CallContext, FacadeIdentity};
pub use descriptor::{OperationDescriptor, TypeDescriptor};
pub use engine::{Invocation, invoke, substitute_identity};
pub use error::{Fault, InvocationError};
pub use interceptor::{FnInterceptor, Interceptor, interceptor_fn};
pub use target::Target;
pub use value::Value;
