//! Advisor registry and pipeline builder.
//!
//! An [`Advisor`] binds a [`Selector`] to an interceptor plus precedence
//! metadata. Advisors live in an [`AdvisorRegistry`] that publishes immutable
//! snapshots; the [`PipelineBuilder`] resolves and caches the ordered
//! interceptor chain for each (operation, concrete type) pair. A [`Facade`]
//! ties the pieces together for callers that hold only an operation name.
//!
//! # Ordering
//!
//! Advisors with an explicit order sort first, ascending. Advisors without one
//! follow. Members of one registration group stay adjacent and keep their
//! declaration order.

pub mod advice;
mod advisor;
mod error;
pub mod facade;
mod pipeline;
mod registry;
pub mod selector;

#[cfg(test)]
mod fixtures;
#[cfg(test)]
mod invariants;

pub use advice::{after_finally, after_returning, after_throwing, before};
pub use advisor::Advisor;
pub use error::RegistryError;
pub use facade::Facade;
pub use pipeline::{PipelineBuilder, ResolvedChain};
pub use registry::{AdvisorRegistry, RegistrySnapshot};
pub use selector::{OperationMatcher, Selector, SelectorSource, TypeFilter};
