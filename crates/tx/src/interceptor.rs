//! Declarative transaction demarcation as an interceptor.
//!
//! # Role
//!
//! Looks up the [`TransactionAttribute`] for the advised call, opens a
//! [`TransactionScope`](crate::TransactionScope) around `proceed`, and
//! completes it from the outcome: commit on success, rollback rules on
//! failure.
//!
//! # Invariants
//!
//! - Operations without an attribute pass straight through.
//! - The business failure reaches the caller unchanged unless completing the
//!   unit fails, in which case the transaction error wins.

use std::sync::Arc;

use tracing::trace;
use weave_invocation::{Interceptor, Invocation, InvocationError, OperationDescriptor, TypeDescriptor, Value};
use weave_registry::{Advisor, OperationMatcher, Selector, TypeFilter};

use crate::{ResourceDriver, TransactionAttributeSource, TransactionManager};

/// Call attribute holding the `Type.operation` label of the advised call.
pub const JOINPOINT_ATTRIBUTE: &str = "weave.tx.joinpoint";

pub struct TransactionInterceptor<D: ResourceDriver, S> {
	manager: Arc<TransactionManager<D>>,
	source: Arc<S>,
}

impl<D: ResourceDriver, S: TransactionAttributeSource> TransactionInterceptor<D, S> {
	pub fn new(manager: Arc<TransactionManager<D>>, source: Arc<S>) -> Self {
		Self { manager, source }
	}

	pub fn manager(&self) -> &Arc<TransactionManager<D>> {
		&self.manager
	}

	fn joinpoint(invocation: &Invocation<'_>) -> String {
		let attributes = invocation.context().attributes();
		if let Some(label) = attributes.get(JOINPOINT_ATTRIBUTE).and_then(|v| v.downcast_ref::<String>().cloned()) {
			return label;
		}
		let label = format!(
			"{}.{}",
			invocation.context().target_type().name(),
			invocation.context().operation().name()
		);
		attributes.insert(JOINPOINT_ATTRIBUTE, Value::from(label.clone()));
		label
	}
}

impl<D: ResourceDriver, S: TransactionAttributeSource> Interceptor for TransactionInterceptor<D, S> {
	fn invoke(&self, invocation: &mut Invocation<'_>) -> Result<Value, InvocationError> {
		let attribute = {
			let context = invocation.context();
			self.source.attribute(context.operation(), context.target_type())
		};
		let Some(attribute) = attribute else {
			return invocation.proceed();
		};

		let joinpoint = Self::joinpoint(invocation);
		let mut definition = attribute.definition.clone();
		if definition.name.is_none() {
			definition.name = Some(joinpoint.clone());
		}
		trace!(joinpoint = %joinpoint, propagation = definition.propagation.as_str(), "transaction.invoke");

		let scope = self.manager.scope(&definition).map_err(InvocationError::interceptor)?;
		match invocation.proceed() {
			Ok(value) => {
				scope.commit().map_err(InvocationError::interceptor)?;
				Ok(value)
			}
			Err(failure) => match scope.complete_after_failure(&attribute, &failure) {
				Ok(()) => Err(failure),
				Err(err) => Err(InvocationError::interceptor(err)),
			},
		}
	}

	fn name(&self) -> &str {
		"transaction"
	}
}

struct SourceTypeFilter<S>(Arc<S>);

impl<S: TransactionAttributeSource> TypeFilter for SourceTypeFilter<S> {
	fn matches(&self, ty: &TypeDescriptor) -> bool {
		self.0.is_candidate(ty)
	}
}

struct SourceMatcher<S>(Arc<S>);

impl<S: TransactionAttributeSource> OperationMatcher for SourceMatcher<S> {
	fn matches(&self, operation: &OperationDescriptor, ty: &TypeDescriptor) -> bool {
		self.0.attribute(operation, ty).is_some()
	}
}

/// Advisor applying a [`TransactionInterceptor`] to every operation `source`
/// has an attribute for.
pub fn transaction_advisor<D, S>(
	id: impl Into<Arc<str>>,
	manager: Arc<TransactionManager<D>>,
	source: Arc<S>,
	order: Option<i32>,
) -> Advisor
where
	D: ResourceDriver,
	S: TransactionAttributeSource + 'static,
{
	let selector = Selector::new(SourceTypeFilter(Arc::clone(&source)), SourceMatcher(Arc::clone(&source)));
	let advisor = Advisor::new(id, selector, Arc::new(TransactionInterceptor::new(manager, source)));
	match order {
		Some(order) => advisor.with_order(order),
		None => advisor,
	}
}

#[cfg(test)]
mod tests;
