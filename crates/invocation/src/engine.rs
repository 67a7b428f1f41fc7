//! Cursor-driven chain execution.
//!
//! # Role
//!
//! Runs one [`CallContext`] through an immutable slice of interceptors. The
//! cursor starts at zero; each [`Invocation::proceed`] call hands control to
//! the interceptor under the cursor and advances it, or dispatches to the
//! target once the slice is exhausted.
//!
//! # Invariants
//!
//! - The cursor only moves forward. A second `proceed` from the same
//!   interceptor, after the rest of the chain has run, dispatches straight to
//!   the target. Interceptors that need the remaining chain again call
//!   [`Invocation::fork`] before proceeding.
//! - Errors from interceptors or the target reach the caller unchanged.
//! - An empty chain dispatches directly without building an invocation.
//! - A target returning itself is replaced by the facade identity when the
//!   declared return type accepts the facade's exposed type.

use std::sync::Arc;

use tracing::trace;

use crate::{CallContext, Interceptor, InvocationError, Value};

/// One in-flight pass through an interceptor chain.
pub struct Invocation<'a> {
	context: CallContext,
	chain: &'a [Arc<dyn Interceptor>],
	cursor: usize,
}

impl<'a> Invocation<'a> {
	pub fn new(context: CallContext, chain: &'a [Arc<dyn Interceptor>]) -> Self {
		Self { context, chain, cursor: 0 }
	}

	/// Continues with the next interceptor, or calls the target when none remain.
	pub fn proceed(&mut self) -> Result<Value, InvocationError> {
		let chain = self.chain;
		let Some(interceptor) = chain.get(self.cursor) else {
			return dispatch_target(&self.context);
		};
		let index = self.cursor;
		self.cursor += 1;
		trace!(interceptor = interceptor.name(), index, operation = self.context.operation().name(), "invocation.enter");
		let result = interceptor.invoke(self);
		trace!(interceptor = interceptor.name(), index, ok = result.is_ok(), "invocation.exit");
		result
	}

	/// Independent copy positioned at the same cursor.
	///
	/// The argument vector is copied so forks can diverge; the attribute map
	/// is shared.
	pub fn fork(&self) -> Invocation<'a> {
		Self {
			context: self.context.clone(),
			chain: self.chain,
			cursor: self.cursor,
		}
	}

	pub fn context(&self) -> &CallContext {
		&self.context
	}

	pub fn context_mut(&mut self) -> &mut CallContext {
		&mut self.context
	}

	pub fn arguments(&self) -> &[Value] {
		self.context.arguments()
	}

	pub fn set_arguments(&mut self, arguments: Vec<Value>) {
		self.context.set_arguments(arguments);
	}

	pub fn cursor(&self) -> usize {
		self.cursor
	}

	/// Interceptors not yet entered by this invocation.
	pub fn remaining(&self) -> usize {
		self.chain.len().saturating_sub(self.cursor)
	}
}

impl std::fmt::Debug for Invocation<'_> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Invocation")
			.field("context", &self.context)
			.field("cursor", &self.cursor)
			.field("chain_len", &self.chain.len())
			.finish()
	}
}

/// Runs `context` through `chain` and returns the call's result.
pub fn invoke(context: CallContext, chain: &[Arc<dyn Interceptor>]) -> Result<Value, InvocationError> {
	if chain.is_empty() {
		trace!(operation = %context.operation(), "invocation.direct");
		let result = dispatch_target(&context)?;
		return Ok(substitute_identity(&context, result));
	}

	let mut invocation = Invocation::new(context, chain);
	let result = invocation.proceed()?;
	Ok(substitute_identity(invocation.context(), result))
}

/// Replaces a self-returned target with the facade identity.
///
/// Applies only when the context carries a facade, `result` is the target
/// object itself, and the operation's declared return type accepts the
/// facade's exposed type. Any other result is returned untouched.
pub fn substitute_identity(context: &CallContext, result: Value) -> Value {
	let Some(facade) = context.facade() else {
		return result;
	};
	if !std::ptr::eq(result.addr(), context.target_addr()) {
		return result;
	}
	match context.operation().return_type() {
		Some(return_type) if facade.exposed().is_assignable_to(return_type) => {
			trace!(operation = %context.operation(), "invocation.identity_substituted");
			facade.value().clone()
		}
		_ => result,
	}
}

fn dispatch_target(context: &CallContext) -> Result<Value, InvocationError> {
	let operation = context.operation();
	let actual = context.arguments().len();
	if actual != operation.arity() {
		return Err(InvocationError::ArgumentMismatch {
			operation: operation.to_string(),
			expected: operation.arity(),
			actual,
		});
	}
	Arc::clone(context.target()).dispatch(operation, context.arguments())
}
