//! Before/after advice adapters.
//!
//! After-style advice observes the outcome by running once `proceed` has
//! returned, never by changing its place in the chain. Around advice is any
//! [`Interceptor`] implementation.

use weave_invocation::{CallContext, Interceptor, Invocation, InvocationError, Value};

/// Runs before the rest of the chain. Returning an error aborts the call.
pub struct Before<F> {
	name: String,
	f: F,
}

impl<F> Interceptor for Before<F>
where
	F: Fn(&mut CallContext) -> Result<(), InvocationError> + Send + Sync,
{
	fn invoke(&self, invocation: &mut Invocation<'_>) -> Result<Value, InvocationError> {
		(self.f)(invocation.context_mut())?;
		invocation.proceed()
	}

	fn name(&self) -> &str {
		&self.name
	}
}

pub fn before<F>(name: impl Into<String>, f: F) -> Before<F>
where
	F: Fn(&mut CallContext) -> Result<(), InvocationError> + Send + Sync,
{
	Before { name: name.into(), f }
}

/// Observes successful results.
pub struct AfterReturning<F> {
	name: String,
	f: F,
}

impl<F> Interceptor for AfterReturning<F>
where
	F: Fn(&CallContext, &Value) + Send + Sync,
{
	fn invoke(&self, invocation: &mut Invocation<'_>) -> Result<Value, InvocationError> {
		let value = invocation.proceed()?;
		(self.f)(invocation.context(), &value);
		Ok(value)
	}

	fn name(&self) -> &str {
		&self.name
	}
}

pub fn after_returning<F>(name: impl Into<String>, f: F) -> AfterReturning<F>
where
	F: Fn(&CallContext, &Value) + Send + Sync,
{
	AfterReturning { name: name.into(), f }
}

/// Observes failures. The error is propagated unchanged afterwards.
pub struct AfterThrowing<F> {
	name: String,
	f: F,
}

impl<F> Interceptor for AfterThrowing<F>
where
	F: Fn(&CallContext, &InvocationError) + Send + Sync,
{
	fn invoke(&self, invocation: &mut Invocation<'_>) -> Result<Value, InvocationError> {
		invocation.proceed().inspect_err(|err| (self.f)(invocation.context(), err))
	}

	fn name(&self) -> &str {
		&self.name
	}
}

pub fn after_throwing<F>(name: impl Into<String>, f: F) -> AfterThrowing<F>
where
	F: Fn(&CallContext, &InvocationError) + Send + Sync,
{
	AfterThrowing { name: name.into(), f }
}

/// Runs after the call regardless of outcome.
pub struct AfterFinally<F> {
	name: String,
	f: F,
}

impl<F> Interceptor for AfterFinally<F>
where
	F: Fn(&CallContext) + Send + Sync,
{
	fn invoke(&self, invocation: &mut Invocation<'_>) -> Result<Value, InvocationError> {
		let result = invocation.proceed();
		(self.f)(invocation.context());
		result
	}

	fn name(&self) -> &str {
		&self.name
	}
}

pub fn after_finally<F>(name: impl Into<String>, f: F) -> AfterFinally<F>
where
	F: Fn(&CallContext) + Send + Sync,
{
	AfterFinally { name: name.into(), f }
}
