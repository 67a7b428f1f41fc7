use crate::{Invocation, InvocationError, Value};

/// Cross-cutting behavior applied around a call.
///
/// An interceptor may return without calling [`Invocation::proceed`], call it
/// any number of times, rewrite the arguments first, or translate the error
/// it gets back. Work done after `proceed` returns runs in reverse chain
/// order, exactly like nested function calls.
pub trait Interceptor: Send + Sync {
	fn invoke(&self, invocation: &mut Invocation<'_>) -> Result<Value, InvocationError>;

	/// Label used in traces.
	fn name(&self) -> &str {
		std::any::type_name::<Self>()
	}
}

/// Interceptor backed by a closure.
pub struct FnInterceptor<F> {
	name: String,
	f: F,
}

impl<F> Interceptor for FnInterceptor<F>
where
	F: Fn(&mut Invocation<'_>) -> Result<Value, InvocationError> + Send + Sync,
{
	fn invoke(&self, invocation: &mut Invocation<'_>) -> Result<Value, InvocationError> {
		(self.f)(invocation)
	}

	fn name(&self) -> &str {
		&self.name
	}
}

/// Builds an interceptor from a closure.
pub fn interceptor_fn<F>(name: impl Into<String>, f: F) -> FnInterceptor<F>
where
	F: Fn(&mut Invocation<'_>) -> Result<Value, InvocationError> + Send + Sync,
{
	FnInterceptor { name: name.into(), f }
}
