//! Dynamic facade over a target.
//!
//! Callers invoke operations by name; the facade builds the
//! [`CallContext`], resolves the chain and runs the engine. A target that
//! returns itself hands the facade back to the caller, so follow-up calls
//! stay advised.

use std::fmt;
use std::sync::{Arc, Weak};

use tracing::trace;
use weave_invocation::{CallContext, FacadeIdentity, InvocationError, Target, TypeDescriptor, Value, invoke};

use crate::PipelineBuilder;

/// Identity value handed out for a facade.
struct FacadeRef(Weak<Facade>);

pub struct Facade {
	target: Arc<dyn Target>,
	exposed: Arc<TypeDescriptor>,
	pipeline: Arc<PipelineBuilder>,
	identity: Value,
}

impl Facade {
	/// Wraps `target`, presenting it to callers as `exposed`.
	pub fn new(target: Arc<dyn Target>, exposed: TypeDescriptor, pipeline: Arc<PipelineBuilder>) -> Arc<Self> {
		Arc::new_cyclic(|weak| Self {
			target,
			exposed: Arc::new(exposed),
			pipeline,
			identity: Value::new(FacadeRef(Weak::clone(weak))),
		})
	}

	/// Recovers the facade behind an identity value returned from a call.
	pub fn resolve(value: &Value) -> Option<Arc<Facade>> {
		value.downcast_ref::<FacadeRef>()?.0.upgrade()
	}

	/// The value callers hold as "this object".
	pub fn identity(&self) -> &Value {
		&self.identity
	}

	pub fn exposed(&self) -> &TypeDescriptor {
		&self.exposed
	}

	pub fn target(&self) -> &Arc<dyn Target> {
		&self.target
	}

	/// Invokes operation `name` with `args` through the advice chain.
	pub fn call(&self, name: &str, args: Vec<Value>) -> Result<Value, InvocationError> {
		let ty = self.target.type_descriptor();
		let operation = ty
			.find_operation(name, args.len())
			.cloned()
			.ok_or_else(|| InvocationError::UnknownOperation {
				type_name: ty.name().to_string(),
				operation: name.to_string(),
			})?;
		let chain = self.pipeline.resolve(&operation, ty);
		trace!(operation = %operation, advisors = chain.len(), "facade.call");

		let context = CallContext::new(Arc::clone(&self.target), operation, args)
			.with_facade(FacadeIdentity::new(self.identity.clone(), Arc::clone(&self.exposed)));
		invoke(context, chain.interceptors())
	}
}

impl fmt::Debug for Facade {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Facade")
			.field("target", &self.target.type_descriptor().name())
			.field("exposed", &self.exposed.name())
			.finish()
	}
}
