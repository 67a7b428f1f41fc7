//! Declarative transactions driven through facades.

use std::sync::Arc;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use weave_invocation::category::{RECOVERABLE, UNCHECKED};
use weave_invocation::{ErrorCategory, Fault, OperationDescriptor, Target};
use weave_registry::{AdvisorRegistry, Facade, PipelineBuilder};

use super::*;
use crate::memory::{DriverEvent, MemoryStore};
use crate::{NameMatchAttributeSource, Propagation, TransactionAttribute, TransactionDefinition, TransactionError};


type Op = Box<dyn Fn() -> Result<Value, InvocationError> + Send + Sync>;

/// Target whose zero-argument operations run scripted closures.
struct Scripted {
	ty: TypeDescriptor,
	ops: Vec<(String, Op)>,
}

impl Scripted {
	fn new(name: &str) -> Self {
		Self {
			ty: TypeDescriptor::new(name),
			ops: Vec::new(),
		}
	}

	fn op(mut self, name: &str, f: impl Fn() -> Result<Value, InvocationError> + Send + Sync + 'static) -> Self {
		let declaring = self.ty.name().to_string();
		self.ty = self.ty.operation(OperationDescriptor::new(declaring, name));
		self.ops.push((name.to_string(), Box::new(f)));
		self
	}
}

impl Target for Scripted {
	fn type_descriptor(&self) -> &TypeDescriptor {
		&self.ty
	}

	fn dispatch(self: Arc<Self>, operation: &OperationDescriptor, _args: &[Value]) -> Result<Value, InvocationError> {
		let (_, op) = self
			.ops
			.iter()
			.find(|(name, _)| name == operation.name())
			.ok_or_else(|| InvocationError::UnknownOperation {
				type_name: self.ty.name().to_string(),
				operation: operation.name().to_string(),
			})?;
		op()
	}
}

/// Store, manager and advised pipeline shared by one scenario.
struct World {
	store: MemoryStore,
	manager: Arc<TransactionManager<MemoryStore>>,
	pipeline: Arc<PipelineBuilder>,
}

impl World {
	fn new(source: NameMatchAttributeSource) -> Self {
		let store = MemoryStore::new();
		let manager = Arc::new(TransactionManager::new(store.clone()));
		let registry = Arc::new(AdvisorRegistry::new());
		registry
			.register(transaction_advisor("tx", Arc::clone(&manager), Arc::new(source), None))
			.unwrap();
		Self {
			store,
			manager,
			pipeline: Arc::new(PipelineBuilder::new(registry)),
		}
	}

	/// Every operation `REQUIRED`.
	fn required() -> Self {
		Self::new(
			NameMatchAttributeSource::new()
				.add("*", TransactionAttribute::new(TransactionDefinition::new(Propagation::Required)))
				.unwrap(),
		)
	}

	fn facade(&self, target: Scripted) -> Arc<Facade> {
		let exposed = target.ty.clone();
		Facade::new(Arc::new(target), exposed, Arc::clone(&self.pipeline))
	}
}

/// Operation body writing `key` through the bound unit.
fn write(store: &MemoryStore, key: &'static str) -> impl Fn() -> Result<Value, InvocationError> + Send + Sync + 'static {
	let store = store.clone();
	move || {
		store.put(key, "1").map_err(InvocationError::interceptor)?;
		Ok(Value::unit())
	}
}

/// Operation body writing `key` and then failing with `category`.
fn write_then_fail(
	store: &MemoryStore,
	key: &'static str,
	category: &'static ErrorCategory,
) -> impl Fn() -> Result<Value, InvocationError> + Send + Sync + 'static {
	let write = write(store, key);
	move || {
		write()?;
		Err(Fault::new(category, format!("{key} failed")).into())
	}
}

fn keys(store: &MemoryStore) -> Vec<String> {
	store.committed().into_keys().collect()
}

fn transaction_error(err: &InvocationError) -> Option<&TransactionError> {
	err.downcast_ref::<TransactionError>()
}
