use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::target::target_addr;
use crate::{OperationDescriptor, Target, TypeDescriptor, Value};

/// Scratch map shared by every interceptor of one call.
///
/// Clones share the same storage, so forked invocations observe each other's
/// writes.
#[derive(Debug, Clone, Default)]
pub struct Attributes(Arc<Mutex<FxHashMap<String, Value>>>);

impl Attributes {
	pub fn get(&self, key: &str) -> Option<Value> {
		self.0.lock().get(key).cloned()
	}

	pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
		self.0.lock().insert(key.into(), value)
	}

	pub fn remove(&self, key: &str) -> Option<Value> {
		self.0.lock().remove(key)
	}

	pub fn contains(&self, key: &str) -> bool {
		self.0.lock().contains_key(key)
	}

	pub fn len(&self) -> usize {
		self.0.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.lock().is_empty()
	}
}

/// What callers believe they invoked.
#[derive(Debug, Clone)]
pub struct FacadeIdentity {
	value: Value,
	exposed: Arc<TypeDescriptor>,
}

impl FacadeIdentity {
	pub fn new(value: Value, exposed: Arc<TypeDescriptor>) -> Self {
		Self { value, exposed }
	}

	pub fn value(&self) -> &Value {
		&self.value
	}

	/// Type the facade presents to callers.
	pub fn exposed(&self) -> &TypeDescriptor {
		&self.exposed
	}
}

/// Everything known about one external call.
///
/// Created once per call by the facade and owned by the engine for the call's
/// lifetime.
#[derive(Clone)]
pub struct CallContext {
	target: Arc<dyn Target>,
	operation: Arc<OperationDescriptor>,
	arguments: Vec<Value>,
	facade: Option<FacadeIdentity>,
	attributes: Attributes,
}

impl CallContext {
	pub fn new(target: Arc<dyn Target>, operation: Arc<OperationDescriptor>, arguments: Vec<Value>) -> Self {
		Self {
			target,
			operation,
			arguments,
			facade: None,
			attributes: Attributes::default(),
		}
	}

	pub fn with_facade(mut self, facade: FacadeIdentity) -> Self {
		self.facade = Some(facade);
		self
	}

	pub fn target(&self) -> &Arc<dyn Target> {
		&self.target
	}

	pub fn target_type(&self) -> &TypeDescriptor {
		self.target.type_descriptor()
	}

	pub fn operation(&self) -> &Arc<OperationDescriptor> {
		&self.operation
	}

	pub fn arguments(&self) -> &[Value] {
		&self.arguments
	}

	pub fn arguments_mut(&mut self) -> &mut Vec<Value> {
		&mut self.arguments
	}

	/// Replaces the whole argument vector.
	pub fn set_arguments(&mut self, arguments: Vec<Value>) {
		self.arguments = arguments;
	}

	pub fn facade(&self) -> Option<&FacadeIdentity> {
		self.facade.as_ref()
	}

	pub fn attributes(&self) -> &Attributes {
		&self.attributes
	}

	pub(crate) fn target_addr(&self) -> *const () {
		target_addr(&self.target)
	}
}

impl std::fmt::Debug for CallContext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CallContext")
			.field("target", &self.target.type_descriptor().name())
			.field("operation", &self.operation.to_string())
			.field("arguments", &self.arguments)
			.field("facade", &self.facade.as_ref().map(|f| f.exposed().name()))
			.finish()
	}
}
