use std::sync::Arc;

use crate::{InvocationError, OperationDescriptor, TypeDescriptor, Value};

/// The real object behind a facade.
///
/// `dispatch` is the terminal call of every chain. It receives the shared
/// handle so an implementation can return itself with
/// [`Value::from_arc`]; the engine then substitutes the facade identity.
pub trait Target: Send + Sync + 'static {
	fn type_descriptor(&self) -> &TypeDescriptor;

	fn dispatch(self: Arc<Self>, operation: &OperationDescriptor, args: &[Value]) -> Result<Value, InvocationError>;
}

/// Address of a target object, comparable with [`Value::addr`].
pub(crate) fn target_addr(target: &Arc<dyn Target>) -> *const () {
	Arc::as_ptr(target) as *const ()
}
