use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Shared, type-erased value passed as an argument or returned from a call.
///
/// Cloning is cheap and preserves identity: two clones of the same value are
/// [`Value::ptr_eq`]. Identity is what the engine uses to detect a target
/// returning itself.
#[derive(Clone)]
pub struct Value(Arc<dyn Any + Send + Sync>);

impl Value {
	/// Wraps a new value.
	pub fn new<T: Any + Send + Sync>(value: T) -> Self {
		Self(Arc::new(value))
	}

	/// Wraps an existing shared object, keeping its identity.
	pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
		Self(value)
	}

	/// The unit value, returned by operations without a result.
	pub fn unit() -> Self {
		Self::new(())
	}

	pub fn is_unit(&self) -> bool {
		self.0.is::<()>()
	}

	pub fn is<T: Any>(&self) -> bool {
		self.0.is::<T>()
	}

	pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
		self.0.downcast_ref::<T>()
	}

	/// Returns the shared object if it has type `T`.
	pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
		Arc::clone(&self.0).downcast::<T>().ok()
	}

	/// Address of the underlying object, used for identity comparisons.
	pub fn addr(&self) -> *const () {
		Arc::as_ptr(&self.0) as *const ()
	}

	/// Returns true when both values refer to the same object.
	pub fn ptr_eq(&self, other: &Value) -> bool {
		std::ptr::eq(self.addr(), other.addr())
	}
}

impl fmt::Debug for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.is_unit() {
			return f.write_str("Value(())");
		}
		if let Some(s) = self.downcast_ref::<String>() {
			return write!(f, "Value({s:?})");
		}
		if let Some(n) = self.downcast_ref::<i64>() {
			return write!(f, "Value({n})");
		}
		write!(f, "Value({:p})", self.addr())
	}
}

impl From<String> for Value {
	fn from(value: String) -> Self {
		Self::new(value)
	}
}

impl From<&str> for Value {
	fn from(value: &str) -> Self {
		Self::new(value.to_string())
	}
}

impl From<i64> for Value {
	fn from(value: i64) -> Self {
		Self::new(value)
	}
}

impl From<bool> for Value {
	fn from(value: bool) -> Self {
		Self::new(value)
	}
}
