use std::fmt;
use std::sync::Arc;

/// Structured description of one operation, supplied up front by the facade.
///
/// Two descriptors are equal when declaring type, name, parameter types and
/// return type all match, which makes them usable as cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationDescriptor {
	declaring_type: String,
	name: String,
	parameter_types: Vec<String>,
	return_type: Option<String>,
}

impl OperationDescriptor {
	/// Creates a descriptor for an operation without parameters or result.
	pub fn new(declaring_type: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			declaring_type: declaring_type.into(),
			name: name.into(),
			parameter_types: Vec::new(),
			return_type: None,
		}
	}

	/// Appends a parameter type.
	pub fn param(mut self, type_name: impl Into<String>) -> Self {
		self.parameter_types.push(type_name.into());
		self
	}

	/// Sets the declared return type.
	pub fn returns(mut self, type_name: impl Into<String>) -> Self {
		self.return_type = Some(type_name.into());
		self
	}

	pub fn declaring_type(&self) -> &str {
		&self.declaring_type
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn parameter_types(&self) -> &[String] {
		&self.parameter_types
	}

	pub fn arity(&self) -> usize {
		self.parameter_types.len()
	}

	pub fn return_type(&self) -> Option<&str> {
		self.return_type.as_deref()
	}
}

impl fmt::Display for OperationDescriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}({})", self.declaring_type, self.name, self.parameter_types.join(", "))
	}
}

/// Concrete type of a call target or facade.
///
/// Carries the names of every interface the type can be viewed as, and the
/// operations it exposes so a facade can look them up by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
	name: String,
	supertypes: Vec<String>,
	operations: Vec<Arc<OperationDescriptor>>,
}

impl TypeDescriptor {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			supertypes: Vec::new(),
			operations: Vec::new(),
		}
	}

	/// Declares an interface or supertype this type is assignable to.
	pub fn implements(mut self, supertype: impl Into<String>) -> Self {
		self.supertypes.push(supertype.into());
		self
	}

	/// Declares an operation exposed by this type.
	pub fn operation(mut self, operation: OperationDescriptor) -> Self {
		self.operations.push(Arc::new(operation));
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn supertypes(&self) -> &[String] {
		&self.supertypes
	}

	pub fn operations(&self) -> &[Arc<OperationDescriptor>] {
		&self.operations
	}

	/// Returns true when values of this type can be viewed as `type_name`.
	pub fn is_assignable_to(&self, type_name: &str) -> bool {
		self.name == type_name || self.supertypes.iter().any(|s| s == type_name)
	}

	/// Finds an exposed operation by name and arity.
	pub fn find_operation(&self, name: &str, arity: usize) -> Option<&Arc<OperationDescriptor>> {
		self.operations.iter().find(|op| op.name() == name && op.arity() == arity)
	}
}
