use std::error::Error as StdError;

use thiserror::Error;

use crate::Value;
use crate::category::{DISPATCH, ErrorCategory, INFRASTRUCTURE};

/// Business failure raised by a target or an interceptor.
#[derive(Debug, Clone, Error)]
#[error("{category}: {message}")]
pub struct Fault {
	category: &'static ErrorCategory,
	message: String,
	detail: Option<Value>,
}

impl Fault {
	pub fn new(category: &'static ErrorCategory, message: impl Into<String>) -> Self {
		Self {
			category,
			message: message.into(),
			detail: None,
		}
	}

	/// Attaches an arbitrary payload for callers that catch the fault.
	pub fn with_detail(mut self, detail: Value) -> Self {
		self.detail = Some(detail);
		self
	}

	pub fn category(&self) -> &'static ErrorCategory {
		self.category
	}

	pub fn message(&self) -> &str {
		&self.message
	}

	pub fn detail(&self) -> Option<&Value> {
		self.detail.as_ref()
	}
}

/// Errors propagated through an interceptor chain.
///
/// The engine never wraps or translates these; whatever a target or
/// interceptor returns reaches the caller unchanged.
#[derive(Debug, Error)]
pub enum InvocationError {
	/// Business failure from the target or an interceptor.
	#[error(transparent)]
	Fault(#[from] Fault),
	/// The facade asked for an operation the target does not expose.
	#[error("unknown operation {operation} on {type_name}")]
	UnknownOperation { type_name: String, operation: String },
	/// Argument vector does not fit the operation's parameters.
	#[error("argument mismatch for {operation}: expected {expected}, got {actual}")]
	ArgumentMismatch {
		operation: String,
		expected: usize,
		actual: usize,
	},
	/// Infrastructure error raised by an interceptor, such as a transaction
	/// failure. Recover the concrete type with [`InvocationError::downcast_ref`].
	#[error("{0}")]
	Interceptor(#[source] Box<dyn StdError + Send + Sync>),
}

impl InvocationError {
	/// Wraps an interceptor-level error.
	pub fn interceptor(error: impl StdError + Send + Sync + 'static) -> Self {
		Self::Interceptor(Box::new(error))
	}

	/// Category used by rollback rules.
	pub fn category(&self) -> &'static ErrorCategory {
		match self {
			Self::Fault(fault) => fault.category(),
			Self::UnknownOperation { .. } | Self::ArgumentMismatch { .. } => &DISPATCH,
			Self::Interceptor(_) => &INFRASTRUCTURE,
		}
	}

	pub fn as_fault(&self) -> Option<&Fault> {
		match self {
			Self::Fault(fault) => Some(fault),
			_ => None,
		}
	}

	/// Returns the interceptor error if it has type `E`.
	pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
		match self {
			Self::Interceptor(inner) => inner.downcast_ref::<E>(),
			_ => None,
		}
	}
}
