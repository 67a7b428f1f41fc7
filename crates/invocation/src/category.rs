//! Error categories.
//!
//! # Role
//!
//! Failures raised through an interceptor chain carry a category drawn from a
//! static single-parent hierarchy. Rollback rules match categories by name and
//! measure how many supertype hops separate a failure from the rule.
//!
//! # Built-in hierarchy
//!
//! ```text
//! Failure
//! ├── Recoverable          (commits by default)
//! ├── Unchecked            (rolls back by default)
//! │   ├── Dispatch
//! │   └── Infrastructure
//! └── Fatal                (rolls back by default)
//! ```
//!
//! Application categories are declared as statics hanging off one of these:
//!
//! ```
//! use weave_invocation::category::{ErrorCategory, UNCHECKED};
//!
//! static ORDER_REJECTED: ErrorCategory = ErrorCategory::new("OrderRejected", &UNCHECKED);
//! assert_eq!(ORDER_REJECTED.depth_to("Failure"), Some(2));
//! ```

use std::fmt;

/// Root of every category.
pub static FAILURE: ErrorCategory = ErrorCategory::root("Failure");
/// Expected business outcomes callers are meant to handle.
pub static RECOVERABLE: ErrorCategory = ErrorCategory::new("Recoverable", &FAILURE);
/// Programming or state errors.
pub static UNCHECKED: ErrorCategory = ErrorCategory::new("Unchecked", &FAILURE);
/// Unrecoverable conditions.
pub static FATAL: ErrorCategory = ErrorCategory::new("Fatal", &FAILURE);
/// Calls that could not be dispatched to the target.
pub static DISPATCH: ErrorCategory = ErrorCategory::new("Dispatch", &UNCHECKED);
/// Errors raised by interceptors themselves rather than the target.
pub static INFRASTRUCTURE: ErrorCategory = ErrorCategory::new("Infrastructure", &UNCHECKED);

/// Named node in the category hierarchy.
#[derive(Debug)]
pub struct ErrorCategory {
	name: &'static str,
	parent: Option<&'static ErrorCategory>,
}

impl ErrorCategory {
	/// Declares a category without a parent.
	pub const fn root(name: &'static str) -> Self {
		Self { name, parent: None }
	}

	/// Declares a category below `parent`.
	pub const fn new(name: &'static str, parent: &'static ErrorCategory) -> Self {
		Self {
			name,
			parent: Some(parent),
		}
	}

	pub fn name(&self) -> &'static str {
		self.name
	}

	pub fn parent(&self) -> Option<&'static ErrorCategory> {
		self.parent
	}

	/// Iterates this category and then each supertype up to the root.
	pub fn lineage(&self) -> impl Iterator<Item = &ErrorCategory> {
		std::iter::successors(Some(self), |c| c.parent)
	}

	/// Number of supertype hops from this category to `name`, or `None` when
	/// `name` is not in the lineage. Zero means an exact match.
	pub fn depth_to(&self, name: &str) -> Option<usize> {
		self.lineage().position(|c| c.name == name)
	}

	pub fn is_a(&self, other: &ErrorCategory) -> bool {
		self.depth_to(other.name).is_some()
	}

	/// Unchecked and fatal failures roll back when no rule says otherwise.
	pub fn is_unchecked(&self) -> bool {
		self.is_a(&UNCHECKED) || self.is_a(&FATAL)
	}
}

impl PartialEq for ErrorCategory {
	fn eq(&self, other: &Self) -> bool {
		self.name == other.name
	}
}

impl Eq for ErrorCategory {}

impl fmt::Display for ErrorCategory {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name)
	}
}
