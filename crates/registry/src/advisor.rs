use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use weave_invocation::{Interceptor, OperationDescriptor, TypeDescriptor};

use crate::Selector;

/// Binds a selector to an interceptor with precedence metadata.
#[derive(Clone)]
pub struct Advisor {
	id: Arc<str>,
	selector: Selector,
	interceptor: Arc<dyn Interceptor>,
	pub(crate) order: Option<i32>,
	/// Registration sequence of the declaring group, assigned by the registry.
	pub(crate) group: u64,
	/// Position inside the declaring group.
	pub(crate) member: u32,
}

impl Advisor {
	pub fn new(id: impl Into<Arc<str>>, selector: Selector, interceptor: Arc<dyn Interceptor>) -> Self {
		Self {
			id: id.into(),
			selector,
			interceptor,
			order: None,
			group: 0,
			member: 0,
		}
	}

	/// Sets an explicit precedence; lower runs earlier.
	pub fn with_order(mut self, order: i32) -> Self {
		self.order = Some(order);
		self
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	pub(crate) fn shared_id(&self) -> Arc<str> {
		Arc::clone(&self.id)
	}

	pub fn selector(&self) -> &Selector {
		&self.selector
	}

	pub fn interceptor(&self) -> &Arc<dyn Interceptor> {
		&self.interceptor
	}

	pub fn order(&self) -> Option<i32> {
		self.order
	}

	pub fn applies_to(&self, operation: &OperationDescriptor, ty: &TypeDescriptor) -> bool {
		self.selector.matches(operation, ty)
	}

	/// Total precedence order used to sort resolved chains.
	///
	/// Explicit order ascending, unordered advisors last, then group
	/// registration sequence, then position inside the group.
	pub fn precedence_cmp(&self, other: &Self) -> Ordering {
		let rank = |a: &Self| (a.order.is_none(), a.order.unwrap_or_default(), a.group, a.member);
		rank(self).cmp(&rank(other))
	}
}

impl fmt::Debug for Advisor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Advisor")
			.field("id", &self.id)
			.field("interceptor", &self.interceptor.name())
			.field("order", &self.order)
			.field("group", &self.group)
			.field("member", &self.member)
			.finish()
	}
}
