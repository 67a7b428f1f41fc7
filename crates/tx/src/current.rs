//! Current-transaction accessor for business code.
//!
//! Every [`TransactionScope`](crate::TransactionScope) pushes an entry for the
//! lifetime of the scope, so code running inside an advised call can inspect
//! or doom its transaction without holding the status.

use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::TransactionError;

/// Read-mostly view of the innermost active scope.
#[derive(Debug, Clone)]
pub struct CurrentTransaction {
	name: Option<String>,
	new_transaction: bool,
	has_transaction: bool,
	read_only: bool,
	rollback_only: Arc<AtomicBool>,
}

impl CurrentTransaction {
	pub(crate) fn new(
		name: Option<String>,
		new_transaction: bool,
		has_transaction: bool,
		read_only: bool,
		rollback_only: Arc<AtomicBool>,
	) -> Self {
		Self {
			name,
			new_transaction,
			has_transaction,
			read_only,
			rollback_only,
		}
	}

	pub fn name(&self) -> Option<&str> {
		self.name.as_deref()
	}

	pub fn is_new_transaction(&self) -> bool {
		self.new_transaction
	}

	pub fn has_transaction(&self) -> bool {
		self.has_transaction
	}

	pub fn is_read_only(&self) -> bool {
		self.read_only
	}

	/// Dooms the scope: its completion rolls back instead of committing.
	pub fn set_rollback_only(&self) {
		self.rollback_only.store(true, Ordering::Release);
	}

	pub fn is_rollback_only(&self) -> bool {
		self.rollback_only.load(Ordering::Acquire)
	}
}

thread_local! {
	static STACK: RefCell<Vec<CurrentTransaction>> = const { RefCell::new(Vec::new()) };
}

/// Innermost scope on the calling thread.
pub fn current() -> Option<CurrentTransaction> {
	STACK.with_borrow(|stack| stack.last().cloned())
}

/// Marks the innermost scope rollback-only.
pub fn set_rollback_only() -> Result<(), TransactionError> {
	let current = current().ok_or(TransactionError::NoTransactionInScope)?;
	current.set_rollback_only();
	Ok(())
}

pub fn depth() -> usize {
	STACK.with_borrow(Vec::len)
}

/// Pops the entry pushed by [`push`] when dropped.
///
/// Dropping truncates the stack to below the guard's entry, so entries pushed
/// after it are popped too.
#[derive(Debug)]
pub(crate) struct CurrentGuard {
	depth: usize,
}

pub(crate) fn push(entry: CurrentTransaction) -> CurrentGuard {
	let depth = STACK.with_borrow_mut(|stack| {
		stack.push(entry);
		stack.len()
	});
	CurrentGuard { depth }
}

impl Drop for CurrentGuard {
	fn drop(&mut self) {
		STACK.with_borrow_mut(|stack| stack.truncate(self.depth - 1));
	}
}
