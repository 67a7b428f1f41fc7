use tracing::{debug, error, warn};
use weave_invocation::InvocationError;

use crate::current::{self, CurrentGuard, CurrentTransaction};
use crate::{ResourceDriver, TransactionAttribute, TransactionError, TransactionManager, TransactionStatus};

/// A begun propagation scope that must be completed exactly once.
///
/// Dropping an uncompleted scope rolls it back. This covers panics
/// unwinding through advised code as well as early returns.
///
/// Scopes on one thread must complete innermost first. Completing an outer
/// scope also removes every inner scope from [`current`](crate::current).
pub struct TransactionScope<'m, D: ResourceDriver> {
	manager: &'m TransactionManager<D>,
	status: Option<TransactionStatus<D>>,
	_current: CurrentGuard,
}

impl<'m, D: ResourceDriver> TransactionScope<'m, D> {
	pub(crate) fn new(manager: &'m TransactionManager<D>, status: TransactionStatus<D>) -> Self {
		let current = current::push(CurrentTransaction::new(
			status.name().map(str::to_string),
			status.is_new_transaction(),
			status.has_transaction(),
			status.is_read_only(),
			status.rollback_only_flag(),
		));
		Self {
			manager,
			status: Some(status),
			_current: current,
		}
	}

	pub fn status(&self) -> &TransactionStatus<D> {
		match &self.status {
			Some(status) => status,
			None => unreachable!("scope status is only taken by consuming methods"),
		}
	}

	pub fn commit(mut self) -> Result<(), TransactionError> {
		match self.status.take() {
			Some(status) => self.manager.commit(status),
			None => Ok(()),
		}
	}

	pub fn rollback(mut self) -> Result<(), TransactionError> {
		match self.status.take() {
			Some(status) => self.manager.rollback(status),
			None => Ok(()),
		}
	}

	/// Completes the scope after the advised call failed with `failure`.
	///
	/// Rolls back or commits according to the attribute's rules. If that
	/// completion itself fails, the transaction error is returned and the
	/// business failure is logged as overridden.
	pub fn complete_after_failure(mut self, attribute: &TransactionAttribute, failure: &InvocationError) -> Result<(), TransactionError> {
		let Some(status) = self.status.take() else {
			return Ok(());
		};
		let result = if attribute.rollback_on(failure) {
			debug!(name = ?status.name(), category = failure.category().name(), "completing transaction with rollback after failure");
			self.manager.rollback(status)
		} else {
			debug!(name = ?status.name(), category = failure.category().name(), "committing transaction despite failure");
			self.manager.commit(status)
		};
		if let Err(err) = &result {
			error!(error = %err, overridden = %failure, "business failure overridden by transaction failure");
		}
		result
	}
}

impl<D: ResourceDriver> Drop for TransactionScope<'_, D> {
	fn drop(&mut self) {
		let Some(status) = self.status.take() else {
			return;
		};
		if std::thread::panicking() {
			warn!(name = ?status.name(), "rolling back transaction while unwinding from panic");
		} else {
			warn!(name = ?status.name(), "transaction scope dropped without completion, rolling back");
		}
		if let Err(err) = self.manager.rollback(status) {
			error!(error = %err, "rollback of abandoned transaction scope failed");
		}
	}
}
