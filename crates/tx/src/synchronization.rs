use std::sync::Arc;

use tracing::error;

use crate::SynchronizationError;

/// Outcome reported to [`Synchronization::after_completion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
	Committed,
	RolledBack,
	/// Outcome could not be determined, e.g. a failed commit, or completion
	/// of an outer unit this listener only joined.
	Unknown,
}

impl CompletionStatus {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Committed => "committed",
			Self::RolledBack => "rolled_back",
			Self::Unknown => "unknown",
		}
	}
}

/// Listener for the lifecycle of the current unit of work.
///
/// Errors from `before_commit` abort the commit and roll back. Errors from
/// `after_commit` reach the caller after the commit is already durable.
/// Errors from `before_completion` and `after_completion` are logged only.
pub trait Synchronization: Send + Sync {
	/// Lower runs first.
	fn order(&self) -> i32 {
		0
	}

	fn suspend(&self) {}

	fn resume(&self) {}

	fn flush(&self) {}

	fn before_commit(&self, _read_only: bool) -> Result<(), SynchronizationError> {
		Ok(())
	}

	fn before_completion(&self) -> Result<(), SynchronizationError> {
		Ok(())
	}

	fn after_commit(&self) -> Result<(), SynchronizationError> {
		Ok(())
	}

	fn after_completion(&self, _status: CompletionStatus) -> Result<(), SynchronizationError> {
		Ok(())
	}
}

pub(crate) fn invoke_before_commit(list: &[Arc<dyn Synchronization>], read_only: bool) -> Result<(), SynchronizationError> {
	list.iter().try_for_each(|s| s.before_commit(read_only))
}

pub(crate) fn invoke_before_completion(list: &[Arc<dyn Synchronization>]) {
	for synchronization in list {
		if let Err(err) = synchronization.before_completion() {
			error!(error = %err, "before_completion callback failed");
		}
	}
}

pub(crate) fn invoke_after_commit(list: &[Arc<dyn Synchronization>]) -> Result<(), SynchronizationError> {
	list.iter().try_for_each(|s| s.after_commit())
}

pub(crate) fn invoke_after_completion(list: &[Arc<dyn Synchronization>], status: CompletionStatus) {
	for synchronization in list {
		if let Err(err) = synchronization.after_completion(status) {
			error!(error = %err, status = status.as_str(), "after_completion callback failed");
		}
	}
}
