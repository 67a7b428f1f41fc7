use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

use crate::Isolation;

/// Failure reported by a resource driver.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ResourceError {
	message: String,
	#[source]
	source: Option<Box<dyn StdError + Send + Sync>>,
}

impl ResourceError {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			source: None,
		}
	}

	pub fn with_source(message: impl Into<String>, source: impl StdError + Send + Sync + 'static) -> Self {
		Self {
			message: message.into(),
			source: Some(Box::new(source)),
		}
	}

	pub fn message(&self) -> &str {
		&self.message
	}
}

/// Driver operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceOp {
	Begin,
	Commit,
	Rollback,
	CreateSavepoint,
	RollbackToSavepoint,
	ReleaseSavepoint,
	Suspend,
	Resume,
}

impl ResourceOp {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Begin => "begin",
			Self::Commit => "commit",
			Self::Rollback => "rollback",
			Self::CreateSavepoint => "create_savepoint",
			Self::RollbackToSavepoint => "rollback_to_savepoint",
			Self::ReleaseSavepoint => "release_savepoint",
			Self::Suspend => "suspend",
			Self::Resume => "resume",
		}
	}
}

impl fmt::Display for ResourceOp {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Failure raised by a synchronization callback.
#[derive(Debug, Error)]
#[error("synchronization callback failed: {message}")]
pub struct SynchronizationError {
	message: String,
}

impl SynchronizationError {
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into() }
	}
}

/// Misuse of the thread-bound context store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
	#[error("a resource is already bound for this key on the current thread")]
	ResourceAlreadyBound,
	#[error("no resource bound for this key on the current thread")]
	NoResourceBound,
	#[error("transaction synchronization is already active")]
	SynchronizationAlreadyActive,
	#[error("transaction synchronization is not active")]
	SynchronizationNotActive,
}

#[derive(Debug, Error)]
pub enum TransactionError {
	#[error("no existing transaction found for propagation MANDATORY")]
	NoExistingTransaction,
	#[error("existing transaction found for propagation NEVER")]
	ExistingTransactionForbidden,
	#[error("nested transactions are not allowed by this manager")]
	NestedNotSupported,
	#[error("participating transaction requests isolation {requested} but the existing transaction uses {existing}")]
	IncompatibleIsolation { requested: Isolation, existing: Isolation },
	#[error("participating transaction is read-write but the existing transaction is read-only")]
	ReadOnlyMismatch,
	#[error("resource {op} failed: {source}")]
	Resource { op: ResourceOp, source: ResourceError },
	#[error("transaction rolled back because it has been marked as rollback-only")]
	UnexpectedRollback,
	#[error(transparent)]
	Synchronization(#[from] SynchronizationError),
	#[error("failed to resume suspended transaction: {0}")]
	ResumeFailed(#[source] ResourceError),
	#[error(transparent)]
	Context(#[from] ContextError),
	#[error("no transaction scope is active on this thread")]
	NoTransactionInScope,
}

impl TransactionError {
	pub(crate) fn resource(op: ResourceOp) -> impl FnOnce(ResourceError) -> Self {
		move |source| Self::Resource { op, source }
	}

	/// Errors caused by an impossible propagation request rather than a
	/// runtime failure. These are never worth retrying.
	pub fn is_configuration(&self) -> bool {
		matches!(
			self,
			Self::NoExistingTransaction
				| Self::ExistingTransactionForbidden
				| Self::NestedNotSupported
				| Self::IncompatibleIsolation { .. }
				| Self::ReadOnlyMismatch
		)
	}

	/// Operation that failed, for resource errors.
	pub fn resource_op(&self) -> Option<ResourceOp> {
		match self {
			Self::Resource { op, .. } => Some(*op),
			Self::ResumeFailed(_) => Some(ResourceOp::Resume),
			_ => None,
		}
	}
}

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("invalid transaction configuration: {0}")]
	Parse(#[from] toml::de::Error),
	#[error("invalid method name pattern '{pattern}'")]
	InvalidPattern {
		pattern: String,
		#[source]
		source: globset::Error,
	},
}
