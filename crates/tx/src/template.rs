//! Programmatic demarcation around a closure.

use std::sync::Arc;

use tracing::error;

use crate::{ResourceDriver, TransactionDefinition, TransactionError, TransactionManager, TransactionStatus};

/// Failure of [`TransactionTemplate::execute`].
#[derive(Debug, thiserror::Error)]
pub enum TemplateError<E> {
	/// Beginning or completing the unit failed.
	#[error("transaction failed: {0}")]
	Transaction(#[source] TransactionError),
	/// The callback failed and the unit was rolled back.
	#[error(transparent)]
	Callback(E),
}

/// Runs closures inside a unit described by a fixed definition.
///
/// `Ok` commits (or rolls back if the unit was marked rollback-only). Any
/// `Err` rolls back; a panic rolls back through the scope's drop.
pub struct TransactionTemplate<D: ResourceDriver> {
	manager: Arc<TransactionManager<D>>,
	definition: TransactionDefinition,
}

impl<D: ResourceDriver> TransactionTemplate<D> {
	pub fn new(manager: Arc<TransactionManager<D>>, definition: TransactionDefinition) -> Self {
		Self { manager, definition }
	}

	pub fn definition(&self) -> &TransactionDefinition {
		&self.definition
	}

	pub fn execute<T, E, F>(&self, f: F) -> Result<T, TemplateError<E>>
	where
		F: FnOnce(&TransactionStatus<D>) -> Result<T, E>,
	{
		let scope = self.manager.scope(&self.definition).map_err(TemplateError::Transaction)?;
		match f(scope.status()) {
			Ok(value) => {
				scope.commit().map_err(TemplateError::Transaction)?;
				Ok(value)
			}
			Err(err) => {
				if let Err(rollback) = scope.rollback() {
					error!(error = %rollback, "rollback after callback failure failed, callback error overridden");
					return Err(TemplateError::Transaction(rollback));
				}
				Err(TemplateError::Callback(err))
			}
		}
	}
}
