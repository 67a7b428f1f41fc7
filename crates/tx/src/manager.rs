//! Propagation state machine.
//!
//! # Role
//!
//! Decides, for each requested [`TransactionDefinition`], whether to begin,
//! join, nest, suspend or refuse, and later completes the returned
//! [`TransactionStatus`] by committing or rolling back. All physical work is
//! delegated to the [`ResourceDriver`].
//!
//! # Invariants
//!
//! - At most one unit per driver is bound to a thread at any time.
//! - Every suspension is resumed exactly once, on success and error paths
//!   alike, by `cleanup_after_completion` (see
//!   `invariants::test_suspended_context_restored_after_failure`).
//! - A failing participant marks the unit rollback-only unless
//!   `global_rollback_on_participation_failure` is off; the outermost commit
//!   then rolls back and reports [`TransactionError::UnexpectedRollback`]
//!   exactly once.
//! - After-completion callbacks run whenever the unit completes, including
//!   when after-commit callbacks fail.

use std::sync::Arc;

use tracing::{debug, error, trace, warn};

use crate::context;
use crate::status::SuspendedUnit;
use crate::synchronization::{
	invoke_after_commit, invoke_after_completion, invoke_before_commit, invoke_before_completion,
};
use crate::{
	BoundResource, CompletionStatus, Isolation, Propagation, ResourceDriver, ResourceOp, SuspendedResources,
	SynchronizationMode, TransactionDefinition, TransactionError, TransactionManagerConfig, TransactionScope,
	TransactionStatus,
};

type Unit<D> = Arc<BoundResource<<D as ResourceDriver>::Handle>>;

/// Why a commit attempt did not complete normally.
enum CommitFailure {
	/// A participant marked the unit rollback-only.
	Unexpected,
	/// The driver failed.
	Resource(TransactionError),
	/// A before-commit callback failed.
	Callback(TransactionError),
}

/// Propagation engine bound to one resource driver.
pub struct TransactionManager<D: ResourceDriver> {
	driver: D,
	config: TransactionManagerConfig,
}

impl<D: ResourceDriver> TransactionManager<D> {
	pub fn new(driver: D) -> Self {
		Self::with_config(driver, TransactionManagerConfig::default())
	}

	pub fn with_config(driver: D, config: TransactionManagerConfig) -> Self {
		Self { driver, config }
	}

	pub fn driver(&self) -> &D {
		&self.driver
	}

	pub fn config(&self) -> &TransactionManagerConfig {
		&self.config
	}

	/// Whether this manager's driver has a unit bound on the calling thread.
	pub fn has_bound_transaction(&self) -> bool {
		context::has_resource(self.driver.key())
	}

	/// Begins, joins or suspends according to `definition.propagation`.
	pub fn get_transaction(&self, definition: &TransactionDefinition) -> Result<TransactionStatus<D>, TransactionError> {
		let mut definition = definition.clone();
		if definition.timeout_secs.is_none() {
			definition.timeout_secs = self.config.default_timeout_secs;
		}

		if let Some(existing) = self.bound_unit() {
			return self.handle_existing(definition, existing);
		}

		match definition.propagation {
			Propagation::Mandatory => Err(TransactionError::NoExistingTransaction),
			Propagation::Required | Propagation::RequiresNew | Propagation::Nested => {
				let suspended = self.suspend(None)?;
				debug!(
					name = ?definition.name,
					propagation = definition.propagation.as_str(),
					"creating new transaction"
				);
				self.start_transaction(definition, suspended, None)
			}
			Propagation::Supports | Propagation::NotSupported | Propagation::Never => {
				if definition.isolation != Isolation::Default {
					warn!(
						isolation = definition.isolation.as_str(),
						propagation = definition.propagation.as_str(),
						"custom isolation ignored: no transaction is started"
					);
				}
				let new_sync = self.config.synchronization == SynchronizationMode::Always;
				Ok(self.prepare_status(definition, None, true, new_sync, None))
			}
		}
	}

	/// Begins a scope and registers it as the thread's current transaction.
	pub fn scope(&self, definition: &TransactionDefinition) -> Result<TransactionScope<'_, D>, TransactionError> {
		let status = self.get_transaction(definition)?;
		Ok(TransactionScope::new(self, status))
	}

	/// Commits `status`, or rolls it back when it was marked rollback-only.
	pub fn commit(&self, status: TransactionStatus<D>) -> Result<(), TransactionError> {
		if status.is_local_rollback_only() {
			debug!(name = ?status.name(), "transactional code requested rollback");
			return self.process_rollback(status, false);
		}
		if !self.driver.commit_on_global_rollback_only() && status.is_global_rollback_only() {
			debug!(name = ?status.name(), "global transaction is marked rollback-only but commit was requested");
			return self.process_rollback(status, true);
		}
		self.process_commit(status)
	}

	pub fn rollback(&self, status: TransactionStatus<D>) -> Result<(), TransactionError> {
		self.process_rollback(status, false)
	}

	fn bound_unit(&self) -> Option<Unit<D>> {
		context::resource::<BoundResource<D::Handle>>(self.driver.key())
	}

	fn handle_existing(&self, definition: TransactionDefinition, existing: Unit<D>) -> Result<TransactionStatus<D>, TransactionError> {
		match definition.propagation {
			Propagation::Never => Err(TransactionError::ExistingTransactionForbidden),
			Propagation::NotSupported => {
				debug!(name = ?definition.name, "suspending current transaction");
				let suspended = self.suspend(Some(existing))?;
				let new_sync = self.config.synchronization == SynchronizationMode::Always;
				Ok(self.prepare_status(definition, None, false, new_sync, suspended))
			}
			Propagation::RequiresNew => {
				debug!(name = ?definition.name, "suspending current transaction, creating new transaction");
				let suspended = self.suspend(Some(existing))?;
				self.start_transaction(definition, suspended, None)
			}
			Propagation::Nested => {
				if !self.config.nested_transaction_allowed {
					return Err(TransactionError::NestedNotSupported);
				}
				if self.driver.supports_savepoints(existing.handle()) {
					debug!(name = ?definition.name, "creating nested transaction with savepoint");
					let savepoint = self
						.driver
						.create_savepoint(existing.handle())
						.map_err(TransactionError::resource(ResourceOp::CreateSavepoint))?;
					let poisoned = existing.is_rollback_only();
					let mut status = self.prepare_status(definition, Some(existing), false, false, None);
					status.savepoint = Some(savepoint);
					status.poisoned_at_savepoint = poisoned;
					Ok(status)
				} else {
					debug!(name = ?definition.name, "creating nested transaction without savepoint");
					self.start_transaction(definition, None, Some(existing))
				}
			}
			Propagation::Required | Propagation::Supports | Propagation::Mandatory => {
				if self.config.validate_existing_transaction {
					validate_participation(&definition)?;
				}
				trace!(name = ?definition.name, "participating in existing transaction");
				let new_sync = self.config.synchronization != SynchronizationMode::Never;
				Ok(self.prepare_status(definition, Some(existing), false, new_sync, None))
			}
		}
	}

	fn start_transaction(
		&self,
		definition: TransactionDefinition,
		suspended: Option<SuspendedResources<D>>,
		nested_parent: Option<Unit<D>>,
	) -> Result<TransactionStatus<D>, TransactionError> {
		let key = self.driver.key();
		let handle = match self.driver.begin(&definition) {
			Ok(handle) => handle,
			Err(err) => {
				self.resume_after_failed_begin(suspended);
				return Err(TransactionError::Resource {
					op: ResourceOp::Begin,
					source: err,
				});
			}
		};

		let unit = Arc::new(BoundResource::new(handle));
		if nested_parent.is_some() {
			context::unbind_resource_if_possible(key);
		}
		if let Err(err) = context::bind_resource(key, Arc::clone(&unit)) {
			if let Err(rollback_err) = self.driver.rollback(unit.handle()) {
				warn!(error = %rollback_err, "rollback of unbindable transaction failed");
			}
			if let Some(parent) = nested_parent
				&& let Err(rebind_err) = context::bind_resource(key, parent)
			{
				warn!(error = %rebind_err, "rebinding outer transaction failed");
			}
			self.resume_after_failed_begin(suspended);
			return Err(err.into());
		}

		let new_sync = self.config.synchronization != SynchronizationMode::Never;
		let mut status = self.prepare_status(definition, Some(unit), true, new_sync, suspended);
		status.nested_parent = nested_parent;
		Ok(status)
	}

	fn resume_after_failed_begin(&self, suspended: Option<SuspendedResources<D>>) {
		if let Err(err) = self.resume(suspended) {
			warn!(error = %err, "failed to resume outer transaction after begin failure");
		}
	}

	fn prepare_status(
		&self,
		definition: TransactionDefinition,
		resource: Option<Unit<D>>,
		new_transaction: bool,
		new_synchronization: bool,
		suspended: Option<SuspendedResources<D>>,
	) -> TransactionStatus<D> {
		let actual_new_sync = new_synchronization && !context::is_synchronization_active();
		let status = TransactionStatus::new(definition, resource, new_transaction, actual_new_sync, suspended);
		if actual_new_sync {
			let definition = status.definition();
			context::set_actual_transaction_active(status.has_transaction());
			context::set_current_isolation((definition.isolation != Isolation::Default).then_some(definition.isolation));
			context::set_current_read_only(definition.read_only);
			context::set_current_name(definition.name.clone());
			context::ensure_synchronization();
		}
		status
	}

	/// Detaches the current unit and synchronization state from the thread.
	fn suspend(&self, existing: Option<Unit<D>>) -> Result<Option<SuspendedResources<D>>, TransactionError> {
		let key = self.driver.key();
		let resource = |existing: Option<Unit<D>>| -> Result<Option<SuspendedUnit<D>>, TransactionError> {
			let Some(unit) = existing else {
				return Ok(None);
			};
			let token = self
				.driver
				.suspend(unit.handle())
				.map_err(TransactionError::resource(ResourceOp::Suspend))?;
			context::unbind_resource_if_possible(key);
			Ok(Some(SuspendedUnit { unit, token }))
		};

		if !context::is_synchronization_active() {
			return Ok(resource(existing)?.map(|unit| SuspendedResources {
				resource: Some(unit),
				synchronizations: None,
				name: None,
				read_only: false,
				isolation: None,
				was_active: false,
			}));
		}

		let synchronizations = context::take_synchronizations().unwrap_or_default();
		for synchronization in &synchronizations {
			synchronization.suspend();
		}
		let unit = match resource(existing) {
			Ok(unit) => unit,
			Err(err) => {
				resume_synchronizations(synchronizations);
				return Err(err);
			}
		};

		let holder = SuspendedResources {
			resource: unit,
			synchronizations: Some(synchronizations),
			name: context::current_name(),
			read_only: context::is_current_read_only(),
			isolation: context::current_isolation(),
			was_active: context::is_actual_transaction_active(),
		};
		context::clear();
		trace!(?holder, "suspended");
		Ok(Some(holder))
	}

	/// Reattaches a suspended context. Restores thread state even when the
	/// driver fails to resume, discarding the driver-level unit in that case.
	fn resume(&self, holder: Option<SuspendedResources<D>>) -> Result<(), TransactionError> {
		let Some(holder) = holder else {
			return Ok(());
		};
		trace!(?holder, "resuming");

		let mut result = Ok(());
		if let Some(SuspendedUnit { unit, token }) = holder.resource {
			match self.driver.resume(unit.handle(), token) {
				Ok(()) => {
					if let Err(err) = context::bind_resource(self.driver.key(), unit) {
						result = Err(err.into());
					}
				}
				Err(err) => {
					warn!(error = %err, "discarding suspended transaction that failed to resume");
					result = Err(TransactionError::ResumeFailed(err));
				}
			}
		}

		if let Some(synchronizations) = holder.synchronizations {
			context::set_actual_transaction_active(holder.was_active);
			context::set_current_isolation(holder.isolation);
			context::set_current_read_only(holder.read_only);
			context::set_current_name(holder.name);
			resume_synchronizations(synchronizations);
		}
		result
	}

	fn process_commit(&self, mut status: TransactionStatus<D>) -> Result<(), TransactionError> {
		let mut before_completion_invoked = false;
		let result = match self.commit_attempt(&mut status, &mut before_completion_invoked) {
			Ok(()) => {
				let after_commit = self.trigger_after_commit(&status);
				self.trigger_after_completion(&status, CompletionStatus::Committed);
				after_commit
			}
			Err(CommitFailure::Unexpected) => {
				self.trigger_after_completion(&status, CompletionStatus::RolledBack);
				Err(TransactionError::UnexpectedRollback)
			}
			Err(CommitFailure::Resource(err)) => {
				if self.config.rollback_on_commit_failure {
					self.rollback_after_commit_failure(&status, err)
				} else {
					self.trigger_after_completion(&status, CompletionStatus::Unknown);
					Err(err)
				}
			}
			Err(CommitFailure::Callback(err)) => {
				if !before_completion_invoked {
					self.trigger_before_completion(&status);
				}
				self.rollback_after_commit_failure(&status, err)
			}
		};
		self.finish(status, result)
	}

	fn commit_attempt(&self, status: &mut TransactionStatus<D>, before_completion_invoked: &mut bool) -> Result<(), CommitFailure> {
		self.trigger_before_commit(status).map_err(CommitFailure::Callback)?;
		self.trigger_before_completion(status);
		*before_completion_invoked = true;

		let unexpected = if let Some(savepoint) = status.savepoint.take() {
			let unexpected = status.is_global_rollback_only();
			if let Some(unit) = &status.resource {
				trace!(name = ?status.name(), "releasing transaction savepoint");
				self.driver
					.release_savepoint(unit.handle(), savepoint)
					.map_err(|err| CommitFailure::Resource(TransactionError::resource(ResourceOp::ReleaseSavepoint)(err)))?;
			}
			unexpected
		} else if status.is_new_transaction() {
			let unexpected = status.is_global_rollback_only();
			if let Some(unit) = &status.resource {
				debug!(name = ?status.name(), "initiating transaction commit");
				self.driver
					.commit(unit.handle())
					.map_err(|err| CommitFailure::Resource(TransactionError::resource(ResourceOp::Commit)(err)))?;
			}
			unexpected
		} else {
			self.config.fail_early_on_global_rollback_only && status.is_global_rollback_only()
		};

		if unexpected { Err(CommitFailure::Unexpected) } else { Ok(()) }
	}

	fn rollback_after_commit_failure(&self, status: &TransactionStatus<D>, err: TransactionError) -> Result<(), TransactionError> {
		let rollback = match &status.resource {
			Some(unit) if status.is_new_transaction() => {
				debug!(name = ?status.name(), error = %err, "initiating rollback after commit failure");
				self.driver
					.rollback(unit.handle())
					.map_err(TransactionError::resource(ResourceOp::Rollback))
			}
			Some(unit) => {
				if self.config.global_rollback_on_participation_failure {
					debug!(name = ?status.name(), "marking existing transaction rollback-only after commit failure");
					unit.set_rollback_only();
				}
				Ok(())
			}
			None => Ok(()),
		};

		match rollback {
			Ok(()) => {
				self.trigger_after_completion(status, CompletionStatus::RolledBack);
				Err(err)
			}
			Err(rollback_err) => {
				error!(error = %err, rollback_error = %rollback_err, "commit failure overridden by rollback failure");
				self.trigger_after_completion(status, CompletionStatus::Unknown);
				Err(rollback_err)
			}
		}
	}

	fn process_rollback(&self, mut status: TransactionStatus<D>, unexpected: bool) -> Result<(), TransactionError> {
		let result = self.rollback_attempt(&mut status, unexpected);
		self.finish(status, result)
	}

	fn rollback_attempt(&self, status: &mut TransactionStatus<D>, mut unexpected: bool) -> Result<(), TransactionError> {
		self.trigger_before_completion(status);

		let physical = if let Some(savepoint) = status.savepoint.take() {
			match &status.resource {
				Some(unit) => {
					debug!(name = ?status.name(), "rolling back transaction to savepoint");
					self.rollback_to_savepoint(unit, savepoint, status.poisoned_at_savepoint)
				}
				None => Ok(()),
			}
		} else if status.is_new_transaction() {
			match &status.resource {
				Some(unit) => {
					debug!(name = ?status.name(), "initiating transaction rollback");
					self.driver
						.rollback(unit.handle())
						.map_err(TransactionError::resource(ResourceOp::Rollback))
				}
				None => Ok(()),
			}
		} else {
			match &status.resource {
				Some(unit) if status.is_local_rollback_only() || self.config.global_rollback_on_participation_failure => {
					debug!(name = ?status.name(), "participating transaction failed: marking existing transaction rollback-only");
					unit.set_rollback_only();
				}
				Some(_) => {
					debug!(name = ?status.name(), "participating transaction failed: letting transaction originator decide on rollback");
				}
				None => {
					debug!(name = ?status.name(), "should roll back transaction but cannot: no transaction available");
				}
			}
			if !self.config.fail_early_on_global_rollback_only {
				unexpected = false;
			}
			Ok(())
		};

		if let Err(err) = physical {
			self.trigger_after_completion(status, CompletionStatus::Unknown);
			return Err(err);
		}
		self.trigger_after_completion(status, CompletionStatus::RolledBack);
		if unexpected {
			return Err(TransactionError::UnexpectedRollback);
		}
		Ok(())
	}

	/// Undoes work since `savepoint`. Rollback-only votes cast after the
	/// savepoint are discarded with it; earlier ones survive.
	fn rollback_to_savepoint(&self, unit: &Unit<D>, savepoint: D::Savepoint, poisoned: bool) -> Result<(), TransactionError> {
		self.driver
			.rollback_to_savepoint(unit.handle(), &savepoint)
			.map_err(TransactionError::resource(ResourceOp::RollbackToSavepoint))?;
		if !poisoned {
			unit.clear_rollback_only();
		}
		self.driver
			.release_savepoint(unit.handle(), savepoint)
			.map_err(TransactionError::resource(ResourceOp::ReleaseSavepoint))
	}

	/// Runs cleanup and merges its outcome with the completion result. The
	/// completion error wins; a discarded cleanup error is logged.
	fn finish(&self, status: TransactionStatus<D>, result: Result<(), TransactionError>) -> Result<(), TransactionError> {
		let cleanup = self.cleanup_after_completion(status);
		match (result, cleanup) {
			(Err(primary), Err(cleanup_err)) => {
				warn!(error = %primary, cleanup_error = %cleanup_err, "cleanup failure discarded in favor of completion failure");
				Err(primary)
			}
			(Err(primary), Ok(())) => Err(primary),
			(Ok(()), cleanup) => cleanup,
		}
	}

	fn cleanup_after_completion(&self, status: TransactionStatus<D>) -> Result<(), TransactionError> {
		let key = self.driver.key();
		let new_transaction = status.is_new_transaction();
		let TransactionStatus {
			resource,
			new_synchronization,
			suspended,
			nested_parent,
			..
		} = status;

		if new_synchronization {
			context::clear();
		}
		if new_transaction && let Some(unit) = &resource {
			self.driver.cleanup_after_completion(unit.handle());
			context::unbind_resource_if_possible(key);
		}

		let rebind = match nested_parent {
			Some(parent) => context::bind_resource(key, parent).map_err(TransactionError::from),
			None => Ok(()),
		};
		if suspended.is_some() {
			debug!("resuming suspended transaction after completion of inner transaction");
		}
		let resumed = self.resume(suspended);
		rebind.and(resumed)
	}

	fn trigger_before_commit(&self, status: &TransactionStatus<D>) -> Result<(), TransactionError> {
		if !status.new_synchronization {
			return Ok(());
		}
		invoke_before_commit(&context::synchronizations(), status.is_read_only())?;
		Ok(())
	}

	fn trigger_before_completion(&self, status: &TransactionStatus<D>) {
		if status.new_synchronization {
			invoke_before_completion(&context::synchronizations());
		}
	}

	fn trigger_after_commit(&self, status: &TransactionStatus<D>) -> Result<(), TransactionError> {
		if !status.new_synchronization {
			return Ok(());
		}
		invoke_after_commit(&context::synchronizations())?;
		Ok(())
	}

	fn trigger_after_completion(&self, status: &TransactionStatus<D>, completion: CompletionStatus) {
		if !status.new_synchronization {
			return;
		}
		let synchronizations = context::synchronizations();
		context::take_synchronizations();
		if !status.has_transaction() || status.is_new_transaction() {
			invoke_after_completion(&synchronizations, completion);
		} else if !synchronizations.is_empty() {
			// Outer outcome is decided elsewhere.
			invoke_after_completion(&synchronizations, CompletionStatus::Unknown);
		}
	}
}

fn validate_participation(definition: &TransactionDefinition) -> Result<(), TransactionError> {
	if definition.isolation != Isolation::Default {
		let existing = context::current_isolation();
		if existing != Some(definition.isolation) {
			return Err(TransactionError::IncompatibleIsolation {
				requested: definition.isolation,
				existing: existing.unwrap_or_default(),
			});
		}
	}
	if !definition.read_only && context::is_current_read_only() {
		return Err(TransactionError::ReadOnlyMismatch);
	}
	Ok(())
}

fn resume_synchronizations(synchronizations: Vec<Arc<dyn crate::Synchronization>>) {
	context::ensure_synchronization();
	for synchronization in synchronizations {
		synchronization.resume();
		// Active by construction: ensured above.
		let _ = context::register_synchronization(synchronization);
	}
}

#[cfg(test)]
mod tests;
