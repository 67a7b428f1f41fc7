use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::synchronization::Synchronization;
use crate::{Isolation, ResourceDriver, TransactionDefinition};

/// A driver handle as bound in the thread context, shared by every
/// participant of the unit.
#[derive(Debug)]
pub struct BoundResource<H> {
	handle: H,
	rollback_only: AtomicBool,
}

impl<H> BoundResource<H> {
	pub fn new(handle: H) -> Self {
		Self {
			handle,
			rollback_only: AtomicBool::new(false),
		}
	}

	pub fn handle(&self) -> &H {
		&self.handle
	}

	/// Global rollback-only flag, visible to every participant.
	pub fn is_rollback_only(&self) -> bool {
		self.rollback_only.load(Ordering::Acquire)
	}

	pub fn set_rollback_only(&self) {
		self.rollback_only.store(true, Ordering::Release);
	}

	pub(crate) fn clear_rollback_only(&self) {
		self.rollback_only.store(false, Ordering::Release);
	}
}

/// Handle for one propagation scope returned by
/// [`TransactionManager::get_transaction`](crate::TransactionManager::get_transaction).
///
/// Consumed by `commit` or `rollback`, so each scope completes exactly once.
pub struct TransactionStatus<D: ResourceDriver> {
	pub(crate) definition: TransactionDefinition,
	pub(crate) resource: Option<Arc<BoundResource<D::Handle>>>,
	pub(crate) new_transaction: bool,
	pub(crate) new_synchronization: bool,
	pub(crate) rollback_only: Arc<AtomicBool>,
	pub(crate) savepoint: Option<D::Savepoint>,
	/// Unit-wide rollback-only state when the savepoint was taken.
	pub(crate) poisoned_at_savepoint: bool,
	pub(crate) suspended: Option<SuspendedResources<D>>,
	/// Outer unit unbound while a nested unit without savepoints runs.
	pub(crate) nested_parent: Option<Arc<BoundResource<D::Handle>>>,
}

impl<D: ResourceDriver> TransactionStatus<D> {
	pub(crate) fn new(
		definition: TransactionDefinition,
		resource: Option<Arc<BoundResource<D::Handle>>>,
		new_transaction: bool,
		new_synchronization: bool,
		suspended: Option<SuspendedResources<D>>,
	) -> Self {
		Self {
			definition,
			resource,
			new_transaction,
			new_synchronization,
			rollback_only: Arc::new(AtomicBool::new(false)),
			savepoint: None,
			poisoned_at_savepoint: false,
			suspended,
			nested_parent: None,
		}
	}

	pub fn definition(&self) -> &TransactionDefinition {
		&self.definition
	}

	pub fn name(&self) -> Option<&str> {
		self.definition.name.as_deref()
	}

	pub fn is_read_only(&self) -> bool {
		self.definition.read_only
	}

	/// Whether a real unit backs this scope.
	pub fn has_transaction(&self) -> bool {
		self.resource.is_some()
	}

	/// Whether this scope began the unit it runs in.
	pub fn is_new_transaction(&self) -> bool {
		self.has_transaction() && self.new_transaction
	}

	/// Whether this scope activated synchronization and therefore owns it.
	pub fn is_new_synchronization(&self) -> bool {
		self.new_synchronization
	}

	pub fn has_savepoint(&self) -> bool {
		self.savepoint.is_some()
	}

	/// Whether an outer unit was suspended for this scope.
	pub fn has_suspended(&self) -> bool {
		self.suspended.is_some()
	}

	pub fn suspended(&self) -> Option<&SuspendedResources<D>> {
		self.suspended.as_ref()
	}

	/// Whether this scope runs inside a savepoint or a nested unit.
	pub fn is_nested(&self) -> bool {
		self.has_savepoint() || self.nested_parent.is_some()
	}

	pub fn handle(&self) -> Option<&D::Handle> {
		self.resource.as_deref().map(BoundResource::handle)
	}

	/// Marks only this scope for rollback. Its commit will roll back instead.
	pub fn set_rollback_only(&self) {
		self.rollback_only.store(true, Ordering::Release);
	}

	pub fn is_local_rollback_only(&self) -> bool {
		self.rollback_only.load(Ordering::Acquire)
	}

	/// Whether some participant marked the whole unit rollback-only.
	pub fn is_global_rollback_only(&self) -> bool {
		self.resource.as_ref().is_some_and(|r| r.is_rollback_only())
	}

	pub fn is_rollback_only(&self) -> bool {
		self.is_local_rollback_only() || self.is_global_rollback_only()
	}

	/// Asks every synchronization owned by this scope to flush.
	pub fn flush(&self) {
		if self.new_synchronization {
			for synchronization in crate::context::synchronizations() {
				synchronization.flush();
			}
		}
	}

	pub(crate) fn rollback_only_flag(&self) -> Arc<AtomicBool> {
		Arc::clone(&self.rollback_only)
	}
}

impl<D: ResourceDriver> fmt::Debug for TransactionStatus<D> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TransactionStatus")
			.field("name", &self.definition.name)
			.field("propagation", &self.definition.propagation)
			.field("has_transaction", &self.has_transaction())
			.field("new_transaction", &self.is_new_transaction())
			.field("new_synchronization", &self.new_synchronization)
			.field("savepoint", &self.has_savepoint())
			.field("suspended", &self.has_suspended())
			.field("rollback_only", &self.is_rollback_only())
			.finish()
	}
}

pub(crate) struct SuspendedUnit<D: ResourceDriver> {
	pub(crate) unit: Arc<BoundResource<D::Handle>>,
	pub(crate) token: D::Suspended,
}

/// Outer context captured while an inner scope runs. Resumed exactly once.
pub struct SuspendedResources<D: ResourceDriver> {
	pub(crate) resource: Option<SuspendedUnit<D>>,
	pub(crate) synchronizations: Option<Vec<Arc<dyn Synchronization>>>,
	pub(crate) name: Option<String>,
	pub(crate) read_only: bool,
	pub(crate) isolation: Option<Isolation>,
	pub(crate) was_active: bool,
}

impl<D: ResourceDriver> SuspendedResources<D> {
	pub fn has_resource(&self) -> bool {
		self.resource.is_some()
	}

	pub fn synchronization_count(&self) -> usize {
		self.synchronizations.as_ref().map_or(0, Vec::len)
	}

	pub fn name(&self) -> Option<&str> {
		self.name.as_deref()
	}

	pub fn is_read_only(&self) -> bool {
		self.read_only
	}

	pub fn isolation(&self) -> Option<Isolation> {
		self.isolation
	}

	pub fn was_active(&self) -> bool {
		self.was_active
	}
}

impl<D: ResourceDriver> fmt::Debug for SuspendedResources<D> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SuspendedResources")
			.field("has_resource", &self.has_resource())
			.field("synchronizations", &self.synchronization_count())
			.field("name", &self.name)
			.field("read_only", &self.read_only)
			.field("isolation", &self.isolation)
			.field("was_active", &self.was_active)
			.finish()
	}
}
