use crate::{ResourceError, ResourceKey, TransactionDefinition};

/// Resource-specific half of the propagation engine.
///
/// The manager decides what to do; the driver does it against the physical
/// resource. Every operation may fail with a [`ResourceError`], which the
/// manager reports as a resource error distinct from business failures.
pub trait ResourceDriver: Send + Sync + 'static {
	/// Physical transaction handle bound to the thread while a unit is active.
	type Handle: Send + Sync + 'static;
	type Savepoint: Send + Sync + 'static;
	/// Opaque state captured by [`ResourceDriver::suspend`].
	type Suspended: Send + Sync + 'static;

	/// Slot this driver's handles occupy in the thread context.
	fn key(&self) -> ResourceKey;

	fn begin(&self, definition: &TransactionDefinition) -> Result<Self::Handle, ResourceError>;

	fn commit(&self, handle: &Self::Handle) -> Result<(), ResourceError>;

	fn rollback(&self, handle: &Self::Handle) -> Result<(), ResourceError>;

	/// Whether `NESTED` can use a savepoint inside `handle`.
	fn supports_savepoints(&self, _handle: &Self::Handle) -> bool {
		true
	}

	fn create_savepoint(&self, handle: &Self::Handle) -> Result<Self::Savepoint, ResourceError>;

	fn rollback_to_savepoint(&self, handle: &Self::Handle, savepoint: &Self::Savepoint) -> Result<(), ResourceError>;

	fn release_savepoint(&self, handle: &Self::Handle, savepoint: Self::Savepoint) -> Result<(), ResourceError>;

	fn suspend(&self, handle: &Self::Handle) -> Result<Self::Suspended, ResourceError>;

	fn resume(&self, handle: &Self::Handle, suspended: Self::Suspended) -> Result<(), ResourceError>;

	/// Lets a driver attempt a physical commit even when a participant marked
	/// the unit rollback-only. The caller still sees an unexpected rollback.
	fn commit_on_global_rollback_only(&self) -> bool {
		false
	}

	/// Releases per-unit state once the unit is complete.
	fn cleanup_after_completion(&self, _handle: &Self::Handle) {}
}
