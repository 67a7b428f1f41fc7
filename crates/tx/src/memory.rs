//! In-memory key/value resource.
//!
//! [`MemoryStore`] is a complete [`ResourceDriver`]: writes made while a unit
//! is bound are buffered on the [`MemoryHandle`] and applied on commit,
//! savepoints are marks in the write log, and every driver call is recorded
//! as a [`DriverEvent`]. Failures can be injected per operation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::trace;

use crate::{BoundResource, Isolation, ResourceDriver, ResourceError, ResourceKey, ResourceOp, TransactionDefinition, context};

/// Driver call observed by a [`MemoryStore`], tagged with the unit id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverEvent {
	Begin(u64),
	Commit(u64),
	Rollback(u64),
	CreateSavepoint(u64),
	RollbackToSavepoint(u64),
	ReleaseSavepoint(u64),
	Suspend(u64),
	Resume(u64),
	Cleanup(u64),
}

type Write = (String, Option<String>);

/// One physical unit of the memory store.
pub struct MemoryHandle {
	id: u64,
	read_only: bool,
	isolation: Isolation,
	writes: Mutex<Vec<Write>>,
}

impl MemoryHandle {
	pub fn id(&self) -> u64 {
		self.id
	}

	pub fn is_read_only(&self) -> bool {
		self.read_only
	}

	pub fn isolation(&self) -> Isolation {
		self.isolation
	}

	/// Buffered writes not yet committed.
	pub fn pending(&self) -> usize {
		self.writes.lock().len()
	}

	fn lookup(&self, key: &str) -> Option<Option<String>> {
		self.writes.lock().iter().rev().find(|(k, _)| k == key).map(|(_, v)| v.clone())
	}
}

impl fmt::Debug for MemoryHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MemoryHandle")
			.field("id", &self.id)
			.field("read_only", &self.read_only)
			.field("pending", &self.pending())
			.finish()
	}
}

struct Inner {
	key: ResourceKey,
	committed: Mutex<BTreeMap<String, String>>,
	events: Mutex<Vec<DriverEvent>>,
	failures: Mutex<Vec<ResourceOp>>,
	savepoints: AtomicBool,
	next_id: AtomicU64,
}

/// Shared in-memory store. Clones refer to the same data.
#[derive(Clone)]
pub struct MemoryStore {
	inner: Arc<Inner>,
}

impl Default for MemoryStore {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryStore {
	pub fn new() -> Self {
		Self {
			inner: Arc::new(Inner {
				key: ResourceKey::next(),
				committed: Mutex::new(BTreeMap::new()),
				events: Mutex::new(Vec::new()),
				failures: Mutex::new(Vec::new()),
				savepoints: AtomicBool::new(true),
				next_id: AtomicU64::new(1),
			}),
		}
	}

	/// Unit bound to the calling thread, if any.
	pub fn bound(&self) -> Option<Arc<BoundResource<MemoryHandle>>> {
		context::resource::<BoundResource<MemoryHandle>>(self.inner.key)
	}

	/// Reads through the bound unit, falling back to committed data.
	pub fn get(&self, key: &str) -> Option<String> {
		if let Some(unit) = self.bound()
			&& let Some(pending) = unit.handle().lookup(key)
		{
			return pending;
		}
		self.inner.committed.lock().get(key).cloned()
	}

	/// Writes into the bound unit, or directly when none is bound.
	pub fn put(&self, key: impl Into<String>, value: impl Into<String>) -> Result<(), ResourceError> {
		self.write(key.into(), Some(value.into()))
	}

	pub fn delete(&self, key: impl Into<String>) -> Result<(), ResourceError> {
		self.write(key.into(), None)
	}

	fn write(&self, key: String, value: Option<String>) -> Result<(), ResourceError> {
		let Some(unit) = self.bound() else {
			apply(&mut self.inner.committed.lock(), vec![(key, value)]);
			return Ok(());
		};
		let handle = unit.handle();
		if handle.read_only {
			return Err(ResourceError::new(format!("unit {} is read-only", handle.id)));
		}
		handle.writes.lock().push((key, value));
		Ok(())
	}

	/// Snapshot of committed data.
	pub fn committed(&self) -> BTreeMap<String, String> {
		self.inner.committed.lock().clone()
	}

	pub fn events(&self) -> Vec<DriverEvent> {
		self.inner.events.lock().clone()
	}

	pub fn clear_events(&self) {
		self.inner.events.lock().clear();
	}

	/// Makes the next call of `op` fail.
	pub fn fail_next(&self, op: ResourceOp) {
		self.inner.failures.lock().push(op);
	}

	pub fn set_savepoints(&self, enabled: bool) {
		self.inner.savepoints.store(enabled, Ordering::Relaxed);
	}

	fn record(&self, event: DriverEvent) {
		trace!(?event, "memory.driver");
		self.inner.events.lock().push(event);
	}

	fn check(&self, op: ResourceOp) -> Result<(), ResourceError> {
		let mut failures = self.inner.failures.lock();
		match failures.iter().position(|f| *f == op) {
			Some(index) => {
				failures.remove(index);
				Err(ResourceError::new(format!("injected {op} failure")))
			}
			None => Ok(()),
		}
	}
}

fn apply(committed: &mut BTreeMap<String, String>, writes: Vec<Write>) {
	for (key, value) in writes {
		match value {
			Some(value) => committed.insert(key, value),
			None => committed.remove(&key),
		};
	}
}

impl ResourceDriver for MemoryStore {
	type Handle = MemoryHandle;
	type Savepoint = usize;
	type Suspended = u64;

	fn key(&self) -> ResourceKey {
		self.inner.key
	}

	fn begin(&self, definition: &TransactionDefinition) -> Result<MemoryHandle, ResourceError> {
		self.check(ResourceOp::Begin)?;
		let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
		self.record(DriverEvent::Begin(id));
		Ok(MemoryHandle {
			id,
			read_only: definition.read_only,
			isolation: definition.isolation,
			writes: Mutex::new(Vec::new()),
		})
	}

	fn commit(&self, handle: &MemoryHandle) -> Result<(), ResourceError> {
		self.check(ResourceOp::Commit)?;
		let writes = std::mem::take(&mut *handle.writes.lock());
		apply(&mut self.inner.committed.lock(), writes);
		self.record(DriverEvent::Commit(handle.id));
		Ok(())
	}

	fn rollback(&self, handle: &MemoryHandle) -> Result<(), ResourceError> {
		self.check(ResourceOp::Rollback)?;
		handle.writes.lock().clear();
		self.record(DriverEvent::Rollback(handle.id));
		Ok(())
	}

	fn supports_savepoints(&self, _handle: &MemoryHandle) -> bool {
		self.inner.savepoints.load(Ordering::Relaxed)
	}

	fn create_savepoint(&self, handle: &MemoryHandle) -> Result<usize, ResourceError> {
		self.check(ResourceOp::CreateSavepoint)?;
		self.record(DriverEvent::CreateSavepoint(handle.id));
		Ok(handle.pending())
	}

	fn rollback_to_savepoint(&self, handle: &MemoryHandle, savepoint: &usize) -> Result<(), ResourceError> {
		self.check(ResourceOp::RollbackToSavepoint)?;
		handle.writes.lock().truncate(*savepoint);
		self.record(DriverEvent::RollbackToSavepoint(handle.id));
		Ok(())
	}

	fn release_savepoint(&self, handle: &MemoryHandle, _savepoint: usize) -> Result<(), ResourceError> {
		self.check(ResourceOp::ReleaseSavepoint)?;
		self.record(DriverEvent::ReleaseSavepoint(handle.id));
		Ok(())
	}

	fn suspend(&self, handle: &MemoryHandle) -> Result<u64, ResourceError> {
		self.check(ResourceOp::Suspend)?;
		self.record(DriverEvent::Suspend(handle.id));
		Ok(handle.id)
	}

	fn resume(&self, handle: &MemoryHandle, suspended: u64) -> Result<(), ResourceError> {
		self.check(ResourceOp::Resume)?;
		if suspended != handle.id {
			return Err(ResourceError::new(format!("unit {} cannot resume token {suspended}", handle.id)));
		}
		self.record(DriverEvent::Resume(handle.id));
		Ok(())
	}

	fn cleanup_after_completion(&self, handle: &MemoryHandle) {
		self.record(DriverEvent::Cleanup(handle.id));
	}
}
