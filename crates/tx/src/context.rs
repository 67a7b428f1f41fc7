//! Thread-bound transaction context.
//!
//! # Role
//!
//! Holds, per thread, the resources bound by drivers (keyed by
//! [`ResourceKey`]), the active synchronization list, and the descriptive
//! attributes of the current unit: name, read-only flag, isolation, and
//! whether a real unit is active.
//!
//! # Invariants
//!
//! - At most one resource is bound per key per thread.
//! - Callbacks are never invoked while the thread-local is borrowed, so a
//!   callback may freely register further synchronizations.
//! - [`clear`] resets everything except bound resources; those are owned by
//!   whoever bound them.

use std::any::Any;
use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashMap;

use crate::{ContextError, Isolation, Synchronization};

/// Identifies one resource driver's slot in the thread context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceKey(u64);

impl ResourceKey {
	/// Allocates a process-unique key.
	pub fn next() -> Self {
		static NEXT: AtomicU64 = AtomicU64::new(1);
		Self(NEXT.fetch_add(1, Ordering::Relaxed))
	}
}

type SharedResource = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
struct ThreadContext {
	resources: FxHashMap<ResourceKey, SharedResource>,
	synchronizations: Option<Vec<Arc<dyn Synchronization>>>,
	name: Option<String>,
	read_only: bool,
	isolation: Option<Isolation>,
	active: bool,
}

thread_local! {
	static CONTEXT: RefCell<ThreadContext> = RefCell::new(ThreadContext::default());
}

fn with<R>(f: impl FnOnce(&mut ThreadContext) -> R) -> R {
	CONTEXT.with_borrow_mut(f)
}

pub fn has_resource(key: ResourceKey) -> bool {
	with(|ctx| ctx.resources.contains_key(&key))
}

/// Returns the resource bound for `key` if it has type `T`.
pub fn resource<T: Any + Send + Sync>(key: ResourceKey) -> Option<Arc<T>> {
	let shared = with(|ctx| ctx.resources.get(&key).cloned())?;
	shared.downcast::<T>().ok()
}

pub fn bind_resource<T: Any + Send + Sync>(key: ResourceKey, value: Arc<T>) -> Result<(), ContextError> {
	with(|ctx| {
		if ctx.resources.contains_key(&key) {
			return Err(ContextError::ResourceAlreadyBound);
		}
		ctx.resources.insert(key, value);
		Ok(())
	})
}

pub fn unbind_resource(key: ResourceKey) -> Result<SharedResource, ContextError> {
	unbind_resource_if_possible(key).ok_or(ContextError::NoResourceBound)
}

pub fn unbind_resource_if_possible(key: ResourceKey) -> Option<SharedResource> {
	with(|ctx| ctx.resources.remove(&key))
}

pub fn is_synchronization_active() -> bool {
	with(|ctx| ctx.synchronizations.is_some())
}

/// Activates synchronization for the current thread.
pub fn init_synchronization() -> Result<(), ContextError> {
	with(|ctx| {
		if ctx.synchronizations.is_some() {
			return Err(ContextError::SynchronizationAlreadyActive);
		}
		ctx.synchronizations = Some(Vec::new());
		Ok(())
	})
}

pub fn register_synchronization(synchronization: Arc<dyn Synchronization>) -> Result<(), ContextError> {
	with(|ctx| match ctx.synchronizations.as_mut() {
		Some(list) => {
			list.push(synchronization);
			Ok(())
		}
		None => Err(ContextError::SynchronizationNotActive),
	})
}

/// Registered synchronizations sorted by [`Synchronization::order`], ties in
/// registration order. Empty when synchronization is inactive.
pub fn synchronizations() -> Vec<Arc<dyn Synchronization>> {
	let mut list = with(|ctx| ctx.synchronizations.clone().unwrap_or_default());
	list.sort_by_key(|s| s.order());
	list
}

pub fn clear_synchronization() -> Result<(), ContextError> {
	with(|ctx| match ctx.synchronizations.take() {
		Some(_) => Ok(()),
		None => Err(ContextError::SynchronizationNotActive),
	})
}

/// Activates synchronization, keeping any list already present.
pub(crate) fn ensure_synchronization() {
	with(|ctx| {
		ctx.synchronizations.get_or_insert_with(Vec::new);
	});
}

/// Removes and returns the raw registration-ordered list.
pub(crate) fn take_synchronizations() -> Option<Vec<Arc<dyn Synchronization>>> {
	with(|ctx| ctx.synchronizations.take())
}

pub fn current_name() -> Option<String> {
	with(|ctx| ctx.name.clone())
}

pub fn set_current_name(name: Option<String>) {
	with(|ctx| ctx.name = name);
}

pub fn is_current_read_only() -> bool {
	with(|ctx| ctx.read_only)
}

pub fn set_current_read_only(read_only: bool) {
	with(|ctx| ctx.read_only = read_only);
}

/// Isolation of the current unit; `None` means the resource default.
pub fn current_isolation() -> Option<Isolation> {
	with(|ctx| ctx.isolation)
}

pub fn set_current_isolation(isolation: Option<Isolation>) {
	with(|ctx| ctx.isolation = isolation);
}

pub fn is_actual_transaction_active() -> bool {
	with(|ctx| ctx.active)
}

pub fn set_actual_transaction_active(active: bool) {
	with(|ctx| ctx.active = active);
}

/// Resets synchronization and descriptive attributes. Bound resources stay.
pub fn clear() {
	with(|ctx| {
		ctx.synchronizations = None;
		ctx.name = None;
		ctx.read_only = false;
		ctx.isolation = None;
		ctx.active = false;
	});
}

/// Point-in-time copy of the descriptive state, for assertions and logging.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContextSnapshot {
	pub name: Option<String>,
	pub read_only: bool,
	pub isolation: Option<Isolation>,
	pub active: bool,
	pub synchronization_active: bool,
	pub synchronization_count: usize,
	pub resource_count: usize,
}

pub fn snapshot() -> ContextSnapshot {
	with(|ctx| ContextSnapshot {
		name: ctx.name.clone(),
		read_only: ctx.read_only,
		isolation: ctx.isolation,
		active: ctx.active,
		synchronization_active: ctx.synchronizations.is_some(),
		synchronization_count: ctx.synchronizations.as_ref().map_or(0, Vec::len),
		resource_count: ctx.resources.len(),
	})
}
