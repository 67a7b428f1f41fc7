//! Advisor storage with atomic publication.
//!
//! # Role
//!
//! Holds every registered [`Advisor`] in precedence order and publishes each
//! change as a new immutable [`RegistrySnapshot`]. Readers never lock.
//!
//! # Invariants
//!
//! - Advisor ids are unique within a snapshot.
//! - Every published change bumps the generation, which is what invalidates
//!   cached chains (see `invariants::test_registration_invalidates_cache`).
//! - Concurrent registrations are linearizable; none is lost.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::debug;

use crate::{Advisor, RegistryError};

/// Immutable view of the registry at one generation.
#[derive(Debug)]
pub struct RegistrySnapshot {
	advisors: Arc<[Arc<Advisor>]>,
	generation: u64,
	next_group: u64,
}

impl Default for RegistrySnapshot {
	fn default() -> Self {
		Self {
			advisors: Arc::from(Vec::new()),
			generation: 0,
			next_group: 0,
		}
	}
}

impl RegistrySnapshot {
	/// Advisors in precedence order.
	pub fn advisors(&self) -> &[Arc<Advisor>] {
		&self.advisors
	}

	pub fn generation(&self) -> u64 {
		self.generation
	}
}

/// Runtime-extensible advisor registry.
#[derive(Debug, Default)]
pub struct AdvisorRegistry {
	snap: ArcSwap<RegistrySnapshot>,
}

impl AdvisorRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
		self.snap.load_full()
	}

	pub fn generation(&self) -> u64 {
		self.snap.load().generation
	}

	pub fn len(&self) -> usize {
		self.snap.load().advisors.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Registers a standalone advisor.
	pub fn register(&self, advisor: Advisor) -> Result<(), RegistryError> {
		self.register_group(None, vec![advisor])
	}

	/// Registers advisors declared together, such as the advice of one aspect.
	///
	/// When `order` is set it overrides each member's own order. Members stay
	/// adjacent in resolved chains and keep the order given here.
	pub fn register_group(&self, order: Option<i32>, members: Vec<Advisor>) -> Result<(), RegistryError> {
		for (i, advisor) in members.iter().enumerate() {
			if members[..i].iter().any(|a| a.id() == advisor.id()) {
				return Err(RegistryError::DuplicateAdvisor {
					id: advisor.id().to_string(),
				});
			}
		}

		loop {
			let old = self.snap.load_full();
			if let Some(dup) = members.iter().find(|m| old.advisors.iter().any(|a| a.id() == m.id())) {
				return Err(RegistryError::DuplicateAdvisor { id: dup.id().to_string() });
			}

			let group = old.next_group;
			let mut advisors: Vec<Arc<Advisor>> = old.advisors.to_vec();
			for (member, advisor) in members.iter().enumerate() {
				let mut advisor = advisor.clone();
				if order.is_some() {
					advisor.order = order;
				}
				advisor.group = group;
				advisor.member = member as u32;
				advisors.push(Arc::new(advisor));
			}
			advisors.sort_by(|a, b| a.precedence_cmp(b));

			let new = Arc::new(RegistrySnapshot {
				advisors: Arc::from(advisors),
				generation: old.generation + 1,
				next_group: group + 1,
			});
			let prev = self.snap.compare_and_swap(&old, Arc::clone(&new));
			if Arc::ptr_eq(&prev, &old) {
				debug!(
					group,
					members = members.len(),
					generation = new.generation,
					ids = ?members.iter().map(Advisor::id).collect::<Vec<_>>(),
					"advisors registered"
				);
				return Ok(());
			}
		}
	}

	/// Removes an advisor by id. Returns false when no such advisor exists.
	pub fn remove(&self, id: &str) -> bool {
		loop {
			let old = self.snap.load_full();
			if !old.advisors.iter().any(|a| a.id() == id) {
				return false;
			}
			let advisors: Vec<Arc<Advisor>> = old.advisors.iter().filter(|a| a.id() != id).cloned().collect();
			let new = Arc::new(RegistrySnapshot {
				advisors: Arc::from(advisors),
				generation: old.generation + 1,
				next_group: old.next_group,
			});
			let prev = self.snap.compare_and_swap(&old, Arc::clone(&new));
			if Arc::ptr_eq(&prev, &old) {
				debug!(id, generation = new.generation, "advisor removed");
				return true;
			}
		}
	}
}
