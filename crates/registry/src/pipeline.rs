//! Chain resolution and caching.
//!
//! # Role
//!
//! Turns an (operation, concrete type) pair into the ordered list of
//! interceptors that apply to it. Results are cached per registry
//! generation, including empty chains.
//!
//! # Invariants
//!
//! - Resolution is deterministic: same registry generation, same chain.
//! - Each key is computed at most once per generation; cache hits never lock
//!   (see `invariants::test_chain_computed_once_per_generation`).
//! - Type filters run before operation matchers.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::trace;
use weave_invocation::{Interceptor, OperationDescriptor, TypeDescriptor};

use crate::AdvisorRegistry;
use crate::registry::RegistrySnapshot;

/// Ordered interceptors for one (operation, type) pair.
#[derive(Clone)]
pub struct ResolvedChain {
	interceptors: Arc<[Arc<dyn Interceptor>]>,
	advisor_ids: Arc<[Arc<str>]>,
}

impl ResolvedChain {
	pub fn empty() -> Self {
		Self {
			interceptors: Arc::from(Vec::new()),
			advisor_ids: Arc::from(Vec::new()),
		}
	}

	pub fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
		&self.interceptors
	}

	/// Ids of the contributing advisors, in chain order.
	pub fn advisor_ids(&self) -> impl Iterator<Item = &str> {
		self.advisor_ids.iter().map(|id| &**id)
	}

	pub fn len(&self) -> usize {
		self.interceptors.len()
	}

	pub fn is_empty(&self) -> bool {
		self.interceptors.is_empty()
	}
}

impl PartialEq for ResolvedChain {
	fn eq(&self, other: &Self) -> bool {
		self.advisor_ids == other.advisor_ids
	}
}

impl fmt::Debug for ResolvedChain {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("ResolvedChain").field(&self.advisor_ids).finish()
	}
}

type OperationChains = FxHashMap<Arc<OperationDescriptor>, Arc<ResolvedChain>>;

#[derive(Default)]
struct ChainCache {
	generation: u64,
	/// Concrete type name, then one entry per distinct supertype list.
	chains: FxHashMap<String, Vec<(Vec<String>, OperationChains)>>,
}

impl ChainCache {
	fn get(&self, generation: u64, operation: &OperationDescriptor, ty: &TypeDescriptor) -> Option<Arc<ResolvedChain>> {
		if self.generation != generation {
			return None;
		}
		self.chains
			.get(ty.name())?
			.iter()
			.find(|(supertypes, _)| supertypes.as_slice() == ty.supertypes())?
			.1
			.get(operation)
			.cloned()
	}

	fn insert(&mut self, operation: &Arc<OperationDescriptor>, ty: &TypeDescriptor, chain: Arc<ResolvedChain>) {
		let shapes = self.chains.entry(ty.name().to_string()).or_default();
		let index = match shapes.iter().position(|(supertypes, _)| supertypes.as_slice() == ty.supertypes()) {
			Some(index) => index,
			None => {
				shapes.push((ty.supertypes().to_vec(), OperationChains::default()));
				shapes.len() - 1
			}
		};
		shapes[index].1.insert(Arc::clone(operation), chain);
	}

	fn len(&self) -> usize {
		self.chains.values().flatten().map(|(_, ops)| ops.len()).sum()
	}
}

/// Resolves and caches interceptor chains against an [`AdvisorRegistry`].
pub struct PipelineBuilder {
	registry: Arc<AdvisorRegistry>,
	cache: ArcSwap<ChainCache>,
	fill: Mutex<()>,
}

impl PipelineBuilder {
	pub fn new(registry: Arc<AdvisorRegistry>) -> Self {
		Self {
			registry,
			cache: ArcSwap::from_pointee(ChainCache::default()),
			fill: Mutex::new(()),
		}
	}

	pub fn registry(&self) -> &Arc<AdvisorRegistry> {
		&self.registry
	}

	/// Returns the chain for `operation` invoked on a target of type `ty`.
	pub fn resolve(&self, operation: &Arc<OperationDescriptor>, ty: &TypeDescriptor) -> Arc<ResolvedChain> {
		let generation = self.registry.generation();
		if let Some(chain) = self.cache.load().get(generation, operation, ty) {
			trace!(operation = %operation, target = ty.name(), len = chain.len(), "pipeline.cache_hit");
			return chain;
		}

		let _fill = self.fill.lock();
		let snapshot = self.registry.snapshot();
		let current = self.cache.load_full();
		if let Some(chain) = current.get(snapshot.generation(), operation, ty) {
			return chain;
		}

		let chain = Arc::new(compute_chain(&snapshot, operation, ty));
		let mut next = ChainCache {
			generation: snapshot.generation(),
			chains: if current.generation == snapshot.generation() {
				current.chains.clone()
			} else {
				FxHashMap::default()
			},
		};
		next.insert(operation, ty, Arc::clone(&chain));
		self.cache.store(Arc::new(next));

		trace!(
			operation = %operation,
			target = ty.name(),
			generation = snapshot.generation(),
			chain = ?chain,
			"pipeline.resolved"
		);
		chain
	}

	/// Returns true when any advisor's type filter accepts `ty`.
	///
	/// Facades may skip resolution entirely for types that fail this check.
	pub fn is_advised(&self, ty: &TypeDescriptor) -> bool {
		self.registry.snapshot().advisors().iter().any(|a| a.selector().matches_type(ty))
	}

	/// Number of cached (type, operation) entries for the current generation.
	pub fn cached_len(&self) -> usize {
		let cache = self.cache.load();
		if cache.generation != self.registry.generation() {
			return 0;
		}
		cache.len()
	}
}

fn compute_chain(snapshot: &RegistrySnapshot, operation: &OperationDescriptor, ty: &TypeDescriptor) -> ResolvedChain {
	let (interceptors, advisor_ids): (Vec<_>, Vec<_>) = snapshot
		.advisors()
		.iter()
		.filter(|advisor| advisor.applies_to(operation, ty))
		.map(|advisor| (Arc::clone(advisor.interceptor()), advisor.shared_id()))
		.unzip();
	ResolvedChain {
		interceptors: Arc::from(interceptors),
		advisor_ids: Arc::from(advisor_ids),
	}
}
