//! Transaction attribute sources.
//!
//! A source answers "which transaction attribute, if any, applies to this
//! operation on this type". Sources are consulted once per (operation, type)
//! when the pipeline resolves, and again per call by the interceptor.

use std::sync::Arc;

use globset::{Glob, GlobMatcher};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use tracing::trace;
use weave_invocation::{OperationDescriptor, TypeDescriptor};

use crate::{ConfigError, RollbackRule, TransactionAttribute, TransactionDefinition};

pub trait TransactionAttributeSource: Send + Sync {
	/// Cheap pre-filter; `false` means no operation of `ty` is transactional.
	fn is_candidate(&self, _ty: &TypeDescriptor) -> bool {
		true
	}

	fn attribute(&self, operation: &OperationDescriptor, ty: &TypeDescriptor) -> Option<Arc<TransactionAttribute>>;
}

struct NameMatchEntry {
	pattern: String,
	matcher: GlobMatcher,
	attribute: Arc<TransactionAttribute>,
}

impl NameMatchEntry {
	/// Patterns containing a dot match `Type.operation`; others match the
	/// bare operation name.
	fn subject<'a>(&self, operation: &'a str, qualified: &'a str) -> &'a str {
		if self.pattern.contains('.') { qualified } else { operation }
	}
}

/// Attributes keyed by operation name pattern, e.g. `find*` or
/// `OrderService.place*`.
///
/// An exact name match wins; otherwise the longest matching pattern wins,
/// ties going to the pattern added first.
#[derive(Default)]
pub struct NameMatchAttributeSource {
	entries: Vec<NameMatchEntry>,
}

impl NameMatchAttributeSource {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add(mut self, pattern: impl Into<String>, attribute: TransactionAttribute) -> Result<Self, ConfigError> {
		let pattern = pattern.into();
		let matcher = Glob::new(&pattern)
			.map_err(|source| ConfigError::InvalidPattern {
				pattern: pattern.clone(),
				source,
			})?
			.compile_matcher();
		self.entries.push(NameMatchEntry {
			pattern,
			matcher,
			attribute: Arc::new(attribute),
		});
		Ok(self)
	}

	/// Loads `[[attribute]]` tables:
	///
	/// ```toml
	/// [[attribute]]
	/// pattern = "find*"
	/// propagation = "SUPPORTS"
	/// read_only = true
	///
	/// [[attribute]]
	/// pattern = "OrderService.place*"
	/// propagation = "REQUIRES_NEW"
	/// rollback_for = ["Recoverable"]
	/// ```
	pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
		let file: AttributeFile = toml::from_str(input)?;
		file.attributes.into_iter().try_fold(Self::new(), |source, entry| {
			let rules = entry
				.rollback_for
				.into_iter()
				.map(RollbackRule::rollback_for_name)
				.chain(entry.no_rollback_for.into_iter().map(RollbackRule::no_rollback_for_name))
				.collect();
			source.add(
				entry.pattern,
				TransactionAttribute {
					definition: entry.definition,
					rules,
				},
			)
		})
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

impl TransactionAttributeSource for NameMatchAttributeSource {
	fn is_candidate(&self, _ty: &TypeDescriptor) -> bool {
		!self.entries.is_empty()
	}

	fn attribute(&self, operation: &OperationDescriptor, ty: &TypeDescriptor) -> Option<Arc<TransactionAttribute>> {
		let name = operation.name();
		let qualified = format!("{}.{}", ty.name(), name);

		if let Some(exact) = self.entries.iter().find(|e| e.pattern == e.subject(name, &qualified)) {
			return Some(Arc::clone(&exact.attribute));
		}

		let mut best: Option<&NameMatchEntry> = None;
		for entry in &self.entries {
			if entry.matcher.is_match(entry.subject(name, &qualified))
				&& best.is_none_or(|b| b.pattern.len() < entry.pattern.len())
			{
				best = Some(entry);
			}
		}
		if let Some(entry) = best {
			trace!(operation = %qualified, pattern = %entry.pattern, "transaction attribute matched");
		}
		best.map(|entry| Arc::clone(&entry.attribute))
	}
}

#[derive(Deserialize)]
struct AttributeFile {
	#[serde(default, rename = "attribute")]
	attributes: Vec<AttributeEntry>,
}

#[derive(Deserialize)]
struct AttributeEntry {
	pattern: String,
	#[serde(flatten)]
	definition: TransactionDefinition,
	#[serde(default)]
	rollback_for: Vec<String>,
	#[serde(default)]
	no_rollback_for: Vec<String>,
}

/// Attributes keyed by exact type and operation name.
#[derive(Debug, Default, Clone)]
pub struct MapAttributeSource {
	attributes: FxHashMap<String, FxHashMap<String, Arc<TransactionAttribute>>>,
}

impl MapAttributeSource {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(mut self, type_name: impl Into<String>, operation: impl Into<String>, attribute: TransactionAttribute) -> Self {
		self.attributes
			.entry(type_name.into())
			.or_default()
			.insert(operation.into(), Arc::new(attribute));
		self
	}
}

impl TransactionAttributeSource for MapAttributeSource {
	fn is_candidate(&self, ty: &TypeDescriptor) -> bool {
		self.attributes.contains_key(ty.name())
	}

	fn attribute(&self, operation: &OperationDescriptor, ty: &TypeDescriptor) -> Option<Arc<TransactionAttribute>> {
		self.attributes.get(ty.name())?.get(operation.name()).cloned()
	}
}
