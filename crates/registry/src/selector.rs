//! Selectors: where advice applies.
//!
//! A [`Selector`] pairs a [`TypeFilter`] with an [`OperationMatcher`]. The
//! type filter always runs first so the operation matcher is skipped for
//! types that can never be advised.
//!
//! Both predicates must be pure. Their answers are cached per (operation,
//! type) pair for the lifetime of a registry generation.

use std::fmt;
use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};
use rustc_hash::FxHashMap;
use weave_invocation::{OperationDescriptor, TypeDescriptor};

use crate::RegistryError;

/// Cheap pre-filter on the concrete type of a call target.
pub trait TypeFilter: Send + Sync {
	fn matches(&self, ty: &TypeDescriptor) -> bool;
}

/// Decides whether an operation on an already-accepted type is advised.
pub trait OperationMatcher: Send + Sync {
	fn matches(&self, operation: &OperationDescriptor, ty: &TypeDescriptor) -> bool;
}

/// Accepts every type.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyType;

impl TypeFilter for AnyType {
	fn matches(&self, _ty: &TypeDescriptor) -> bool {
		true
	}
}

/// Accepts exactly one concrete type name.
#[derive(Debug, Clone)]
pub struct TypeName(pub String);

impl TypeFilter for TypeName {
	fn matches(&self, ty: &TypeDescriptor) -> bool {
		ty.name() == self.0
	}
}

/// Accepts types assignable to an interface or supertype.
#[derive(Debug, Clone)]
pub struct AssignableTo(pub String);

impl TypeFilter for AssignableTo {
	fn matches(&self, ty: &TypeDescriptor) -> bool {
		ty.is_assignable_to(&self.0)
	}
}

/// Type filter backed by a closure.
pub struct TypeFilterFn<F>(pub F);

impl<F> TypeFilter for TypeFilterFn<F>
where
	F: Fn(&TypeDescriptor) -> bool + Send + Sync,
{
	fn matches(&self, ty: &TypeDescriptor) -> bool {
		(self.0)(ty)
	}
}

/// Accepts every operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyOperation;

impl OperationMatcher for AnyOperation {
	fn matches(&self, _operation: &OperationDescriptor, _ty: &TypeDescriptor) -> bool {
		true
	}
}

/// Accepts operations with an exact name.
#[derive(Debug, Clone)]
pub struct OperationName(pub String);

impl OperationMatcher for OperationName {
	fn matches(&self, operation: &OperationDescriptor, _ty: &TypeDescriptor) -> bool {
		operation.name() == self.0
	}
}

/// Accepts operations whose name matches any of a set of glob patterns,
/// such as `get*` or `{insert,update}*`.
#[derive(Clone)]
pub struct NamePatterns {
	patterns: Vec<String>,
	set: GlobSet,
}

impl NamePatterns {
	pub fn new<I, S>(patterns: I) -> Result<Self, RegistryError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut builder = GlobSetBuilder::new();
		let mut names = Vec::new();
		for pattern in patterns {
			let pattern = pattern.into();
			let glob = Glob::new(&pattern).map_err(|source| RegistryError::InvalidPattern {
				pattern: pattern.clone(),
				source,
			})?;
			builder.add(glob);
			names.push(pattern);
		}
		let set = builder.build().map_err(|source| RegistryError::InvalidPattern {
			pattern: names.join(","),
			source,
		})?;
		Ok(Self { patterns: names, set })
	}

	pub fn patterns(&self) -> &[String] {
		&self.patterns
	}
}

impl fmt::Debug for NamePatterns {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("NamePatterns").field(&self.patterns).finish()
	}
}

impl OperationMatcher for NamePatterns {
	fn matches(&self, operation: &OperationDescriptor, _ty: &TypeDescriptor) -> bool {
		self.set.is_match(operation.name())
	}
}

/// Operation matcher backed by a closure.
pub struct OperationMatcherFn<F>(pub F);

impl<F> OperationMatcher for OperationMatcherFn<F>
where
	F: Fn(&OperationDescriptor, &TypeDescriptor) -> bool + Send + Sync,
{
	fn matches(&self, operation: &OperationDescriptor, ty: &TypeDescriptor) -> bool {
		(self.0)(operation, ty)
	}
}

/// Predicate pair deciding where an advisor applies.
#[derive(Clone)]
pub struct Selector {
	type_filter: Arc<dyn TypeFilter>,
	matcher: Arc<dyn OperationMatcher>,
}

impl Selector {
	pub fn new(type_filter: impl TypeFilter + 'static, matcher: impl OperationMatcher + 'static) -> Self {
		Self {
			type_filter: Arc::new(type_filter),
			matcher: Arc::new(matcher),
		}
	}

	/// Matches every operation of every type.
	pub fn any() -> Self {
		Self::new(AnyType, AnyOperation)
	}

	/// Matches every operation of types assignable to `type_name`.
	pub fn assignable_to(type_name: impl Into<String>) -> Self {
		Self::new(AssignableTo(type_name.into()), AnyOperation)
	}

	/// Matches operations named `operation` on types assignable to `type_name`.
	pub fn operation(type_name: impl Into<String>, operation: impl Into<String>) -> Self {
		Self::new(AssignableTo(type_name.into()), OperationName(operation.into()))
	}

	/// Defers both predicates to a [`SelectorSource`].
	pub fn from_source(source: Arc<dyn SelectorSource>) -> Self {
		Self {
			type_filter: Arc::new(SourceTypeFilter(Arc::clone(&source))),
			matcher: Arc::new(SourceMatcher(source)),
		}
	}

	pub fn matches_type(&self, ty: &TypeDescriptor) -> bool {
		self.type_filter.matches(ty)
	}

	/// Type filter first, then the operation matcher.
	pub fn matches(&self, operation: &OperationDescriptor, ty: &TypeDescriptor) -> bool {
		self.type_filter.matches(ty) && self.matcher.matches(operation, ty)
	}
}

impl fmt::Debug for Selector {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Selector").finish_non_exhaustive()
	}
}

/// Externally declared advice metadata, typically produced by a parser.
pub trait SelectorSource: Send + Sync {
	/// Cheap check letting resolution skip types that carry no declarations.
	fn is_candidate(&self, _ty: &TypeDescriptor) -> bool {
		true
	}

	/// Selectors declared for `operation` on `ty`, or `None` when nothing is
	/// declared there.
	fn lookup(&self, ty: &TypeDescriptor, operation: &OperationDescriptor) -> Option<Vec<Selector>>;
}

struct SourceTypeFilter(Arc<dyn SelectorSource>);

impl TypeFilter for SourceTypeFilter {
	fn matches(&self, ty: &TypeDescriptor) -> bool {
		self.0.is_candidate(ty)
	}
}

struct SourceMatcher(Arc<dyn SelectorSource>);

impl OperationMatcher for SourceMatcher {
	fn matches(&self, operation: &OperationDescriptor, ty: &TypeDescriptor) -> bool {
		self.0
			.lookup(ty, operation)
			.is_some_and(|selectors| selectors.iter().any(|s| s.matches(operation, ty)))
	}
}

/// In-memory [`SelectorSource`] keyed by type name and operation name.
///
/// A declaration for operation `*` applies to every operation of the type.
#[derive(Debug, Default, Clone)]
pub struct DeclaredSelectors {
	declarations: FxHashMap<String, FxHashMap<String, Vec<Selector>>>,
}

impl DeclaredSelectors {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn declare(mut self, type_name: impl Into<String>, operation: impl Into<String>, selector: Selector) -> Self {
		self.declarations
			.entry(type_name.into())
			.or_default()
			.entry(operation.into())
			.or_default()
			.push(selector);
		self
	}
}

impl SelectorSource for DeclaredSelectors {
	fn is_candidate(&self, ty: &TypeDescriptor) -> bool {
		self.declarations.contains_key(ty.name())
	}

	fn lookup(&self, ty: &TypeDescriptor, operation: &OperationDescriptor) -> Option<Vec<Selector>> {
		let by_operation = self.declarations.get(ty.name())?;
		let mut found: Vec<Selector> = by_operation.get(operation.name()).cloned().unwrap_or_default();
		if let Some(wildcard) = by_operation.get("*") {
			found.extend(wildcard.iter().cloned());
		}
		(!found.is_empty()).then_some(found)
	}
}
