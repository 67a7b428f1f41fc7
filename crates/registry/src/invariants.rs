use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use weave_invocation::{OperationDescriptor, TypeDescriptor};

use crate::fixtures::{inventory_type, log, op, recording, recording_advisor};
use crate::selector::{OperationMatcherFn, TypeFilterFn};
use crate::{Advisor, AdvisorRegistry, PipelineBuilder, Selector};

/// Must evaluate selectors for a given key at most once per registry generation.
///
/// * Enforced in: `PipelineBuilder::resolve`
/// * Failure symptom: selector predicates run on every call, turning the hot
///   path into a registry scan.
#[cfg_attr(test, test)]
pub(crate) fn test_chain_computed_once_per_generation() {
	let log = log();
	let evaluations = Arc::new(AtomicUsize::new(0));
	let counter = Arc::clone(&evaluations);
	let registry = Arc::new(AdvisorRegistry::new());
	registry
		.register(Advisor::new(
			"counted",
			Selector::new(
				TypeFilterFn(|_: &TypeDescriptor| true),
				OperationMatcherFn(move |_: &OperationDescriptor, _: &TypeDescriptor| {
					counter.fetch_add(1, Ordering::SeqCst);
					true
				}),
			),
			recording("counted", &log),
		))
		.unwrap();
	let builder = PipelineBuilder::new(registry);
	let ty = inventory_type();
	let count = op(&ty, "count");

	for _ in 0..5 {
		builder.resolve(&count, &ty);
	}

	assert_eq!(evaluations.load(Ordering::SeqCst), 1);
}

/// Must recompute chains after the registry publishes a new generation.
///
/// * Enforced in: `AdvisorRegistry::register_group`, `PipelineBuilder::resolve`
/// * Failure symptom: advice registered after first use never applies.
#[cfg_attr(test, test)]
pub(crate) fn test_registration_invalidates_cache() {
	let log = log();
	let registry = Arc::new(AdvisorRegistry::new());
	let builder = PipelineBuilder::new(Arc::clone(&registry));
	let ty = inventory_type();
	let count = op(&ty, "count");

	let before = builder.resolve(&count, &ty);
	registry.register(recording_advisor("new", &log)).unwrap();
	let after = builder.resolve(&count, &ty);

	assert!(before.is_empty());
	assert_eq!(after.advisor_ids().collect::<Vec<_>>(), vec!["new"]);
}

/// Must never consult the operation matcher for a type the filter rejects.
///
/// * Enforced in: `Selector::matches`
/// * Failure symptom: expensive matchers run for every type in the program.
#[cfg_attr(test, test)]
pub(crate) fn test_type_filter_runs_first() {
	let log = log();
	let registry = Arc::new(AdvisorRegistry::new());
	registry
		.register(Advisor::new(
			"never",
			Selector::new(
				TypeFilterFn(|ty: &TypeDescriptor| ty.name() == "Other"),
				OperationMatcherFn(|_: &OperationDescriptor, _: &TypeDescriptor| -> bool {
					panic!("operation matcher reached for rejected type")
				}),
			),
			recording("never", &log),
		))
		.unwrap();
	let builder = PipelineBuilder::new(registry);
	let ty = inventory_type();

	assert!(builder.resolve(&op(&ty, "count"), &ty).is_empty());
}

/// Must sort advisors with an explicit order before advisors without one.
///
/// * Enforced in: `Advisor::precedence_cmp`
/// * Failure symptom: a transaction interceptor declared with order 0 runs
///   inside an unordered logging interceptor instead of around it.
#[cfg_attr(test, test)]
pub(crate) fn test_unordered_advisors_sort_last() {
	let log = log();
	let registry = AdvisorRegistry::new();
	registry.register(recording_advisor("unordered", &log)).unwrap();
	registry.register(recording_advisor("max", &log).with_order(i32::MAX)).unwrap();

	let ids: Vec<_> = registry.snapshot().advisors().iter().map(|a| a.id().to_string()).collect();
	assert_eq!(ids, vec!["max", "unordered"]);
}
