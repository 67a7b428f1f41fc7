use std::sync::Arc;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use super::*;
use crate::memory::{DriverEvent, MemoryStore};
use crate::{Synchronization, SynchronizationError};


fn manager_with(config: TransactionManagerConfig) -> (TransactionManager<MemoryStore>, MemoryStore) {
	let store = MemoryStore::new();
	(TransactionManager::with_config(store.clone(), config), store)
}

fn manager() -> (TransactionManager<MemoryStore>, MemoryStore) {
	manager_with(TransactionManagerConfig::default())
}

fn required(name: &str) -> TransactionDefinition {
	TransactionDefinition::new(Propagation::Required).named(name)
}

/// Synchronization logging each callback, optionally failing some.
#[derive(Default)]
struct Recorder {
	log: Mutex<Vec<String>>,
	fail_before_commit: bool,
	fail_after_commit: bool,
}

impl Recorder {
	fn register(self) -> Arc<Self> {
		let recorder = Arc::new(self);
		context::register_synchronization(Arc::clone(&recorder) as Arc<dyn Synchronization>).unwrap();
		recorder
	}

	fn log(&self) -> Vec<String> {
		self.log.lock().clone()
	}
}

impl Synchronization for Recorder {
	fn before_commit(&self, _read_only: bool) -> Result<(), SynchronizationError> {
		self.log.lock().push("before_commit".into());
		if self.fail_before_commit {
			return Err(SynchronizationError::new("before_commit refused"));
		}
		Ok(())
	}

	fn before_completion(&self) -> Result<(), SynchronizationError> {
		self.log.lock().push("before_completion".into());
		Ok(())
	}

	fn after_commit(&self) -> Result<(), SynchronizationError> {
		self.log.lock().push("after_commit".into());
		if self.fail_after_commit {
			return Err(SynchronizationError::new("after_commit failed"));
		}
		Ok(())
	}

	fn after_completion(&self, status: CompletionStatus) -> Result<(), SynchronizationError> {
		self.log.lock().push(format!("after_completion:{}", status.as_str()));
		Ok(())
	}
}

#[test]
fn commit_applies_writes_and_clears_context() {
	let (manager, store) = manager();
	let status = manager.get_transaction(&required("outer")).unwrap();
	assert!(status.is_new_transaction());
	assert!(status.is_new_synchronization());
	assert_eq!(context::current_name().as_deref(), Some("outer"));
	assert!(context::is_actual_transaction_active());

	store.put("k", "v").unwrap();
	assert!(store.committed().is_empty());
	manager.commit(status).unwrap();

	assert_eq!(store.get("k").as_deref(), Some("v"));
	assert_eq!(store.events(), vec![DriverEvent::Begin(1), DriverEvent::Commit(1), DriverEvent::Cleanup(1)]);
	assert_eq!(context::snapshot(), context::ContextSnapshot::default());
}

#[test]
fn failing_participant_poisons_outer_unit() {
	let (manager, store) = manager();
	let outer = manager.get_transaction(&required("outer")).unwrap();
	store.put("k", "v").unwrap();

	let inner = manager.get_transaction(&required("inner")).unwrap();
	assert!(!inner.is_new_transaction());
	manager.rollback(inner).unwrap();
	assert!(outer.is_global_rollback_only());

	let err = manager.commit(outer).unwrap_err();
	assert!(matches!(err, TransactionError::UnexpectedRollback));
	assert!(store.committed().is_empty());
	assert_eq!(store.events(), vec![DriverEvent::Begin(1), DriverEvent::Rollback(1), DriverEvent::Cleanup(1)]);
}

#[test]
fn participant_commit_of_poisoned_unit_is_silent_by_default() {
	let (manager, _store) = manager();
	let outer = manager.get_transaction(&required("outer")).unwrap();
	let doomed = manager.get_transaction(&required("doomed")).unwrap();
	manager.rollback(doomed).unwrap();

	let bystander = manager.get_transaction(&required("bystander")).unwrap();
	manager.commit(bystander).unwrap();
	assert!(matches!(manager.commit(outer), Err(TransactionError::UnexpectedRollback)));
}

#[test]
fn fail_early_reports_at_first_participant() {
	let (manager, _store) = manager_with(TransactionManagerConfig {
		fail_early_on_global_rollback_only: true,
		..TransactionManagerConfig::default()
	});
	let outer = manager.get_transaction(&required("outer")).unwrap();
	let doomed = manager.get_transaction(&required("doomed")).unwrap();
	manager.rollback(doomed).unwrap();

	let bystander = manager.get_transaction(&required("bystander")).unwrap();
	assert!(matches!(manager.commit(bystander), Err(TransactionError::UnexpectedRollback)));
	assert!(matches!(manager.commit(outer), Err(TransactionError::UnexpectedRollback)));
}

#[test]
fn participant_failure_left_to_originator_when_configured() {
	let (manager, store) = manager_with(TransactionManagerConfig {
		global_rollback_on_participation_failure: false,
		..TransactionManagerConfig::default()
	});
	let outer = manager.get_transaction(&required("outer")).unwrap();
	store.put("k", "v").unwrap();
	let inner = manager.get_transaction(&required("inner")).unwrap();
	manager.rollback(inner).unwrap();

	assert!(!outer.is_global_rollback_only());
	manager.commit(outer).unwrap();
	assert_eq!(store.get("k").as_deref(), Some("v"));
}

#[test]
fn local_rollback_only_rolls_back_quietly() {
	let (manager, store) = manager();
	let status = manager.get_transaction(&required("outer")).unwrap();
	store.put("k", "v").unwrap();
	status.set_rollback_only();

	manager.commit(status).unwrap();
	assert!(store.committed().is_empty());
	assert!(store.events().contains(&DriverEvent::Rollback(1)));
}

#[test]
fn nested_rollback_returns_to_savepoint() {
	let (manager, store) = manager();
	let outer = manager.get_transaction(&required("outer")).unwrap();
	store.put("a", "1").unwrap();

	let nested = manager.get_transaction(&TransactionDefinition::new(Propagation::Nested)).unwrap();
	assert!(nested.has_savepoint());
	assert!(nested.is_nested());
	assert!(!nested.is_new_transaction());
	store.put("b", "2").unwrap();
	manager.rollback(nested).unwrap();

	assert!(!outer.is_rollback_only());
	assert_eq!(store.get("b"), None);
	manager.commit(outer).unwrap();

	assert_eq!(store.committed().keys().cloned().collect::<Vec<_>>(), vec!["a".to_string()]);
	assert_eq!(
		store.events(),
		vec![
			DriverEvent::Begin(1),
			DriverEvent::CreateSavepoint(1),
			DriverEvent::RollbackToSavepoint(1),
			DriverEvent::ReleaseSavepoint(1),
			DriverEvent::Commit(1),
			DriverEvent::Cleanup(1),
		]
	);
}

#[test]
fn nested_rollback_keeps_poisoning_from_before_the_savepoint() {
	let (manager, store) = manager();
	let outer = manager.get_transaction(&required("outer")).unwrap();
	store.put("a", "1").unwrap();
	let doomed = manager.get_transaction(&required("doomed")).unwrap();
	manager.rollback(doomed).unwrap();
	assert!(outer.is_global_rollback_only());

	let nested = manager.get_transaction(&TransactionDefinition::new(Propagation::Nested)).unwrap();
	store.put("b", "2").unwrap();
	manager.rollback(nested).unwrap();
	assert!(outer.is_global_rollback_only());

	assert!(matches!(manager.commit(outer), Err(TransactionError::UnexpectedRollback)));
	assert!(store.committed().is_empty());
}

#[test]
fn nested_rollback_discards_poisoning_inside_the_savepoint() {
	let (manager, store) = manager();
	let outer = manager.get_transaction(&required("outer")).unwrap();
	store.put("a", "1").unwrap();

	let nested = manager.get_transaction(&TransactionDefinition::new(Propagation::Nested)).unwrap();
	let doomed = manager.get_transaction(&required("doomed")).unwrap();
	manager.rollback(doomed).unwrap();
	assert!(outer.is_global_rollback_only());
	manager.rollback(nested).unwrap();

	assert!(!outer.is_global_rollback_only());
	manager.commit(outer).unwrap();
	assert_eq!(store.get("a").as_deref(), Some("1"));
}

#[test]
fn nested_commit_releases_savepoint() {
	let (manager, store) = manager();
	let outer = manager.get_transaction(&required("outer")).unwrap();
	let nested = manager.get_transaction(&TransactionDefinition::new(Propagation::Nested)).unwrap();
	store.put("b", "2").unwrap();
	manager.commit(nested).unwrap();
	manager.commit(outer).unwrap();

	assert_eq!(store.get("b").as_deref(), Some("2"));
	assert!(store.events().contains(&DriverEvent::ReleaseSavepoint(1)));
}

#[test]
fn nested_without_savepoints_begins_inner_unit() {
	let (manager, store) = manager();
	store.set_savepoints(false);
	let outer = manager.get_transaction(&required("outer")).unwrap();

	let nested = manager.get_transaction(&TransactionDefinition::new(Propagation::Nested)).unwrap();
	assert!(nested.is_new_transaction());
	assert!(nested.is_nested());
	assert_eq!(store.bound().map(|u| u.handle().id()), Some(2));
	store.put("inner", "x").unwrap();
	manager.commit(nested).unwrap();

	assert_eq!(store.bound().map(|u| u.handle().id()), Some(1));
	assert_eq!(store.get("inner").as_deref(), Some("x"));
	manager.commit(outer).unwrap();
	assert!(!manager.has_bound_transaction());
}

#[test]
fn nested_refused_when_disallowed() {
	let (manager, _store) = manager_with(TransactionManagerConfig {
		nested_transaction_allowed: false,
		..TransactionManagerConfig::default()
	});
	let outer = manager.get_transaction(&required("outer")).unwrap();
	let err = manager.get_transaction(&TransactionDefinition::new(Propagation::Nested)).unwrap_err();
	assert!(matches!(err, TransactionError::NestedNotSupported));
	assert!(err.is_configuration());
	manager.rollback(outer).unwrap();
}

#[test]
fn validation_rejects_conflicting_participants() {
	let (manager, _store) = manager_with(TransactionManagerConfig {
		validate_existing_transaction: true,
		..TransactionManagerConfig::default()
	});
	let outer = manager
		.get_transaction(&required("outer").with_isolation(Isolation::Serializable).read_only())
		.unwrap();

	let isolation = manager
		.get_transaction(&required("inner").with_isolation(Isolation::ReadCommitted).read_only())
		.unwrap_err();
	assert!(matches!(
		isolation,
		TransactionError::IncompatibleIsolation {
			requested: Isolation::ReadCommitted,
			existing: Isolation::Serializable,
		}
	));

	let read_only = manager.get_transaction(&required("writer")).unwrap_err();
	assert!(matches!(read_only, TransactionError::ReadOnlyMismatch));

	let compatible = manager.get_transaction(&required("reader").read_only()).unwrap();
	manager.commit(compatible).unwrap();
	manager.commit(outer).unwrap();
}

#[test]
fn not_supported_suspends_and_resumes() {
	let (manager, store) = manager();
	let outer = manager.get_transaction(&required("outer")).unwrap();

	let detached = manager.get_transaction(&TransactionDefinition::new(Propagation::NotSupported)).unwrap();
	assert!(!detached.has_transaction());
	assert!(detached.has_suspended());
	assert!(!manager.has_bound_transaction());
	assert_eq!(context::current_name(), None);
	store.put("autocommit", "1").unwrap();
	assert_eq!(store.committed().len(), 1);

	manager.commit(detached).unwrap();
	assert!(manager.has_bound_transaction());
	assert_eq!(context::current_name().as_deref(), Some("outer"));
	manager.commit(outer).unwrap();
	assert!(store.events().ends_with(&[DriverEvent::Suspend(1), DriverEvent::Resume(1), DriverEvent::Commit(1), DriverEvent::Cleanup(1)]));
}

#[test]
fn repeated_suspension_restores_full_context() {
	let (manager, _store) = manager();
	let definition = required("ledger").read_only().with_isolation(Isolation::Serializable);
	let outer = manager.get_transaction(&definition).unwrap();
	let recorder = Recorder::default().register();
	let before = context::snapshot();
	assert!(before.read_only);
	assert_eq!(before.isolation, Some(Isolation::Serializable));
	assert_eq!(before.synchronization_count, 1);

	for name in ["audit-1", "audit-2"] {
		let audit = manager
			.get_transaction(&TransactionDefinition::new(Propagation::RequiresNew).named(name))
			.unwrap();
		assert!(audit.has_suspended());
		assert_eq!(context::current_name().as_deref(), Some(name));
		assert!(!context::snapshot().read_only);
		manager.commit(audit).unwrap();
		assert_eq!(context::snapshot(), before);
	}

	manager.commit(outer).unwrap();
	assert!(recorder.log().contains(&"after_commit".to_string()));
}

#[test]
fn default_timeout_fills_missing_timeout() {
	let (manager, _store) = manager_with(TransactionManagerConfig {
		default_timeout_secs: Some(30),
		..TransactionManagerConfig::default()
	});
	let status = manager.get_transaction(&required("outer")).unwrap();
	assert_eq!(status.definition().timeout_secs, Some(30));
	manager.rollback(status).unwrap();

	let explicit = manager.get_transaction(&required("outer").with_timeout_secs(5)).unwrap();
	assert_eq!(explicit.definition().timeout_secs, Some(5));
	manager.rollback(explicit).unwrap();
}

#[test]
fn synchronization_callbacks_follow_commit() {
	let (manager, _store) = manager();
	let status = manager.get_transaction(&required("outer")).unwrap();
	let recorder = Recorder::default().register();
	manager.commit(status).unwrap();

	assert_eq!(
		recorder.log(),
		vec!["before_commit", "before_completion", "after_commit", "after_completion:committed"]
	);
}

#[test]
fn after_completion_runs_when_after_commit_fails() {
	let (manager, store) = manager();
	let status = manager.get_transaction(&required("outer")).unwrap();
	store.put("k", "v").unwrap();
	let recorder = Recorder {
		fail_after_commit: true,
		..Recorder::default()
	}
	.register();

	let err = manager.commit(status).unwrap_err();
	assert!(matches!(err, TransactionError::Synchronization(_)));
	assert_eq!(store.get("k").as_deref(), Some("v"));
	assert_eq!(recorder.log().last().map(String::as_str), Some("after_completion:committed"));
	assert!(!context::is_synchronization_active());
}

#[test]
fn before_commit_failure_rolls_back() {
	let (manager, store) = manager();
	let status = manager.get_transaction(&required("outer")).unwrap();
	store.put("k", "v").unwrap();
	let recorder = Recorder {
		fail_before_commit: true,
		..Recorder::default()
	}
	.register();

	let err = manager.commit(status).unwrap_err();
	assert!(matches!(err, TransactionError::Synchronization(_)));
	assert!(store.committed().is_empty());
	assert_eq!(
		recorder.log(),
		vec!["before_commit", "before_completion", "after_completion:rolled_back"]
	);
}

#[test]
fn commit_failure_reports_unknown_outcome() {
	let (manager, store) = manager();
	let status = manager.get_transaction(&required("outer")).unwrap();
	let recorder = Recorder::default().register();
	store.fail_next(ResourceOp::Commit);

	let err = manager.commit(status).unwrap_err();
	assert_eq!(err.resource_op(), Some(ResourceOp::Commit));
	assert_eq!(recorder.log().last().map(String::as_str), Some("after_completion:unknown"));
	assert!(!manager.has_bound_transaction());
}

#[test]
fn commit_failure_rolls_back_when_configured() {
	let (manager, store) = manager_with(TransactionManagerConfig {
		rollback_on_commit_failure: true,
		..TransactionManagerConfig::default()
	});
	let status = manager.get_transaction(&required("outer")).unwrap();
	let recorder = Recorder::default().register();
	store.fail_next(ResourceOp::Commit);

	let err = manager.commit(status).unwrap_err();
	assert_eq!(err.resource_op(), Some(ResourceOp::Commit));
	assert!(store.events().contains(&DriverEvent::Rollback(1)));
	assert_eq!(recorder.log().last().map(String::as_str), Some("after_completion:rolled_back"));
}

#[test]
fn resume_failure_discards_outer_unit_but_restores_context() {
	let (manager, store) = manager();
	let outer = manager.get_transaction(&required("outer")).unwrap();
	let inner = manager.get_transaction(&TransactionDefinition::new(Propagation::RequiresNew).named("inner")).unwrap();
	assert!(inner.has_suspended());
	store.fail_next(ResourceOp::Resume);

	let err = manager.commit(inner).unwrap_err();
	assert!(matches!(err, TransactionError::ResumeFailed(_)));
	assert_eq!(err.resource_op(), Some(ResourceOp::Resume));
	assert!(!manager.has_bound_transaction());
	assert_eq!(context::current_name().as_deref(), Some("outer"));
	assert!(context::is_actual_transaction_active());

	manager.rollback(outer).unwrap();
	assert_eq!(context::snapshot(), context::ContextSnapshot::default());
}

#[test]
fn supports_without_unit_only_synchronizes_when_always() {
	let (manager, _store) = manager();
	let empty = manager.get_transaction(&TransactionDefinition::new(Propagation::Supports)).unwrap();
	assert!(!empty.has_transaction());
	assert!(!empty.is_new_synchronization());
	manager.commit(empty).unwrap();

	let (manager, _store) = manager_with(TransactionManagerConfig {
		synchronization: SynchronizationMode::Always,
		..TransactionManagerConfig::default()
	});
	let empty = manager.get_transaction(&TransactionDefinition::new(Propagation::Supports)).unwrap();
	assert!(empty.is_new_synchronization());
	assert!(context::is_synchronization_active());
	assert!(!context::is_actual_transaction_active());
	manager.commit(empty).unwrap();
	assert!(!context::is_synchronization_active());
}
