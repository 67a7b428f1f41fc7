use std::sync::Arc;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;

use crate::fixtures::{Account, facade_identity, recorder};
use crate::{Interceptor, InvocationError, Value, interceptor_fn, invoke};

/// Must run interceptors in chain order on entry and reverse order on exit.
///
/// * Enforced in: `Invocation::proceed`
/// * Failure symptom: a transaction interceptor commits before an inner
///   interceptor has finished its after-work.
#[cfg_attr(test, test)]
pub(crate) fn test_chain_order_is_nested() {
	let account = Account::new();
	let log = Arc::new(Mutex::new(Vec::new()));
	let chain = vec![recorder("outer", &log), recorder("inner", &log)];

	invoke(account.context("deposit", vec![Value::from(1i64)]), &chain).unwrap();

	assert_eq!(*log.lock(), vec!["+outer", "+inner", "-inner", "-outer"]);
}

/// Must never advance the cursor backwards outside an explicit fork.
///
/// * Enforced in: `Invocation::proceed`, `Invocation::fork`
/// * Failure symptom: a retrying interceptor re-enters interceptors that
///   already completed, doubling their side effects.
#[cfg_attr(test, test)]
pub(crate) fn test_cursor_only_moves_forward() {
	let account = Account::new();
	let probe: Arc<dyn Interceptor> = Arc::new(interceptor_fn("probe", |inv| {
		let before = inv.cursor();
		let result = inv.proceed();
		assert!(inv.cursor() >= before);
		assert_eq!(inv.remaining(), 0);
		result
	}));
	let passthrough: Arc<dyn Interceptor> = Arc::new(interceptor_fn("pass", |inv| inv.proceed()));

	invoke(account.context("deposit", vec![Value::from(1i64)]), &[probe, passthrough]).unwrap();
}

/// Must return errors from the target without wrapping them.
///
/// * Enforced in: `invoke`, `Invocation::proceed`
/// * Failure symptom: rollback rules see an infrastructure category instead of
///   the business failure's own category.
#[cfg_attr(test, test)]
pub(crate) fn test_errors_are_not_wrapped() {
	let account = Account::new();
	let passthrough: Arc<dyn Interceptor> = Arc::new(interceptor_fn("pass", |inv| inv.proceed()));

	let err = invoke(account.context("fail", vec![]), &[passthrough]).unwrap_err();

	assert!(matches!(err, InvocationError::Fault(_)));
	assert_eq!(err.category().name(), "Recoverable");
}

/// Must bypass interceptor machinery entirely for an empty chain.
///
/// * Enforced in: `invoke`
/// * Failure symptom: unadvised calls pay per-call allocation for an
///   invocation they never use.
#[cfg_attr(test, test)]
pub(crate) fn test_empty_chain_is_direct_call() {
	let account = Account::new();
	invoke(account.context("deposit", vec![Value::from(2i64)]), &[]).unwrap();
	assert_eq!(account.balance(), 2);
	assert_eq!(account.dispatches.load(Ordering::SeqCst), 1);
}

/// Must substitute the facade identity only for compatible self-returns.
///
/// * Enforced in: `substitute_identity`
/// * Failure symptom: callers holding "the same object" bypass advice on their
///   next call, or receive a facade where the declared type cannot hold one.
#[cfg_attr(test, test)]
pub(crate) fn test_identity_substitution_respects_return_type() {
	let account = Account::new();
	let identity = facade_identity();

	let compatible = invoke(account.context("touch", vec![]).with_facade(identity.clone()), &[]).unwrap();
	let incompatible = invoke(account.context("raw", vec![]).with_facade(identity.clone()), &[]).unwrap();

	assert!(compatible.ptr_eq(identity.value()));
	assert!(!incompatible.ptr_eq(identity.value()));
}
