use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// When the manager activates synchronization for a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynchronizationMode {
	/// Also for scopes without a real unit, such as `SUPPORTS` with nothing bound.
	Always,
	/// Only for scopes backed by a real unit.
	#[default]
	OnActualTransaction,
	Never,
}

/// Behavior switches for a [`TransactionManager`](crate::TransactionManager).
///
/// ```toml
/// synchronization = "always"
/// default_timeout_secs = 30
/// global_rollback_on_participation_failure = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransactionManagerConfig {
	pub synchronization: SynchronizationMode,
	/// Applied to definitions that carry no timeout of their own.
	pub default_timeout_secs: Option<u64>,
	/// Allow `NESTED` when a unit is already bound.
	pub nested_transaction_allowed: bool,
	/// Reject participants whose isolation or read-only flag conflicts with
	/// the unit they join.
	pub validate_existing_transaction: bool,
	/// A failing participant marks the whole unit rollback-only.
	pub global_rollback_on_participation_failure: bool,
	/// Report an unexpected rollback at the first participant that commits a
	/// poisoned unit rather than only at the outermost boundary.
	pub fail_early_on_global_rollback_only: bool,
	/// Roll back when a physical commit fails instead of reporting an
	/// unknown outcome.
	pub rollback_on_commit_failure: bool,
}

impl Default for TransactionManagerConfig {
	fn default() -> Self {
		Self {
			synchronization: SynchronizationMode::default(),
			default_timeout_secs: None,
			nested_transaction_allowed: true,
			validate_existing_transaction: false,
			global_rollback_on_participation_failure: true,
			fail_early_on_global_rollback_only: false,
			rollback_on_commit_failure: false,
		}
	}
}

impl TransactionManagerConfig {
	pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(input)?)
	}
}
