use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How a unit of work relates to one already bound on the calling thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Propagation {
	/// Join the current unit, or begin one when none is bound.
	#[default]
	Required,
	/// Join the current unit, or run without one.
	Supports,
	/// Join the current unit; fail when none is bound.
	Mandatory,
	/// Always begin a fresh unit, suspending any current one.
	RequiresNew,
	/// Run without a unit, suspending any current one.
	NotSupported,
	/// Run without a unit; fail when one is bound.
	Never,
	/// Run inside a savepoint of the current unit, or begin one when none is bound.
	Nested,
}

impl Propagation {
	pub const ALL: [Self; 7] = [
		Self::Required,
		Self::Supports,
		Self::Mandatory,
		Self::RequiresNew,
		Self::NotSupported,
		Self::Never,
		Self::Nested,
	];

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Required => "REQUIRED",
			Self::Supports => "SUPPORTS",
			Self::Mandatory => "MANDATORY",
			Self::RequiresNew => "REQUIRES_NEW",
			Self::NotSupported => "NOT_SUPPORTED",
			Self::Never => "NEVER",
			Self::Nested => "NESTED",
		}
	}
}

impl fmt::Display for Propagation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Isolation level requested from the resource driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Isolation {
	/// Whatever the resource uses by default.
	#[default]
	Default,
	ReadUncommitted,
	ReadCommitted,
	RepeatableRead,
	Serializable,
}

impl Isolation {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Default => "DEFAULT",
			Self::ReadUncommitted => "READ_UNCOMMITTED",
			Self::ReadCommitted => "READ_COMMITTED",
			Self::RepeatableRead => "REPEATABLE_READ",
			Self::Serializable => "SERIALIZABLE",
		}
	}
}

impl fmt::Display for Isolation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Requested shape of a unit of work.
///
/// Deserializes from a table such as
/// `{ propagation = "REQUIRES_NEW", isolation = "SERIALIZABLE", timeout_secs = 5 }`;
/// omitted fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionDefinition {
	pub propagation: Propagation,
	pub isolation: Isolation,
	/// Handed to the driver; the engine never preempts a running call.
	pub timeout_secs: Option<u64>,
	pub read_only: bool,
	pub name: Option<String>,
}

impl TransactionDefinition {
	pub fn new(propagation: Propagation) -> Self {
		Self {
			propagation,
			..Self::default()
		}
	}

	pub fn with_isolation(mut self, isolation: Isolation) -> Self {
		self.isolation = isolation;
		self
	}

	pub fn with_timeout_secs(mut self, secs: u64) -> Self {
		self.timeout_secs = Some(secs);
		self
	}

	pub fn read_only(mut self) -> Self {
		self.read_only = true;
		self
	}

	pub fn named(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}

	pub fn timeout(&self) -> Option<Duration> {
		self.timeout_secs.map(Duration::from_secs)
	}
}
