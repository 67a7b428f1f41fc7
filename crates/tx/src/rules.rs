//! Rollback rules.
//!
//! # Invariants
//!
//! - Among matching rules the one with the fewest supertype hops wins; ties
//!   go to the rule declared first.
//! - With no matching rule, unchecked and fatal failures roll back and
//!   everything else commits.

use tracing::trace;
use weave_invocation::{ErrorCategory, InvocationError};

use crate::TransactionDefinition;

/// Maps an error category to a rollback decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackRule {
	category: String,
	rollback: bool,
}

impl RollbackRule {
	pub fn rollback_for(category: &ErrorCategory) -> Self {
		Self::rollback_for_name(category.name())
	}

	pub fn no_rollback_for(category: &ErrorCategory) -> Self {
		Self::no_rollback_for_name(category.name())
	}

	/// Rule for a category known only by name, such as one read from config.
	pub fn rollback_for_name(category: impl Into<String>) -> Self {
		Self {
			category: category.into(),
			rollback: true,
		}
	}

	pub fn no_rollback_for_name(category: impl Into<String>) -> Self {
		Self {
			category: category.into(),
			rollback: false,
		}
	}

	pub fn category(&self) -> &str {
		&self.category
	}

	pub fn is_rollback(&self) -> bool {
		self.rollback
	}

	/// Supertype hops from `category` to this rule, if it matches at all.
	pub fn depth(&self, category: &ErrorCategory) -> Option<usize> {
		category.depth_to(&self.category)
	}
}

/// Definition plus the rules deciding how failures complete the unit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionAttribute {
	pub definition: TransactionDefinition,
	pub rules: Vec<RollbackRule>,
}

impl TransactionAttribute {
	pub fn new(definition: TransactionDefinition) -> Self {
		Self {
			definition,
			rules: Vec::new(),
		}
	}

	pub fn with_rule(mut self, rule: RollbackRule) -> Self {
		self.rules.push(rule);
		self
	}

	/// Whether `error` should roll the unit back rather than commit it.
	pub fn rollback_on(&self, error: &InvocationError) -> bool {
		self.rollback_on_category(error.category())
	}

	pub fn rollback_on_category(&self, category: &ErrorCategory) -> bool {
		let mut winner: Option<(usize, &RollbackRule)> = None;
		for rule in &self.rules {
			if let Some(depth) = rule.depth(category)
				&& winner.is_none_or(|(best, _)| depth < best)
			{
				winner = Some((depth, rule));
			}
		}

		match winner {
			Some((depth, rule)) => {
				trace!(category = category.name(), rule = rule.category(), depth, rollback = rule.rollback, "rollback rule matched");
				rule.rollback
			}
			None => category.is_unchecked(),
		}
	}
}
