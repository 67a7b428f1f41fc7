use thiserror::Error;

/// Errors raised while building or registering advice.
#[derive(Debug, Error)]
pub enum RegistryError {
	#[error("advisor '{id}' is already registered")]
	DuplicateAdvisor { id: String },
	#[error("invalid operation pattern '{pattern}'")]
	InvalidPattern {
		pattern: String,
		#[source]
		source: globset::Error,
	},
}
