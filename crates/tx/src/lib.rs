//! Transaction propagation engine.
//!
//! [`TransactionManager`] implements the propagation state machine over a
//! pluggable [`ResourceDriver`]. Thread-bound state lives in [`context`];
//! lifecycle listeners implement [`Synchronization`]. The engine is usually
//! reached through a [`TransactionInterceptor`] registered as an advisor, or
//! programmatically through a [`TransactionTemplate`].
//!
//! # Propagation
//!
//! | mode | no unit bound | unit bound |
//! |---|---|---|
//! | `REQUIRED` | begin | join |
//! | `SUPPORTS` | empty scope | join |
//! | `MANDATORY` | error | join |
//! | `REQUIRES_NEW` | begin | suspend, begin |
//! | `NOT_SUPPORTED` | empty scope | suspend, empty scope |
//! | `NEVER` | empty scope | error |
//! | `NESTED` | begin | savepoint, or nested begin |
//!
//! A participant that fails marks the whole unit rollback-only by default;
//! the outermost commit then rolls back and reports
//! [`TransactionError::UnexpectedRollback`].

mod config;
pub mod context;
pub mod current;
mod definition;
mod driver;
mod error;
mod interceptor;
mod manager;
pub mod memory;
mod rules;
mod scope;
mod source;
mod status;
mod synchronization;
mod template;


pub use config::{SynchronizationMode, TransactionManagerConfig};
pub use context::ResourceKey;
pub use current::CurrentTransaction;
pub use definition::{Isolation, Propagation, TransactionDefinition};
pub use driver::ResourceDriver;
pub use error::{ConfigError, ContextError, ResourceError, ResourceOp, SynchronizationError, TransactionError};
pub use interceptor::{JOINPOINT_ATTRIBUTE, TransactionInterceptor, transaction_advisor};
pub use manager::TransactionManager;
pub use rules::{RollbackRule, TransactionAttribute};
pub use scope::TransactionScope;
pub use source::{MapAttributeSource, NameMatchAttributeSource, TransactionAttributeSource};
pub use status::{BoundResource, SuspendedResources, TransactionStatus};
pub use synchronization::{CompletionStatus, Synchronization};
pub use template::{TemplateError, TransactionTemplate};
