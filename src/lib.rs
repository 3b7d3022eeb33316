//! Per-account delegated permissions and mail filter rules
//!
//! `PermissionStore` keeps access-control entries per account and
//! `FilterRuleStore` keeps the incoming and outgoing filter rule lists.
//! Both commit copy-on-write so readers never see a half-applied batch.
//! The `handlers` module exposes them as JSON request handlers.

pub mod account;
pub mod config;
pub mod core;
pub mod filters;
pub mod handlers;
pub mod logging;
pub mod permissions;
pub mod service;
pub mod storage;

pub use account::{Account, AccountDirectory, AccountId, Authorizer, Mailbox};
pub use config::{LogFormat, LoggingConfig, PolicyConfig};
pub use crate::core::{ServiceError, ServiceResult};
pub use filters::{Direction, FilterRuleSet, FilterRuleStore, Rule};
pub use handlers::{Handler, HandlerRegistry, RequestContext};
pub use permissions::{Ace, Grantee, PermissionStore, Right, RightRegistry, RightScope};
pub use service::{AccessLevel, PolicyService};
pub use storage::AccountStorage;
