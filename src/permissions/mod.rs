//! Permission system for account access control
//!
//! This module provides the access-control entry store fronted by the
//! GetPermission, GrantPermission and RevokePermission handlers. Entries
//! are reconciled as a set: granting upserts, revoking removes whatever
//! matches and silently skips the rest.

mod ace;
mod manager;
mod right;

pub use ace::{Ace, AceConstraints, AceKey, Grantee};
pub use manager::PermissionStore;
pub use right::{Right, RightRegistry, RightScope};
