//! Request handlers
//!
//! Thin JSON adapters over `PolicyService`: each handler parses a request,
//! authorizes the caller against the target account, and calls one store.

mod filter;
mod handler;
mod permission;
mod registry;

pub use filter::{GetFilterRulesHandler, ModifyFilterRulesHandler};
pub use handler::{Handler, RequestContext};
pub use permission::{GetPermissionHandler, GrantPermissionHandler, RevokePermissionHandler};
pub use registry::{fault, HandlerRegistry};
