//! Accounts and the collaborators that resolve and authorize them
//!
//! The stores never look accounts up themselves. Callers resolve the target
//! through an [`AccountDirectory`] and check the caller through an
//! [`Authorizer`] before touching a store.

mod directory;

pub use directory::{
    Account, AccountDirectory, AccountId, Authorizer, InMemoryDirectory, Mailbox,
    StaticAuthorizer,
};
