//! Persistence of account policy state
//!
//! Snapshots are plain JSON files, one directory per account.

mod account_storage;

pub use account_storage::AccountStorage;
