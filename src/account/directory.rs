//! Account directory and authorization contracts
//!
//! Includes simple in-memory implementations for hosts that keep
//! accounts elsewhere and for tests.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

use crate::core::{ServiceError, ServiceResult};
use crate::permissions::Right;

/// Stable identifier of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Generate a fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for AccountId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl FromStr for AccountId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// An account as seen by this crate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Stable id
    pub id: AccountId,
    /// Primary email address
    pub name: String,
}

impl Account {
    /// Create an account with a fresh id
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: AccountId::new(),
            name: name.into(),
        }
    }
}

/// The mailbox backing an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mailbox {
    /// Host-assigned mailbox number
    pub id: u64,
    /// Owning account
    pub account_id: AccountId,
}

/// Resolves account identifiers and their mailboxes
pub trait AccountDirectory: Send + Sync {
    /// Resolve an account by id or by name
    fn resolve_account(&self, identifier: &str) -> ServiceResult<Account>;

    /// Resolve the mailbox of an account
    fn resolve_mailbox(&self, account: &Account) -> ServiceResult<Mailbox>;
}

/// Authorization predicates consulted before a store is called
///
/// All methods are pure: they must not mutate anything.
pub trait Authorizer: Send + Sync {
    /// Whether `caller` may read and manage grants on `account`
    fn can_access_account(&self, caller: &Account, account: &Account) -> bool;

    /// Whether `caller` may change mail options (filter rules) of `account`
    fn can_modify_options(&self, caller: &Account, account: &Account) -> bool;

    /// Whether `caller` may grant an admin-scope right on `account`
    ///
    /// Denied unless an implementation says otherwise.
    fn can_grant_admin_right(&self, _caller: &Account, _account: &Account, _right: &Right) -> bool {
        false
    }
}

#[derive(Default)]
struct DirectoryState {
    accounts: HashMap<AccountId, Account>,
    by_name: HashMap<String, AccountId>,
    mailboxes: HashMap<AccountId, Mailbox>,
    next_mailbox_id: u64,
}

/// Account directory held in memory
#[derive(Default)]
pub struct InMemoryDirectory {
    state: RwLock<DirectoryState>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account and allocate its mailbox
    pub fn add_account(&self, account: Account) -> Mailbox {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.next_mailbox_id += 1;
        let mailbox = Mailbox {
            id: state.next_mailbox_id,
            account_id: account.id,
        };
        tracing::info!("Registering account {} ({})", account.name, account.id);
        state
            .by_name
            .insert(account.name.to_ascii_lowercase(), account.id);
        state.mailboxes.insert(account.id, mailbox);
        state.accounts.insert(account.id, account);
        mailbox
    }

    /// Register an account that has no mailbox on this server
    pub fn add_account_without_mailbox(&self, account: Account) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state
            .by_name
            .insert(account.name.to_ascii_lowercase(), account.id);
        state.accounts.insert(account.id, account);
    }

    /// Remove an account and its mailbox
    pub fn remove_account(&self, id: AccountId) -> Option<Account> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let account = state.accounts.remove(&id)?;
        state.by_name.remove(&account.name.to_ascii_lowercase());
        state.mailboxes.remove(&id);
        Some(account)
    }
}

impl AccountDirectory for InMemoryDirectory {
    fn resolve_account(&self, identifier: &str) -> ServiceResult<Account> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let id = match identifier.parse::<AccountId>() {
            Ok(id) => Some(id),
            Err(_) => state.by_name.get(&identifier.to_ascii_lowercase()).copied(),
        };
        id.and_then(|id| state.accounts.get(&id).cloned())
            .ok_or_else(|| ServiceError::account_not_found(identifier))
    }

    fn resolve_mailbox(&self, account: &Account) -> ServiceResult<Mailbox> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state
            .mailboxes
            .get(&account.id)
            .copied()
            .ok_or_else(|| ServiceError::mailbox_not_found(account.id.to_string()))
    }
}

/// Authorizer driven by a fixed set of administrator accounts
///
/// Every account may manage itself. Administrators may manage any account
/// and grant admin rights.
#[derive(Debug, Default, Clone)]
pub struct StaticAuthorizer {
    admins: HashSet<AccountId>,
}

impl StaticAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an account as an administrator
    pub fn with_admin(mut self, id: AccountId) -> Self {
        self.admins.insert(id);
        self
    }

    fn is_admin(&self, caller: &Account) -> bool {
        self.admins.contains(&caller.id)
    }
}

impl Authorizer for StaticAuthorizer {
    fn can_access_account(&self, caller: &Account, account: &Account) -> bool {
        caller.id == account.id || self.is_admin(caller)
    }

    fn can_modify_options(&self, caller: &Account, account: &Account) -> bool {
        caller.id == account.id || self.is_admin(caller)
    }

    fn can_grant_admin_right(&self, caller: &Account, _account: &Account, _right: &Right) -> bool {
        self.is_admin(caller)
    }
}
