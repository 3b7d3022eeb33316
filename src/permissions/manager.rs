//! Permission store implementation
//!
//! Holds the access-control entries of every account, keyed by
//! `(grantee, right, deny)`. Each account has its own exclusive section;
//! a write builds the new entry map aside, persists it if storage is
//! configured, and only then swaps it in, so readers see either the old
//! or the new map and never a half-applied batch. Deleting an account
//! retires its section, and writers still holding it fail with `NotFound`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use super::ace::{Ace, AceKey};
use super::right::{Right, RightRegistry};
use crate::account::AccountId;
use crate::core::{ServiceError, ServiceResult};
use crate::storage::AccountStorage;

type AclMap = BTreeMap<AceKey, Ace>;

#[derive(Debug)]
struct AclState {
    entries: Arc<AclMap>,
    /// Set once the account is deleted; writers holding this slot must not commit
    removed: bool,
}

/// One account's entries behind its exclusive section
type AclSlot = Arc<RwLock<AclState>>;

/// Stores and reconciles access-control entries per account
pub struct PermissionStore {
    registry: RightRegistry,
    accounts: RwLock<HashMap<AccountId, AclSlot>>,
    storage: Option<AccountStorage>,
}

impl PermissionStore {
    /// Create an in-memory store over the given right registry
    pub fn new(registry: RightRegistry) -> Self {
        Self {
            registry,
            accounts: RwLock::new(HashMap::new()),
            storage: None,
        }
    }

    /// Persist every commit through the given storage
    pub fn with_storage(mut self, storage: AccountStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn registry(&self) -> &RightRegistry {
        &self.registry
    }

    /// Entries of an account, optionally restricted to some rights
    ///
    /// An empty filter returns every entry. Every name in the filter must
    /// resolve in the registry.
    pub fn query<S: AsRef<str>>(&self, account: AccountId, rights: &[S]) -> ServiceResult<Vec<Ace>> {
        let wanted = rights
            .iter()
            .map(|name| self.registry.resolve(name.as_ref()).map(|r| r.name.as_str()))
            .collect::<ServiceResult<HashSet<&str>>>()?;

        let snapshot = self.snapshot(account)?;
        let entries: Vec<Ace> = snapshot
            .values()
            .filter(|ace| wanted.is_empty() || wanted.contains(ace.right.as_str()))
            .cloned()
            .collect();

        tracing::debug!(
            "Query on account {} returned {} of {} entries",
            account,
            entries.len(),
            snapshot.len()
        );
        Ok(entries)
    }

    /// Resolve the right of every entry, failing on the first unknown one
    pub fn resolve_rights<'a>(&'a self, entries: &[Ace]) -> ServiceResult<Vec<&'a Right>> {
        entries
            .iter()
            .map(|ace| self.registry.resolve(&ace.right))
            .collect()
    }

    /// Grant entries on an account
    ///
    /// An entry with the same `(grantee, right, deny)` as a stored one
    /// replaces its constraints. Returns the stored entries for the
    /// submitted keys, in submission order.
    pub fn grant(&self, account: AccountId, entries: Vec<Ace>) -> ServiceResult<Vec<Ace>> {
        self.resolve_rights(&entries)?;

        let slot = self.slot(account)?;
        self.grant_in(&slot, account, entries)
    }

    fn grant_in(
        &self,
        slot: &AclSlot,
        account: AccountId,
        entries: Vec<Ace>,
    ) -> ServiceResult<Vec<Ace>> {
        let mut guard = lock_live(slot, account)?;

        let mut next = AclMap::clone(&guard.entries);
        let mut keys = Vec::with_capacity(entries.len());
        for ace in entries {
            let key = ace.key();
            if !keys.contains(&key) {
                keys.push(key.clone());
            }
            next.insert(key, ace);
        }

        self.persist(account, &next)?;
        let stored: Vec<Ace> = keys.iter().filter_map(|k| next.get(k).cloned()).collect();
        guard.entries = Arc::new(next);

        tracing::info!("Granted {} entries on account {}", stored.len(), account);
        Ok(stored)
    }

    /// Revoke entries from an account
    ///
    /// Entries are matched on `(grantee, right, deny)` only. Entries that
    /// are not stored are ignored. Returns the entries actually removed,
    /// as they were stored.
    pub fn revoke(&self, account: AccountId, entries: &[Ace]) -> ServiceResult<Vec<Ace>> {
        self.resolve_rights(entries)?;

        let slot = self.slot(account)?;
        let mut guard = lock_live(&slot, account)?;

        let matched: Vec<AceKey> = entries
            .iter()
            .map(Ace::key)
            .filter(|key| guard.entries.contains_key(key))
            .collect();
        if matched.is_empty() {
            tracing::debug!("Revoke on account {} matched nothing", account);
            return Ok(Vec::new());
        }

        let mut next = AclMap::clone(&guard.entries);
        let removed: Vec<Ace> = matched.iter().filter_map(|key| next.remove(key)).collect();

        self.persist(account, &next)?;
        guard.entries = Arc::new(next);

        tracing::info!("Revoked {} entries on account {}", removed.len(), account);
        Ok(removed)
    }

    /// Drop every entry of a deleted account
    ///
    /// Returns the number of entries dropped.
    pub fn remove_account(&self, account: AccountId) -> ServiceResult<usize> {
        let slot = self.slot(account)?;
        let mut guard = slot.write().unwrap_or_else(PoisonError::into_inner);
        if guard.removed {
            return Ok(0);
        }
        let count = guard.entries.len();

        if let Some(storage) = &self.storage {
            storage.delete_acl(account)?;
        }
        guard.entries = Arc::new(AclMap::new());
        guard.removed = true;

        let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
        if accounts
            .get(&account)
            .is_some_and(|current| Arc::ptr_eq(current, &slot))
        {
            accounts.remove(&account);
        }

        tracing::info!("Removed {} entries of deleted account {}", count, account);
        Ok(count)
    }

    fn snapshot(&self, account: AccountId) -> ServiceResult<Arc<AclMap>> {
        let slot = self.slot(account)?;
        let guard = slot.read().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(&guard.entries))
    }

    /// Get the slot of an account, loading it from storage on first use
    fn slot(&self, account: AccountId) -> ServiceResult<AclSlot> {
        if let Some(slot) = self
            .accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&account)
        {
            return Ok(Arc::clone(slot));
        }

        let initial = self.load(account)?;
        let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
        let slot = accounts
            .entry(account)
            .or_insert_with(|| {
                Arc::new(RwLock::new(AclState {
                    entries: Arc::new(initial),
                    removed: false,
                }))
            });
        Ok(Arc::clone(slot))
    }

    fn load(&self, account: AccountId) -> ServiceResult<AclMap> {
        let Some(storage) = &self.storage else {
            return Ok(AclMap::new());
        };

        let entries = storage.load_acl(account)?;
        if !entries.is_empty() {
            tracing::debug!("Loaded {} entries for account {}", entries.len(), account);
        }
        Ok(entries.into_iter().map(|ace| (ace.key(), ace)).collect())
    }

    fn persist(&self, account: AccountId, entries: &AclMap) -> ServiceResult<()> {
        if let Some(storage) = &self.storage {
            let snapshot: Vec<Ace> = entries.values().cloned().collect();
            storage.save_acl(account, &snapshot)?;
        }
        Ok(())
    }
}

/// Lock a slot for writing, refusing slots of deleted accounts
fn lock_live(
    slot: &AclSlot,
    account: AccountId,
) -> ServiceResult<RwLockWriteGuard<'_, AclState>> {
    let guard = slot.write().unwrap_or_else(PoisonError::into_inner);
    if guard.removed {
        tracing::warn!("Rejected grant change on deleted account {}", account);
        return Err(ServiceError::account_not_found(account.to_string()));
    }
    Ok(guard)
}

impl Default for PermissionStore {
    fn default() -> Self {
        Self::new(RightRegistry::builtin())
    }
}
