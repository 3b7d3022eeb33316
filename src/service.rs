//! Policy service
//!
//! Wires the account collaborators to the permission and filter stores.
//! Handlers reach everything through a shared `PolicyService`.

use std::sync::Arc;

use crate::account::{Account, AccountDirectory, AccountId, Authorizer, Mailbox};
use crate::config::PolicyConfig;
use crate::core::{ServiceError, ServiceResult};
use crate::filters::FilterRuleStore;
use crate::permissions::{PermissionStore, RightRegistry};
use crate::storage::AccountStorage;

/// What a caller wants to do with a target account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    /// Read or manage grants
    Account,
    /// Read or change mail options
    Options,
}

pub struct PolicyService {
    directory: Arc<dyn AccountDirectory>,
    authorizer: Arc<dyn Authorizer>,
    permissions: PermissionStore,
    filters: FilterRuleStore,
}

impl PolicyService {
    /// Create a service with in-memory stores and the built-in rights
    pub fn new(directory: Arc<dyn AccountDirectory>, authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            directory,
            authorizer,
            permissions: PermissionStore::new(RightRegistry::builtin()),
            filters: FilterRuleStore::new(),
        }
    }

    /// Create a service from configuration
    ///
    /// With a data directory, both stores persist through it.
    pub fn from_config(
        config: &PolicyConfig,
        registry: RightRegistry,
        directory: Arc<dyn AccountDirectory>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        let mut permissions = PermissionStore::new(registry);
        let mut filters = FilterRuleStore::new();

        if let Some(dir) = &config.data_dir {
            tracing::info!("Persisting account policy under {}", dir.display());
            let storage = AccountStorage::with_dir(dir);
            permissions = permissions.with_storage(storage.clone());
            filters = filters.with_storage(storage);
        }

        Self {
            directory,
            authorizer,
            permissions,
            filters,
        }
    }

    pub fn directory(&self) -> &dyn AccountDirectory {
        self.directory.as_ref()
    }

    pub fn authorizer(&self) -> &dyn Authorizer {
        self.authorizer.as_ref()
    }

    pub fn permissions(&self) -> &PermissionStore {
        &self.permissions
    }

    pub fn filters(&self) -> &FilterRuleStore {
        &self.filters
    }

    /// Resolve the account a request targets and check the caller may act on it
    ///
    /// Without an explicit target the caller's own account is used.
    pub fn authorize_target(
        &self,
        caller: &Account,
        target: Option<&str>,
        level: AccessLevel,
    ) -> ServiceResult<Account> {
        let account = match target {
            Some(identifier) => self.directory.resolve_account(identifier)?,
            None => caller.clone(),
        };

        let allowed = match level {
            AccessLevel::Account => self.authorizer.can_access_account(caller, &account),
            AccessLevel::Options => self.authorizer.can_modify_options(caller, &account),
        };
        if !allowed {
            tracing::warn!(
                "Denied {} access to account {} for {}",
                match level {
                    AccessLevel::Account => "account",
                    AccessLevel::Options => "options",
                },
                account.name,
                caller.name
            );
            return Err(ServiceError::PermissionDenied(format!(
                "{} may not access {}",
                caller.name, account.name
            )));
        }

        Ok(account)
    }

    /// Resolve the mailbox of an already authorized account
    pub fn mailbox(&self, account: &Account) -> ServiceResult<Mailbox> {
        self.directory.resolve_mailbox(account)
    }

    /// Drop all policy state of a deleted account
    pub fn delete_account(&self, account: AccountId) -> ServiceResult<()> {
        self.permissions.remove_account(account)?;
        self.filters.remove_account(account)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{InMemoryDirectory, StaticAuthorizer};
    use crate::filters::{Action, ConditionTree, Direction, Rule};
    use crate::permissions::{Ace, Grantee};
    use tempfile::TempDir;

    fn setup() -> (PolicyService, Account, Account) {
        let directory = InMemoryDirectory::new();
        let alice = Account::new("alice@example.com");
        let bob = Account::new("bob@example.com");
        directory.add_account(alice.clone());
        directory.add_account(bob.clone());

        let service = PolicyService::new(Arc::new(directory), Arc::new(StaticAuthorizer::new()));
        (service, alice, bob)
    }

    #[test]
    fn test_default_target_is_caller() {
        let (service, alice, _) = setup();
        let target = service
            .authorize_target(&alice, None, AccessLevel::Account)
            .unwrap();
        assert_eq!(target, alice);
    }

    #[test]
    fn test_foreign_target_denied() {
        let (service, alice, bob) = setup();
        let err = service
            .authorize_target(&alice, Some(&bob.name), AccessLevel::Options)
            .unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied(_)));
    }

    #[test]
    fn test_unknown_target() {
        let (service, alice, _) = setup();
        let err = service
            .authorize_target(&alice, Some("ghost@example.com"), AccessLevel::Account)
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }

    #[test]
    fn test_delete_account_clears_both_stores() {
        let (service, alice, _) = setup();
        service
            .permissions()
            .grant(alice.id, vec![Ace::grant(Grantee::user("u1"), "sendAs")])
            .unwrap();
        service
            .filters()
            .replace(
                alice.id,
                Direction::Incoming,
                vec![Rule::new("All", ConditionTree::always()).with_action(Action::new("keep"))],
            )
            .unwrap();

        service.delete_account(alice.id).unwrap();

        let none: &[&str] = &[];
        assert!(service.permissions().query(alice.id, none).unwrap().is_empty());
        assert!(service
            .filters()
            .read(alice.id, Direction::Incoming)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_from_config_persists() {
        let temp = TempDir::new().unwrap();
        let config = PolicyConfig::default().with_data_dir(temp.path());
        let directory: Arc<dyn AccountDirectory> = Arc::new(InMemoryDirectory::new());
        let authorizer: Arc<dyn Authorizer> = Arc::new(StaticAuthorizer::new());
        let account = AccountId::new();

        let service = PolicyService::from_config(
            &config,
            RightRegistry::builtin(),
            directory.clone(),
            authorizer.clone(),
        );
        service
            .permissions()
            .grant(account, vec![Ace::grant(Grantee::Public, "viewFreeBusy")])
            .unwrap();

        assert!(AccountStorage::with_dir(temp.path()).account_exists(account));
    }
}
