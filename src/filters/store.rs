//! Filter rule store
//!
//! Every `(account, direction)` slot is either unset or holds the last
//! rule list that passed validation. Lists are replaced wholesale: a
//! write validates the whole list, persists it if storage is configured,
//! and then swaps the shared list pointer. Writers holding the section of
//! a deleted account fail with `NotFound` instead of committing into it.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use super::rule::{validate_rules, ActionKind, Direction, FilterRuleSet, Rule};
use crate::account::AccountId;
use crate::core::{ServiceError, ServiceResult};
use crate::storage::AccountStorage;

/// Rule lists of one account; a missing direction has never been set
#[derive(Debug, Default)]
struct AccountRules {
    lists: HashMap<Direction, Arc<Vec<Rule>>>,
    /// Set once the account is deleted; writers holding this slot must not commit
    removed: bool,
}

type RulesSlot = Arc<RwLock<AccountRules>>;

/// Holds the incoming and outgoing rule lists of every account
pub struct FilterRuleStore {
    accounts: RwLock<HashMap<AccountId, RulesSlot>>,
    storage: Option<AccountStorage>,
}

impl FilterRuleStore {
    /// Create an in-memory store
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            storage: None,
        }
    }

    /// Persist every commit through the given storage
    pub fn with_storage(mut self, storage: AccountStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Read the rule list of one direction (empty if never set)
    pub fn read(&self, account: AccountId, direction: Direction) -> ServiceResult<FilterRuleSet> {
        let list = self.current(account, direction)?;
        let rules = list.map(|l| Vec::clone(&l)).unwrap_or_default();
        tracing::debug!(
            "Read {} {} rules of account {}",
            rules.len(),
            direction,
            account
        );
        Ok(FilterRuleSet::new(direction, rules))
    }

    /// Whether a list was ever installed for this direction
    pub fn is_set(&self, account: AccountId, direction: Direction) -> ServiceResult<bool> {
        Ok(self.current(account, direction)?.is_some())
    }

    /// Replace the rule list of one direction
    ///
    /// The whole list is validated first; on failure the stored list is
    /// left untouched and the error names the first offending rule.
    pub fn replace(
        &self,
        account: AccountId,
        direction: Direction,
        rules: Vec<Rule>,
    ) -> ServiceResult<()> {
        validate_rules(&rules)?;

        let slot = self.slot(account)?;
        self.replace_in(&slot, account, direction, rules)
    }

    fn replace_in(
        &self,
        slot: &RulesSlot,
        account: AccountId,
        direction: Direction,
        rules: Vec<Rule>,
    ) -> ServiceResult<()> {
        let mut guard = lock_live(slot, account)?;

        if let Some(storage) = &self.storage {
            storage.save_rules(account, direction, &rules)?;
        }
        let count = rules.len();
        guard.lists.insert(direction, Arc::new(rules));

        tracing::info!(
            "Installed {} {} rules for account {}",
            count,
            direction,
            account
        );
        Ok(())
    }

    /// Drop both rule lists of a deleted account
    pub fn remove_account(&self, account: AccountId) -> ServiceResult<()> {
        let slot = self.slot(account)?;
        let mut guard = slot.write().unwrap_or_else(PoisonError::into_inner);
        if guard.removed {
            return Ok(());
        }

        if let Some(storage) = &self.storage {
            for direction in Direction::ALL {
                storage.delete_rules(account, direction)?;
            }
        }
        guard.lists.clear();
        guard.removed = true;

        let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
        if accounts
            .get(&account)
            .is_some_and(|current| Arc::ptr_eq(current, &slot))
        {
            accounts.remove(&account);
        }

        tracing::info!("Removed filter rules of deleted account {}", account);
        Ok(())
    }

    /// Point `fileinto` actions at a renamed folder
    ///
    /// Targets equal to `old_path` or beneath it are rewritten. Returns the
    /// number of rules changed across both directions.
    pub fn folder_renamed(
        &self,
        account: AccountId,
        old_path: &str,
        new_path: &str,
    ) -> ServiceResult<usize> {
        let old_path = normalize_folder(old_path);
        let new_path = normalize_folder(new_path);

        let changed = self.rewrite(account, |rule| {
            let mut changed = false;
            for action in rule.actions.iter_mut() {
                if ActionKind::from_name(&action.kind) != Some(ActionKind::FileInto) {
                    continue;
                }
                let Some(folder) = action.args.get_mut("folder") else {
                    continue;
                };
                let renamed =
                    folder_suffix(folder, old_path).map(|rest| format!("{}{}", new_path, rest));
                if let Some(renamed) = renamed {
                    *folder = renamed;
                    changed = true;
                }
            }
            changed
        })?;

        if changed > 0 {
            tracing::info!(
                "Updated {} filter rules of account {} after folder rename from {} to {}",
                changed,
                account,
                old_path,
                new_path
            );
        }
        Ok(changed)
    }

    /// Deactivate rules filing into a deleted folder (or beneath it)
    pub fn folder_deleted(&self, account: AccountId, path: &str) -> ServiceResult<usize> {
        let path = normalize_folder(path);

        let changed = self.rewrite(account, |rule| {
            let targets_folder = rule.actions.iter().any(|action| {
                ActionKind::from_name(&action.kind) == Some(ActionKind::FileInto)
                    && action
                        .arg("folder")
                        .is_some_and(|folder| folder_suffix(folder, path).is_some())
            });
            deactivate_if(rule, targets_folder)
        })?;

        if changed > 0 {
            tracing::info!(
                "Disabled {} filter rules of account {} after folder {} was deleted",
                changed,
                account,
                path
            );
        }
        Ok(changed)
    }

    /// Rewrite `tag` actions after a tag rename
    pub fn tag_renamed(
        &self,
        account: AccountId,
        old_name: &str,
        new_name: &str,
    ) -> ServiceResult<usize> {
        let changed = self.rewrite(account, |rule| {
            let mut changed = false;
            for action in rule.actions.iter_mut() {
                if ActionKind::from_name(&action.kind) != Some(ActionKind::Tag) {
                    continue;
                }
                if let Some(tag) = action.args.get_mut("tag") {
                    if tag.as_str() == old_name {
                        *tag = new_name.to_string();
                        changed = true;
                    }
                }
            }
            changed
        })?;

        if changed > 0 {
            tracing::info!(
                "Updated {} filter rules of account {} after tag rename from {} to {}",
                changed,
                account,
                old_name,
                new_name
            );
        }
        Ok(changed)
    }

    /// Deactivate rules applying a deleted tag
    pub fn tag_deleted(&self, account: AccountId, tag: &str) -> ServiceResult<usize> {
        let changed = self.rewrite(account, |rule| {
            let applies_tag = rule.actions.iter().any(|action| {
                ActionKind::from_name(&action.kind) == Some(ActionKind::Tag)
                    && action.arg("tag") == Some(tag)
            });
            deactivate_if(rule, applies_tag)
        })?;

        if changed > 0 {
            tracing::info!(
                "Disabled {} filter rules of account {} after tag {} was deleted",
                changed,
                account,
                tag
            );
        }
        Ok(changed)
    }

    /// Apply `edit` to every stored rule of both directions
    ///
    /// `edit` returns whether it changed the rule. Directions with changes
    /// are persisted as one commit and swapped in together.
    fn rewrite<F>(&self, account: AccountId, mut edit: F) -> ServiceResult<usize>
    where
        F: FnMut(&mut Rule) -> bool,
    {
        let slot = self.slot(account)?;
        let mut guard = lock_live(&slot, account)?;

        let mut updated = Vec::new();
        let mut changed = 0;
        for (direction, list) in guard.lists.iter() {
            let mut rules = Vec::clone(list);
            let count = rules.iter_mut().map(|rule| edit(rule)).filter(|c| *c).count();
            if count > 0 {
                changed += count;
                updated.push((*direction, rules));
            }
        }

        if let Some(storage) = &self.storage {
            if !updated.is_empty() {
                let lists: Vec<(Direction, &[Rule])> = updated
                    .iter()
                    .map(|(direction, rules)| (*direction, rules.as_slice()))
                    .collect();
                storage.save_rule_lists(account, &lists)?;
            }
        }
        for (direction, rules) in updated {
            guard.lists.insert(direction, Arc::new(rules));
        }

        Ok(changed)
    }

    fn current(
        &self,
        account: AccountId,
        direction: Direction,
    ) -> ServiceResult<Option<Arc<Vec<Rule>>>> {
        let slot = self.slot(account)?;
        let guard = slot.read().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.lists.get(&direction).cloned())
    }

    /// Get the slot of an account, loading it from storage on first use
    fn slot(&self, account: AccountId) -> ServiceResult<RulesSlot> {
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
            .or_insert_with(|| Arc::new(RwLock::new(initial)));
        Ok(Arc::clone(slot))
    }

    fn load(&self, account: AccountId) -> ServiceResult<AccountRules> {
        let mut rules = AccountRules::default();
        let Some(storage) = &self.storage else {
            return Ok(rules);
        };

        for direction in Direction::ALL {
            if let Some(list) = storage.load_rules(account, direction)? {
                rules.lists.insert(direction, Arc::new(list));
            }
        }
        Ok(rules)
    }
}

impl Default for FilterRuleStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Lock a slot for writing, refusing slots of deleted accounts
fn lock_live(
    slot: &RulesSlot,
    account: AccountId,
) -> ServiceResult<RwLockWriteGuard<'_, AccountRules>> {
    let guard = slot.write().unwrap_or_else(PoisonError::into_inner);
    if guard.removed {
        tracing::warn!("Rejected filter rule write to deleted account {}", account);
        return Err(ServiceError::account_not_found(account.to_string()));
    }
    Ok(guard)
}

fn normalize_folder(path: &str) -> &str {
    path.trim_start_matches('/').trim_end_matches('/')
}

/// The part of `folder` after `base` if `folder` is `base` or beneath it
fn folder_suffix<'a>(folder: &'a str, base: &str) -> Option<&'a str> {
    let rest = normalize_folder(folder).strip_prefix(base)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

fn deactivate_if(rule: &mut Rule, condition: bool) -> bool {
    if condition && rule.active {
        rule.active = false;
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ServiceError;
    use crate::filters::{Action, Condition, ConditionTree};
    use tempfile::TempDir;

    fn rule(name: &str) -> Rule {
        Rule::new(name, Condition::header_contains("subject", name).into())
            .with_action(Action::file_into(format!("Inbox/{}", name)))
    }

    #[test]
    fn test_unset_reads_empty() {
        let store = FilterRuleStore::new();
        let account = AccountId::new();

        let set = store.read(account, Direction::Incoming).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.direction, Direction::Incoming);
        assert!(!store.is_set(account, Direction::Incoming).unwrap());
    }

    #[test]
    fn test_replace_then_read_keeps_order() {
        let store = FilterRuleStore::new();
        let account = AccountId::new();

        store
            .replace(account, Direction::Incoming, vec![rule("A"), rule("B")])
            .unwrap();
        assert_eq!(
            store.read(account, Direction::Incoming).unwrap().names(),
            vec!["A", "B"]
        );

        store
            .replace(account, Direction::Incoming, vec![rule("B"), rule("A")])
            .unwrap();
        assert_eq!(
            store.read(account, Direction::Incoming).unwrap().rules,
            vec![rule("B"), rule("A")]
        );
    }

    #[test]
    fn test_directions_are_independent() {
        let store = FilterRuleStore::new();
        let account = AccountId::new();

        store
            .replace(account, Direction::Outgoing, vec![rule("Sent")])
            .unwrap();
        assert!(store.read(account, Direction::Incoming).unwrap().is_empty());
        assert_eq!(store.read(account, Direction::Outgoing).unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_replace_keeps_prior_list() {
        let store = FilterRuleStore::new();
        let account = AccountId::new();
        let prior = vec![rule("Keep me")];
        store
            .replace(account, Direction::Incoming, prior.clone())
            .unwrap();

        let mut rules: Vec<Rule> = (0..10).map(|i| rule(&format!("R{}", i))).collect();
        rules.insert(
            4,
            Rule::new("Bad", ConditionTree::always()).with_action(Action::new("launch")),
        );

        match store.replace(account, Direction::Incoming, rules) {
            Err(ServiceError::InvalidRule { rule, .. }) => assert_eq!(rule, "Bad"),
            other => panic!("Expected InvalidRule, got {:?}", other),
        }
        assert_eq!(store.read(account, Direction::Incoming).unwrap().rules, prior);
    }

    #[test]
    fn test_clear_with_empty_list() {
        let store = FilterRuleStore::new();
        let account = AccountId::new();

        store
            .replace(account, Direction::Incoming, vec![rule("A")])
            .unwrap();
        store.replace(account, Direction::Incoming, Vec::new()).unwrap();

        assert!(store.read(account, Direction::Incoming).unwrap().is_empty());
        assert!(store.is_set(account, Direction::Incoming).unwrap());
    }

    #[test]
    fn test_folder_renamed() {
        let store = FilterRuleStore::new();
        let account = AccountId::new();

        store
            .replace(
                account,
                Direction::Incoming,
                vec![
                    rule("work"),
                    Rule::new("deep", ConditionTree::always())
                        .with_action(Action::file_into("/Inbox/work/reports")),
                    Rule::new("other", ConditionTree::always())
                        .with_action(Action::file_into("Inbox/workshop")),
                ],
            )
            .unwrap();
        store
            .replace(account, Direction::Outgoing, vec![rule("work")])
            .unwrap();

        let changed = store
            .folder_renamed(account, "/Inbox/work", "Archive/work")
            .unwrap();
        assert_eq!(changed, 3);

        let incoming = store.read(account, Direction::Incoming).unwrap();
        assert_eq!(incoming.rules[0].actions[0].arg("folder"), Some("Archive/work"));
        assert_eq!(
            incoming.rules[1].actions[0].arg("folder"),
            Some("Archive/work/reports")
        );
        assert_eq!(incoming.rules[2].actions[0].arg("folder"), Some("Inbox/workshop"));

        let outgoing = store.read(account, Direction::Outgoing).unwrap();
        assert_eq!(outgoing.rules[0].actions[0].arg("folder"), Some("Archive/work"));
    }

    #[test]
    fn test_folder_deleted_disables_rules() {
        let store = FilterRuleStore::new();
        let account = AccountId::new();

        store
            .replace(account, Direction::Incoming, vec![rule("A"), rule("B")])
            .unwrap();

        assert_eq!(store.folder_deleted(account, "Inbox/A").unwrap(), 1);
        let rules = store.read(account, Direction::Incoming).unwrap().rules;
        assert!(!rules[0].active);
        assert!(rules[1].active);

        assert_eq!(store.folder_deleted(account, "Inbox/A").unwrap(), 0);
    }

    #[test]
    fn test_tag_renamed_and_deleted() {
        let store = FilterRuleStore::new();
        let account = AccountId::new();

        store
            .replace(
                account,
                Direction::Incoming,
                vec![Rule::new("Tagger", ConditionTree::always()).with_action(Action::tag("old"))],
            )
            .unwrap();

        assert_eq!(store.tag_renamed(account, "old", "new").unwrap(), 1);
        let rules = store.read(account, Direction::Incoming).unwrap().rules;
        assert_eq!(rules[0].actions[0].arg("tag"), Some("new"));

        assert_eq!(store.tag_deleted(account, "old").unwrap(), 0);
        assert_eq!(store.tag_deleted(account, "new").unwrap(), 1);
        assert!(!store.read(account, Direction::Incoming).unwrap().rules[0].active);
    }

    #[test]
    fn test_persisted_rules_survive_restart() {
        let temp = TempDir::new().unwrap();
        let account = AccountId::new();

        {
            let store = FilterRuleStore::new().with_storage(AccountStorage::with_dir(temp.path()));
            store
                .replace(account, Direction::Outgoing, vec![rule("A"), rule("B")])
                .unwrap();
            store.tag_renamed(account, "x", "y").unwrap();
        }

        let store = FilterRuleStore::new().with_storage(AccountStorage::with_dir(temp.path()));
        assert_eq!(
            store.read(account, Direction::Outgoing).unwrap().names(),
            vec!["A", "B"]
        );
        assert!(!store.is_set(account, Direction::Incoming).unwrap());

        store.remove_account(account).unwrap();
        let store = FilterRuleStore::new().with_storage(AccountStorage::with_dir(temp.path()));
        assert!(!store.is_set(account, Direction::Outgoing).unwrap());
    }

    #[test]
    fn test_failed_maintenance_write_leaves_disk_unchanged() {
        let temp = TempDir::new().unwrap();
        let storage = AccountStorage::with_dir(temp.path());
        let account = AccountId::new();
        let tagger = vec![Rule::new("Tagger", ConditionTree::always()).with_action(Action::tag("old"))];

        let store = FilterRuleStore::new().with_storage(storage.clone());
        for direction in Direction::ALL {
            store.replace(account, direction, tagger.clone()).unwrap();
        }

        let blocked = storage
            .rules_path(account, Direction::Outgoing)
            .with_extension("json.tmp");
        std::fs::create_dir(&blocked).unwrap();
        assert!(store.tag_renamed(account, "old", "new").is_err());

        let reloaded = FilterRuleStore::new().with_storage(storage.clone());
        for direction in Direction::ALL {
            assert_eq!(store.read(account, direction).unwrap().rules, tagger);
            assert_eq!(reloaded.read(account, direction).unwrap().rules, tagger);
        }

        std::fs::remove_dir(&blocked).unwrap();
        assert_eq!(store.tag_renamed(account, "old", "new").unwrap(), 2);
        let reloaded = FilterRuleStore::new().with_storage(storage);
        for direction in Direction::ALL {
            let rules = reloaded.read(account, direction).unwrap().rules;
            assert_eq!(rules[0].actions[0].arg("tag"), Some("new"));
        }
    }

    #[test]
    fn test_writer_holding_deleted_slot_cannot_commit() {
        let temp = TempDir::new().unwrap();
        let storage = AccountStorage::with_dir(temp.path());
        let account = AccountId::new();
        let store = FilterRuleStore::new().with_storage(storage.clone());

        store
            .replace(account, Direction::Incoming, vec![rule("A")])
            .unwrap();

        // A writer that looked the slot up before the account was deleted
        let stale = store.slot(account).unwrap();
        store.remove_account(account).unwrap();

        let result = store.replace_in(&stale, account, Direction::Incoming, vec![rule("B")]);
        assert!(matches!(result, Err(ServiceError::NotFound { .. })));
        assert_eq!(storage.load_rules(account, Direction::Incoming).unwrap(), None);

        let reloaded = FilterRuleStore::new().with_storage(storage);
        assert!(!reloaded.is_set(account, Direction::Incoming).unwrap());

        // A later write after deletion starts from a fresh slot
        store
            .replace(account, Direction::Incoming, vec![rule("C")])
            .unwrap();
        assert_eq!(store.read(account, Direction::Incoming).unwrap().names(), vec!["C"]);
    }
}
