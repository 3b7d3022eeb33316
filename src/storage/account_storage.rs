//! Account storage helpers
//!
//! Handles reading and writing grant and filter snapshots to disk.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::account::AccountId;
use crate::core::ServiceResult;
use crate::filters::{Direction, Rule};
use crate::permissions::Ace;

/// Default directory for account storage
const ACCOUNTS_DIR: &str = "accounts";

/// Account storage manager
#[derive(Debug, Clone)]
pub struct AccountStorage {
    base_dir: PathBuf,
}

impl AccountStorage {
    /// Create a new account storage with the default directory
    pub fn new() -> Self {
        Self {
            base_dir: PathBuf::from(ACCOUNTS_DIR),
        }
    }

    /// Create a new account storage with a custom directory
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: dir.into(),
        }
    }

    /// Get the directory path for an account
    pub fn account_dir(&self, account: AccountId) -> PathBuf {
        self.base_dir.join(account.to_string())
    }

    /// Get the grant snapshot path for an account
    pub fn acl_path(&self, account: AccountId) -> PathBuf {
        self.account_dir(account).join("acl.json")
    }

    /// Get the filter rule snapshot path for an account and direction
    pub fn rules_path(&self, account: AccountId, direction: Direction) -> PathBuf {
        self.account_dir(account)
            .join(format!("filters-{}.json", direction.as_str()))
    }

    /// Create the account directory if it doesn't exist
    pub fn ensure_account_dir(&self, account: AccountId) -> ServiceResult<PathBuf> {
        let dir = self.account_dir(account);
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(dir)
    }

    /// Save the grant snapshot of an account
    pub fn save_acl(&self, account: AccountId, entries: &[Ace]) -> ServiceResult<()> {
        self.ensure_account_dir(account)?;
        write_json(&self.acl_path(account), entries)
    }

    /// Load the grant snapshot of an account (empty if never saved)
    pub fn load_acl(&self, account: AccountId) -> ServiceResult<Vec<Ace>> {
        Ok(read_json(&self.acl_path(account))?.unwrap_or_default())
    }

    /// Delete the grant snapshot of an account
    pub fn delete_acl(&self, account: AccountId) -> ServiceResult<()> {
        remove_if_exists(&self.acl_path(account))
    }

    /// Save the rule list for one direction
    pub fn save_rules(
        &self,
        account: AccountId,
        direction: Direction,
        rules: &[Rule],
    ) -> ServiceResult<()> {
        self.ensure_account_dir(account)?;
        write_json(&self.rules_path(account, direction), rules)
    }

    /// Save several rule lists as one commit
    ///
    /// Every list is written to its temp file before any is renamed into
    /// place, so a failed write leaves all stored lists untouched.
    pub fn save_rule_lists(
        &self,
        account: AccountId,
        lists: &[(Direction, &[Rule])],
    ) -> ServiceResult<()> {
        self.ensure_account_dir(account)?;

        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(lists.len());
        for (direction, rules) in lists {
            let path = self.rules_path(account, *direction);
            match stage_json(&path, rules) {
                Ok(tmp) => staged.push((tmp, path)),
                Err(e) => {
                    for (tmp, _) in &staged {
                        if let Err(cleanup) = fs::remove_file(tmp) {
                            tracing::warn!("Failed to remove {}: {}", tmp.display(), cleanup);
                        }
                    }
                    return Err(e);
                }
            }
        }

        for (tmp, path) in staged {
            fs::rename(&tmp, &path)?;
        }
        Ok(())
    }

    /// Load the rule list for one direction
    ///
    /// Returns `None` if no list was ever saved.
    pub fn load_rules(
        &self,
        account: AccountId,
        direction: Direction,
    ) -> ServiceResult<Option<Vec<Rule>>> {
        read_json(&self.rules_path(account, direction))
    }

    /// Delete the rule list for one direction
    pub fn delete_rules(&self, account: AccountId, direction: Direction) -> ServiceResult<()> {
        remove_if_exists(&self.rules_path(account, direction))
    }

    /// Check if anything is stored for an account
    pub fn account_exists(&self, account: AccountId) -> bool {
        self.account_dir(account).exists()
    }

    /// List all account IDs with stored state
    pub fn list_accounts(&self) -> ServiceResult<Vec<AccountId>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut accounts = Vec::new();

        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.is_dir() {
                if let Some(id) = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .and_then(|name| name.parse::<AccountId>().ok())
                {
                    accounts.push(id);
                }
            }
        }

        Ok(accounts)
    }

    /// Delete everything stored for an account
    pub fn delete_account(&self, account: AccountId) -> ServiceResult<()> {
        let dir = self.account_dir(account);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Get the base directory
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

impl Default for AccountStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// Write to a sibling temp file, then rename over the target
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> ServiceResult<()> {
    let tmp = stage_json(path, value)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Write the sibling temp file of `path` and return its path
fn stage_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> ServiceResult<PathBuf> {
    let tmp = path.with_extension("json.tmp");

    let file = File::create(&tmp)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(tmp)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> ServiceResult<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let file = File::open(path)?;
    let reader = BufReader::new(file);
    Ok(Some(serde_json::from_reader(reader)?))
}

fn remove_if_exists(path: &Path) -> ServiceResult<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}
