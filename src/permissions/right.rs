//! Right registry
//!
//! Rights live in two disjoint namespaces. User rights are granted on a
//! single target account; admin rights carry broader scope and need extra
//! privilege to grant.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::{ServiceError, ServiceResult};

/// Namespace a right belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RightScope {
    User,
    Admin,
}

/// A named capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Right {
    pub name: String,
    pub scope: RightScope,
    pub description: String,
}

impl Right {
    pub fn new(name: impl Into<String>, scope: RightScope, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope,
            description: description.into(),
        }
    }

    pub fn is_user_right(&self) -> bool {
        self.scope == RightScope::User
    }
}

const USER_RIGHTS: &[(&str, &str)] = &[
    ("viewFreeBusy", "view free/busy of the target account"),
    ("invite", "automatically add meeting invites to the target's calendar"),
    ("sendAs", "send as the target account"),
    ("sendOnBehalfOf", "send on behalf of the target account"),
    ("sendAsDistList", "send as the target distribution list"),
    ("sendOnBehalfOfDistList", "send on behalf of the target distribution list"),
    ("sendToDistList", "send to the target distribution list"),
    ("viewDistList", "view the target distribution list"),
    ("ownDistList", "own the target distribution list"),
    ("loginAs", "log in as the target account"),
];

const ADMIN_RIGHTS: &[(&str, &str)] = &[
    ("adminLoginAs", "log in as the target account from the admin console"),
    ("getAccount", "read all attributes of the target account"),
    ("modifyAccount", "modify attributes of the target account"),
    ("deleteAccount", "delete the target account"),
    ("setAccountPassword", "set the password of the target account"),
    ("listAccount", "list the target account"),
    ("getMailboxInfo", "read mailbox information of the target account"),
    ("domainAdminRights", "domain administrator rights on the target"),
];

/// Fixed set of known rights, one map per namespace
#[derive(Debug, Clone, Default)]
pub struct RightRegistry {
    user: HashMap<String, Right>,
    admin: HashMap<String, Right>,
}

impl RightRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry with every built-in right
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for (name, desc) in USER_RIGHTS {
            registry.register(Right::new(*name, RightScope::User, *desc));
        }
        for (name, desc) in ADMIN_RIGHTS {
            registry.register(Right::new(*name, RightScope::Admin, *desc));
        }
        registry
    }

    /// Add a right to its namespace, replacing one of the same name
    pub fn register(&mut self, right: Right) {
        let map = match right.scope {
            RightScope::User => &mut self.user,
            RightScope::Admin => &mut self.admin,
        };
        map.insert(right.name.clone(), right);
    }

    /// Look a name up in one namespace
    pub fn lookup(&self, scope: RightScope, name: &str) -> ServiceResult<&Right> {
        let map = match scope {
            RightScope::User => &self.user,
            RightScope::Admin => &self.admin,
        };
        map.get(name)
            .ok_or_else(|| ServiceError::UnknownRight(name.to_string()))
    }

    pub fn lookup_user_right(&self, name: &str) -> ServiceResult<&Right> {
        self.lookup(RightScope::User, name)
    }

    pub fn lookup_admin_right(&self, name: &str) -> ServiceResult<&Right> {
        self.lookup(RightScope::Admin, name)
    }

    /// Resolve a name in the user namespace, then the admin namespace
    pub fn resolve(&self, name: &str) -> ServiceResult<&Right> {
        self.lookup_user_right(name)
            .or_else(|_| self.lookup_admin_right(name))
    }

    /// All rights of one namespace, sorted by name
    pub fn rights(&self, scope: RightScope) -> Vec<&Right> {
        let map = match scope {
            RightScope::User => &self.user,
            RightScope::Admin => &self.admin,
        };
        let mut rights: Vec<&Right> = map.values().collect();
        rights.sort_by(|a, b| a.name.cmp(&b.name));
        rights
    }
}
