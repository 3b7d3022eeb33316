//! Access-control entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Principal an entry applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id")]
pub enum Grantee {
    #[serde(rename = "usr")]
    User(String),
    #[serde(rename = "grp")]
    Group(String),
    #[serde(rename = "dom")]
    Domain(String),
    /// External user identified by email address
    #[serde(rename = "guest")]
    Guest(String),
    /// Holder of a named access key
    #[serde(rename = "key")]
    Key(String),
    /// Every authenticated user
    #[serde(rename = "all")]
    AllAuthenticated,
    /// Everyone, including anonymous users
    #[serde(rename = "pub")]
    Public,
}

impl Grantee {
    pub fn user(id: impl Into<String>) -> Self {
        Self::User(id.into())
    }

    pub fn group(id: impl Into<String>) -> Self {
        Self::Group(id.into())
    }

    /// Short type code
    pub fn type_code(&self) -> &'static str {
        match self {
            Self::User(_) => "usr",
            Self::Group(_) => "grp",
            Self::Domain(_) => "dom",
            Self::Guest(_) => "guest",
            Self::Key(_) => "key",
            Self::AllAuthenticated => "all",
            Self::Public => "pub",
        }
    }
}

impl fmt::Display for Grantee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id)
            | Self::Group(id)
            | Self::Domain(id)
            | Self::Guest(id)
            | Self::Key(id) => write!(f, "{}:{}", self.type_code(), id),
            Self::AllAuthenticated | Self::Public => f.write_str(self.type_code()),
        }
    }
}

/// Optional data narrowing where an entry applies
///
/// The store carries constraints but never interprets them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AceConstraints {
    /// Password (guest grantees) or access key (key grantees)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// When the entry stops applying
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

/// Identity of an entry for reconciliation: `(grantee, right, deny)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AceKey {
    pub grantee: Grantee,
    pub right: String,
    pub deny: bool,
}

/// A single grant (or explicit denial) of one right to one grantee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ace {
    pub grantee: Grantee,
    pub right: String,
    #[serde(default)]
    pub deny: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<AceConstraints>,
}

impl Ace {
    /// Create a positive grant
    pub fn grant(grantee: Grantee, right: impl Into<String>) -> Self {
        Self {
            grantee,
            right: right.into(),
            deny: false,
            constraints: None,
        }
    }

    /// Create an explicit denial
    pub fn deny(grantee: Grantee, right: impl Into<String>) -> Self {
        Self {
            deny: true,
            ..Self::grant(grantee, right)
        }
    }

    pub fn with_constraints(mut self, constraints: AceConstraints) -> Self {
        self.constraints = Some(constraints);
        self
    }

    /// The reconciliation key; constraints do not take part
    pub fn key(&self) -> AceKey {
        AceKey {
            grantee: self.grantee.clone(),
            right: self.right.clone(),
            deny: self.deny,
        }
    }
}

impl fmt::Display for Ace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let modifier = if self.deny { "-" } else { "" };
        write!(f, "{} {}{}", self.grantee, modifier, self.right)
    }
}
