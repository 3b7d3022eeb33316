//! Filter rule model and structural validation
//!
//! Condition and action kinds travel as plain strings so that a rule set
//! with an unknown kind can still be parsed and then rejected with the name
//! of the offending rule.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::core::{ServiceError, ServiceResult};

/// Which mail flow a rule set applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Incoming, Direction::Outgoing];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Known condition kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionKind {
    Header,
    MimeHeader,
    Address,
    HeaderExists,
    Size,
    Date,
    Body,
    AddressBook,
    Me,
    Attachment,
    Invite,
    Conversation,
    List,
    Bulk,
    Importance,
    Flagged,
    CurrentTime,
    CurrentDayOfWeek,
    True,
}

impl ConditionKind {
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "header" => Self::Header,
            "mime_header" => Self::MimeHeader,
            "address" => Self::Address,
            "header_exists" => Self::HeaderExists,
            "size" => Self::Size,
            "date" => Self::Date,
            "body" => Self::Body,
            "address_book" => Self::AddressBook,
            "me" => Self::Me,
            "attachment" => Self::Attachment,
            "invite" => Self::Invite,
            "conversation" => Self::Conversation,
            "list" => Self::List,
            "bulk" => Self::Bulk,
            "importance" => Self::Importance,
            "flagged" => Self::Flagged,
            "current_time" => Self::CurrentTime,
            "current_day_of_week" => Self::CurrentDayOfWeek,
            "true" => Self::True,
            _ => return None,
        };
        Some(kind)
    }

    /// Arguments that must be present and non-empty
    pub fn required_args(&self) -> &'static [&'static str] {
        match self {
            Self::Header | Self::MimeHeader | Self::Address => &["header", "value"],
            Self::HeaderExists | Self::AddressBook | Self::Me => &["header"],
            Self::Size => &["size"],
            Self::Date => &["date"],
            Self::Body => &["value"],
            Self::Importance => &["importance"],
            Self::Flagged => &["flag"],
            Self::CurrentTime => &["time"],
            Self::CurrentDayOfWeek => &["days"],
            Self::Attachment
            | Self::Invite
            | Self::Conversation
            | Self::List
            | Self::Bulk
            | Self::True => &[],
        }
    }
}

const MATCH_COMPARISONS: &[&str] = &["is", "contains", "matches"];
const SIZE_COMPARISONS: &[&str] = &["over", "under"];
const DATE_COMPARISONS: &[&str] = &["before", "after"];
const ADDRESS_PARTS: &[&str] = &["all", "localpart", "domain"];
const CONVERSATION_WHERE: &[&str] = &["started", "participated"];

impl ConditionKind {
    /// Optional arguments restricted to a fixed keyword set
    pub fn keyword_args(&self) -> &'static [(&'static str, &'static [&'static str])] {
        match self {
            Self::Header | Self::MimeHeader => &[("comparison", MATCH_COMPARISONS)],
            Self::Address => &[
                ("comparison", MATCH_COMPARISONS),
                ("part", ADDRESS_PARTS),
            ],
            Self::Size => &[("comparison", SIZE_COMPARISONS)],
            Self::Date | Self::CurrentTime => &[("comparison", DATE_COMPARISONS)],
            Self::Conversation => &[("where", CONVERSATION_WHERE)],
            _ => &[],
        }
    }
}

/// Known action kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Keep,
    Discard,
    FileInto,
    Tag,
    Flag,
    Redirect,
    Reply,
    Notify,
    Reject,
    Ereject,
    Log,
    Stop,
    AddHeader,
    ReplaceHeader,
    DeleteHeader,
}

impl ActionKind {
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "keep" => Self::Keep,
            "discard" => Self::Discard,
            "fileinto" => Self::FileInto,
            "tag" => Self::Tag,
            "flag" => Self::Flag,
            "redirect" => Self::Redirect,
            "reply" => Self::Reply,
            "notify" => Self::Notify,
            "reject" => Self::Reject,
            "ereject" => Self::Ereject,
            "log" => Self::Log,
            "stop" => Self::Stop,
            "addheader" => Self::AddHeader,
            "replaceheader" => Self::ReplaceHeader,
            "deleteheader" => Self::DeleteHeader,
            _ => return None,
        };
        Some(kind)
    }

    pub fn required_args(&self) -> &'static [&'static str] {
        match self {
            Self::FileInto => &["folder"],
            Self::Tag => &["tag"],
            Self::Flag => &["flag"],
            Self::Redirect | Self::Notify => &["address"],
            Self::Reply | Self::Reject | Self::Ereject | Self::Log => &["content"],
            Self::AddHeader | Self::ReplaceHeader | Self::DeleteHeader => &["header"],
            Self::Keep | Self::Discard | Self::Stop => &[],
        }
    }

    /// Header editing is reserved for administrator scripts
    pub fn is_header_edit(&self) -> bool {
        matches!(
            self,
            Self::AddHeader | Self::ReplaceHeader | Self::DeleteHeader
        )
    }
}

/// A single test against a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub kind: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub args: BTreeMap<String, String>,
}

impl Condition {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            args: BTreeMap::new(),
        }
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args.get(name).map(|s| s.as_str())
    }

    /// `header :contains <header> <value>`
    pub fn header_contains(header: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new("header")
            .with_arg("header", header)
            .with_arg("value", value)
    }
}

/// Boolean combination of conditions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ConditionTree {
    AllOf { tests: Vec<ConditionTree> },
    AnyOf { tests: Vec<ConditionTree> },
    Not { test: Box<ConditionTree> },
    Test(Condition),
}

impl ConditionTree {
    /// A tree that matches every message
    pub fn always() -> Self {
        Self::Test(Condition::new("true"))
    }

    pub fn all_of(tests: Vec<ConditionTree>) -> Self {
        Self::AllOf { tests }
    }

    pub fn any_of(tests: Vec<ConditionTree>) -> Self {
        Self::AnyOf { tests }
    }

    pub fn negate(test: ConditionTree) -> Self {
        Self::Not {
            test: Box::new(test),
        }
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            Self::AllOf { tests } | Self::AnyOf { tests } => {
                if tests.is_empty() {
                    let op = if matches!(self, Self::AllOf { .. }) {
                        "all_of"
                    } else {
                        "any_of"
                    };
                    return Err(format!("empty {} group", op));
                }
                tests.iter().try_for_each(|t| t.validate())
            }
            Self::Not { test } => test.validate(),
            Self::Test(condition) => validate_condition(condition),
        }
    }
}

impl Default for ConditionTree {
    fn default() -> Self {
        Self::always()
    }
}

impl From<Condition> for ConditionTree {
    fn from(condition: Condition) -> Self {
        Self::Test(condition)
    }
}

/// Something a rule does to a matching message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub kind: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub args: BTreeMap<String, String>,
}

impl Action {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            args: BTreeMap::new(),
        }
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args.get(name).map(|s| s.as_str())
    }

    pub fn file_into(folder: impl Into<String>) -> Self {
        Self::new("fileinto").with_arg("folder", folder)
    }

    pub fn tag(tag: impl Into<String>) -> Self {
        Self::new("tag").with_arg("tag", tag)
    }

    pub fn discard() -> Self {
        Self::new("discard")
    }

    pub fn stop() -> Self {
        Self::new("stop")
    }
}

fn default_active() -> bool {
    true
}

/// A named condition/action pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub conditions: ConditionTree,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Rule {
    /// An active rule with no actions yet
    pub fn new(name: impl Into<String>, conditions: ConditionTree) -> Self {
        Self {
            name: name.into(),
            active: true,
            conditions,
            actions: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Check the rule is well formed
    ///
    /// Reports the first problem found as `InvalidRule`.
    pub fn validate(&self) -> ServiceResult<()> {
        self.check()
            .map_err(|reason| ServiceError::invalid_rule(self.name.clone(), reason))
    }

    fn check(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("rule name is empty".to_string());
        }
        if self.name.chars().any(char::is_control) {
            return Err("rule name contains control characters".to_string());
        }
        self.conditions.validate()?;
        if self.actions.is_empty() {
            return Err("missing action".to_string());
        }
        self.actions.iter().try_for_each(validate_action)
    }
}

/// Validate every rule, stopping at the first invalid one
pub fn validate_rules(rules: &[Rule]) -> ServiceResult<()> {
    for rule in rules {
        if let Err(err) = rule.validate() {
            tracing::warn!("Rejecting filter rules: {}", err);
            return Err(err);
        }
    }
    Ok(())
}

fn missing_args<'a>(
    args: &BTreeMap<String, String>,
    required: &'a [&'a str],
) -> Option<&'a str> {
    required.iter().copied().find(|name| {
        args.get(*name)
            .map(|value| value.trim().is_empty())
            .unwrap_or(true)
    })
}

fn validate_condition(condition: &Condition) -> Result<(), String> {
    let kind = ConditionKind::from_name(&condition.kind)
        .ok_or_else(|| format!("unknown condition kind '{}'", condition.kind))?;

    if let Some(name) = missing_args(&condition.args, kind.required_args()) {
        return Err(format!(
            "condition '{}' is missing '{}'",
            condition.kind, name
        ));
    }

    for (name, allowed) in kind.keyword_args() {
        if let Some(value) = condition.arg(name) {
            if !allowed.contains(&value) {
                return Err(format!(
                    "condition '{}' has invalid {} '{}'",
                    condition.kind, name, value
                ));
            }
        }
    }

    if kind == ConditionKind::Size {
        let size = condition.arg("size").unwrap_or_default();
        if parse_size(size).is_none() {
            return Err(format!("invalid size: {}", size));
        }
    }

    Ok(())
}

fn validate_action(action: &Action) -> Result<(), String> {
    let kind = ActionKind::from_name(&action.kind)
        .ok_or_else(|| format!("unknown action kind '{}'", action.kind))?;

    if kind.is_header_edit() {
        return Err(format!(
            "action '{}' is not allowed in user filter rules",
            action.kind
        ));
    }

    if let Some(name) = missing_args(&action.args, kind.required_args()) {
        return Err(format!("action '{}' is missing '{}'", action.kind, name));
    }

    Ok(())
}

/// Parse a size such as `100`, `10K`, `5M` or `1G` into bytes
pub fn parse_size(value: &str) -> Option<u64> {
    let value = value.trim();
    let (digits, multiplier) = match value.chars().last()?.to_ascii_uppercase() {
        'K' => (&value[..value.len() - 1], 1024),
        'M' => (&value[..value.len() - 1], 1024 * 1024),
        'G' => (&value[..value.len() - 1], 1024 * 1024 * 1024),
        _ => (value, 1),
    };
    digits.parse::<u64>().ok()?.checked_mul(multiplier)
}

/// An ordered rule list for one direction of one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRuleSet {
    pub direction: Direction,
    pub rules: Vec<Rule>,
}

impl FilterRuleSet {
    pub fn new(direction: Direction, rules: Vec<Rule>) -> Self {
        Self { direction, rules }
    }

    pub fn empty(direction: Direction) -> Self {
        Self::new(direction, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }

    /// Render the rules as a Sieve script
    pub fn to_sieve(&self) -> String {
        super::sieve::to_script(&self.rules)
    }
}
