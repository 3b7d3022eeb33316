//! Sieve script rendering
//!
//! Each rule becomes one block preceded by a `# <name>` comment; inactive
//! rules use `disabled_if` so they survive a round trip through mail
//! servers that do not know the rule model.

use regex::Regex;

use super::rule::{Action, ActionKind, Condition, ConditionKind, ConditionTree, Rule};

const REQUIRE: &str = "require [\"fileinto\", \"copy\", \"reject\", \"tag\", \"flag\", \
    \"variables\", \"log\", \"enotify\", \"envelope\", \"body\", \"ereject\", \
    \"relational\", \"comparator-i;ascii-numeric\"];\n";

const INDENT: &str = "    ";

/// Render a rule list as a Sieve script
pub fn to_script(rules: &[Rule]) -> String {
    let mut script = String::from(REQUIRE);
    for rule in rules {
        script.push('\n');
        render_rule(&mut script, rule);
    }
    script
}

/// Rule names in script order, taken from `# <name>` comment lines
pub fn rule_names(script: &str) -> Vec<String> {
    let re = match Regex::new(r"^# (.+?)\r?$") {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!("Failed to compile rule name pattern: {}", e);
            return Vec::new();
        }
    };

    script
        .lines()
        .filter_map(|line| re.captures(line))
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// The lines of the named rule, from its comment up to the next rule
pub fn rule_script(script: &str, name: &str) -> Option<String> {
    let header = format!("# {}", name);
    let mut found = false;
    let mut lines = Vec::new();

    for line in script.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with("# ") {
            if line == header {
                found = true;
            } else if found {
                break;
            }
        }
        if found {
            lines.push(line);
        }
    }

    if lines.is_empty() {
        return None;
    }
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    Some(lines.join("\n") + "\n")
}

fn render_rule(out: &mut String, rule: &Rule) {
    out.push_str("# ");
    out.push_str(&rule.name);
    out.push('\n');

    out.push_str(if rule.active { "if " } else { "disabled_if " });
    match &rule.conditions {
        tree @ (ConditionTree::AllOf { .. } | ConditionTree::AnyOf { .. }) => {
            out.push_str(&render_tree(tree));
        }
        other => {
            out.push_str("allof (");
            out.push_str(&render_tree(other));
            out.push(')');
        }
    }
    out.push_str(" {\n");

    for action in &rule.actions {
        out.push_str(INDENT);
        out.push_str(&render_action(action));
        out.push_str(";\n");
    }
    out.push_str("}\n");
}

fn render_tree(tree: &ConditionTree) -> String {
    match tree {
        ConditionTree::AllOf { tests } => format!("allof ({})", join_tests(tests)),
        ConditionTree::AnyOf { tests } => format!("anyof ({})", join_tests(tests)),
        ConditionTree::Not { test } => format!("not {}", render_tree(test)),
        ConditionTree::Test(condition) => render_condition(condition),
    }
}

fn join_tests(tests: &[ConditionTree]) -> String {
    tests
        .iter()
        .map(render_tree)
        .collect::<Vec<_>>()
        .join(",\n  ")
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn render_condition(condition: &Condition) -> String {
    let arg = |name: &str| condition.arg(name).unwrap_or_default();
    let arg_or = |name: &str, default: &'static str| -> String {
        condition.arg(name).unwrap_or(default).to_string()
    };

    let Some(kind) = ConditionKind::from_name(&condition.kind) else {
        return condition.kind.clone();
    };

    match kind {
        ConditionKind::Header => format!(
            "header :{} {} {}",
            arg_or("comparison", "contains"),
            quote(arg("header")),
            quote(arg("value"))
        ),
        ConditionKind::MimeHeader => format!(
            "mime_header :{} {} {}",
            arg_or("comparison", "contains"),
            quote(arg("header")),
            quote(arg("value"))
        ),
        ConditionKind::Address => format!(
            "address :{} :{} {} {}",
            arg_or("part", "all"),
            arg_or("comparison", "contains"),
            quote(arg("header")),
            quote(arg("value"))
        ),
        ConditionKind::HeaderExists => format!("exists {}", quote(arg("header"))),
        ConditionKind::Size => format!(
            "size :{} {}",
            arg_or("comparison", "over"),
            arg("size").trim()
        ),
        ConditionKind::Date => format!(
            "date :{} {}",
            arg_or("comparison", "before"),
            quote(arg("date"))
        ),
        ConditionKind::Body => format!("body :contains {}", quote(arg("value"))),
        ConditionKind::AddressBook => format!("addressbook :in {}", quote(arg("header"))),
        ConditionKind::Me => format!("me :in {}", quote(arg("header"))),
        ConditionKind::Attachment => "attachment".to_string(),
        ConditionKind::Invite => "invite".to_string(),
        ConditionKind::Conversation => {
            format!("conversation :where {}", quote(&arg_or("where", "started")))
        }
        ConditionKind::List => "list".to_string(),
        ConditionKind::Bulk => "bulk".to_string(),
        ConditionKind::Importance => format!("importance {}", quote(arg("importance"))),
        ConditionKind::Flagged => format!("flagged {}", quote(arg("flag"))),
        ConditionKind::CurrentTime => format!(
            "current_time :{} {}",
            arg_or("comparison", "before"),
            quote(arg("time"))
        ),
        ConditionKind::CurrentDayOfWeek => {
            format!("current_day_of_week :is {}", quote(arg("days")))
        }
        ConditionKind::True => "true".to_string(),
    }
}

fn render_action(action: &Action) -> String {
    let arg = |name: &str| action.arg(name).unwrap_or_default();

    let Some(kind) = ActionKind::from_name(&action.kind) else {
        return action.kind.clone();
    };

    match kind {
        ActionKind::Keep => "keep".to_string(),
        ActionKind::Discard => "discard".to_string(),
        ActionKind::Stop => "stop".to_string(),
        ActionKind::FileInto => format!("fileinto {}", quote(arg("folder"))),
        ActionKind::Tag => format!("tag {}", quote(arg("tag"))),
        ActionKind::Flag => format!("flag {}", quote(arg("flag"))),
        ActionKind::Redirect => format!("redirect {}", quote(arg("address"))),
        ActionKind::Reply => format!("reply {}", quote(arg("content"))),
        ActionKind::Notify => format!(
            "notify {} {} {}",
            quote(arg("address")),
            quote(arg("subject")),
            quote(arg("content"))
        ),
        ActionKind::Reject => format!("reject {}", quote(arg("content"))),
        ActionKind::Ereject => format!("ereject {}", quote(arg("content"))),
        ActionKind::Log => format!("log {}", quote(arg("content"))),
        ActionKind::AddHeader => format!(
            "addheader {} {}",
            quote(arg("header")),
            quote(arg("value"))
        ),
        ActionKind::ReplaceHeader => format!(
            "replaceheader :newvalue {} {}",
            quote(arg("value")),
            quote(arg("header"))
        ),
        ActionKind::DeleteHeader => format!("deleteheader {}", quote(arg("header"))),
    }
}
