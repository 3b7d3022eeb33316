//! Mail filter rules
//!
//! Each account owns two ordered rule lists, one for incoming and one for
//! outgoing mail. Lists are read and replaced as a whole; there is no
//! partial patch. Evaluating rules against messages happens elsewhere.

mod rule;
pub mod sieve;
mod store;

pub use rule::{
    parse_size, validate_rules, Action, ActionKind, Condition, ConditionKind, ConditionTree,
    Direction, FilterRuleSet, Rule,
};
pub use store::FilterRuleStore;
