//! Filter rule handlers
//!
//! One get/modify pair per mail direction. The request names are the
//! historical ones: the incoming pair has no direction prefix.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::handler::{parse_request, Handler, RequestContext};
use crate::core::ServiceResult;
use crate::filters::{Direction, Rule};
use crate::service::{AccessLevel, PolicyService};

#[derive(Debug, Deserialize)]
struct GetFilterRulesRequest {
    #[serde(default)]
    account: Option<String>,
    /// Also return the rules rendered as a Sieve script
    #[serde(default)]
    sieve: bool,
}

#[derive(Debug, Deserialize)]
struct ModifyFilterRulesRequest {
    #[serde(default)]
    account: Option<String>,
    rules: Vec<Rule>,
}

/// Returns the rule list of one direction
pub struct GetFilterRulesHandler {
    service: Arc<PolicyService>,
    direction: Direction,
}

impl GetFilterRulesHandler {
    pub fn new(service: Arc<PolicyService>, direction: Direction) -> Self {
        Self { service, direction }
    }
}

#[async_trait]
impl Handler for GetFilterRulesHandler {
    fn name(&self) -> &str {
        match self.direction {
            Direction::Incoming => "GetFilterRules",
            Direction::Outgoing => "GetOutgoingFilterRules",
        }
    }

    fn description(&self) -> &str {
        "Return the ordered filter rules of an account. Accounts without rules get an empty list."
    }

    async fn handle(&self, ctx: &RequestContext, request: &Value) -> ServiceResult<Value> {
        let request: GetFilterRulesRequest = parse_request(self.name(), request)?;
        let account = self.service.authorize_target(
            &ctx.caller,
            request.account.as_deref(),
            AccessLevel::Options,
        )?;
        self.service.mailbox(&account)?;

        let set = self.service.filters().read(account.id, self.direction)?;
        let mut response = json!({ "rules": set.rules });
        if request.sieve {
            response["sieve"] = Value::String(set.to_sieve());
        }
        Ok(response)
    }
}

/// Replaces the rule list of one direction
pub struct ModifyFilterRulesHandler {
    service: Arc<PolicyService>,
    direction: Direction,
}

impl ModifyFilterRulesHandler {
    pub fn new(service: Arc<PolicyService>, direction: Direction) -> Self {
        Self { service, direction }
    }
}

#[async_trait]
impl Handler for ModifyFilterRulesHandler {
    fn name(&self) -> &str {
        match self.direction {
            Direction::Incoming => "ModifyFilterRules",
            Direction::Outgoing => "ModifyOutgoingFilterRules",
        }
    }

    fn description(&self) -> &str {
        "Replace the whole filter rule list of an account. An empty list clears it."
    }

    async fn handle(&self, ctx: &RequestContext, request: &Value) -> ServiceResult<Value> {
        let request: ModifyFilterRulesRequest = parse_request(self.name(), request)?;
        let account = self.service.authorize_target(
            &ctx.caller,
            request.account.as_deref(),
            AccessLevel::Options,
        )?;
        self.service.mailbox(&account)?;

        self.service
            .filters()
            .replace(account.id, self.direction, request.rules)?;
        Ok(json!({}))
    }
}
