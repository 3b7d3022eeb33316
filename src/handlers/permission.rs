//! Grant handlers
//!
//! `GetPermission`, `GrantPermission` and `RevokePermission` act on the
//! access-control entries of the target account, which defaults to the
//! caller.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::handler::{parse_request, Handler, RequestContext};
use crate::account::Account;
use crate::core::{ServiceError, ServiceResult};
use crate::permissions::{Ace, RightScope};
use crate::service::{AccessLevel, PolicyService};

#[derive(Debug, Deserialize)]
struct GetPermissionRequest {
    #[serde(default)]
    account: Option<String>,
    #[serde(default)]
    rights: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AceRequest {
    #[serde(default)]
    account: Option<String>,
    aces: Vec<Ace>,
}

/// Resolve and authorize the target, then make sure it has a mailbox
fn target(service: &PolicyService, caller: &Account, account: Option<&str>) -> ServiceResult<Account> {
    let account = service.authorize_target(caller, account, AccessLevel::Account)?;
    service.mailbox(&account)?;
    Ok(account)
}

/// Returns the target's entries, optionally filtered by right
pub struct GetPermissionHandler {
    service: Arc<PolicyService>,
}

impl GetPermissionHandler {
    pub fn new(service: Arc<PolicyService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Handler for GetPermissionHandler {
    fn name(&self) -> &str {
        "GetPermission"
    }

    fn description(&self) -> &str {
        "List the access-control entries of an account, optionally restricted to some rights."
    }

    async fn handle(&self, ctx: &RequestContext, request: &Value) -> ServiceResult<Value> {
        let request: GetPermissionRequest = parse_request(self.name(), request)?;
        let account = target(&self.service, &ctx.caller, request.account.as_deref())?;

        let aces = self.service.permissions().query(account.id, &request.rights)?;
        Ok(json!({ "aces": aces }))
    }
}

/// Adds or updates entries on the target
pub struct GrantPermissionHandler {
    service: Arc<PolicyService>,
}

impl GrantPermissionHandler {
    pub fn new(service: Arc<PolicyService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Handler for GrantPermissionHandler {
    fn name(&self) -> &str {
        "GrantPermission"
    }

    fn description(&self) -> &str {
        "Grant or deny rights on an account. Returns the entries as stored."
    }

    async fn handle(&self, ctx: &RequestContext, request: &Value) -> ServiceResult<Value> {
        let request: AceRequest = parse_request(self.name(), request)?;
        let account = target(&self.service, &ctx.caller, request.account.as_deref())?;

        let rights = self.service.permissions().resolve_rights(&request.aces)?;
        for right in rights.iter().filter(|r| r.scope == RightScope::Admin) {
            if !self
                .service
                .authorizer()
                .can_grant_admin_right(&ctx.caller, &account, right)
            {
                tracing::warn!(
                    "{} may not grant admin right {} on {}",
                    ctx.caller.name,
                    right.name,
                    account.name
                );
                return Err(ServiceError::PermissionDenied(format!(
                    "{} may not grant admin right {}",
                    ctx.caller.name, right.name
                )));
            }
        }

        let granted = self.service.permissions().grant(account.id, request.aces)?;
        Ok(json!({ "aces": granted }))
    }
}

/// Removes entries from the target
pub struct RevokePermissionHandler {
    service: Arc<PolicyService>,
}

impl RevokePermissionHandler {
    pub fn new(service: Arc<PolicyService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Handler for RevokePermissionHandler {
    fn name(&self) -> &str {
        "RevokePermission"
    }

    fn description(&self) -> &str {
        "Revoke entries from an account. Returns only the entries that were actually removed."
    }

    async fn handle(&self, ctx: &RequestContext, request: &Value) -> ServiceResult<Value> {
        let request: AceRequest = parse_request(self.name(), request)?;
        let account = target(&self.service, &ctx.caller, request.account.as_deref())?;

        let revoked = self.service.permissions().revoke(account.id, &request.aces)?;
        Ok(json!({ "aces": revoked }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{InMemoryDirectory, StaticAuthorizer};

    struct Fixture {
        service: Arc<PolicyService>,
        alice: Account,
        bob: Account,
        admin: Account,
    }

    fn fixture() -> Fixture {
        let directory = InMemoryDirectory::new();
        let alice = Account::new("alice@example.com");
        let bob = Account::new("bob@example.com");
        let admin = Account::new("admin@example.com");
        directory.add_account(alice.clone());
        directory.add_account(bob.clone());
        directory.add_account(admin.clone());

        let authorizer = StaticAuthorizer::new().with_admin(admin.id);
        let service = Arc::new(PolicyService::new(Arc::new(directory), Arc::new(authorizer)));
        Fixture {
            service,
            alice,
            bob,
            admin,
        }
    }

    #[tokio::test]
    async fn test_grant_then_get() {
        let f = fixture();
        let ctx = RequestContext::new(f.alice.clone());

        let granted = GrantPermissionHandler::new(f.service.clone())
            .handle(
                &ctx,
                &json!({"aces": [{"grantee": {"type": "usr", "id": "u1"}, "right": "viewFreeBusy"}]}),
            )
            .await
            .unwrap();
        assert_eq!(granted["aces"].as_array().unwrap().len(), 1);

        let listed = GetPermissionHandler::new(f.service.clone())
            .handle(&ctx, &json!({"rights": ["viewFreeBusy"]}))
            .await
            .unwrap();
        assert_eq!(listed["aces"][0]["right"], "viewFreeBusy");
        assert_eq!(listed["aces"][0]["grantee"]["id"], "u1");
    }

    #[tokio::test]
    async fn test_revoke_reports_only_removed() {
        let f = fixture();
        let ctx = RequestContext::new(f.alice.clone());
        f.service
            .permissions()
            .grant(f.alice.id, vec![Ace::grant(crate::permissions::Grantee::user("u1"), "invite")])
            .unwrap();

        let revoked = RevokePermissionHandler::new(f.service.clone())
            .handle(
                &ctx,
                &json!({"aces": [
                    {"grantee": {"type": "usr", "id": "u1"}, "right": "invite"},
                    {"grantee": {"type": "usr", "id": "u2"}, "right": "invite"}
                ]}),
            )
            .await
            .unwrap();
        assert_eq!(revoked["aces"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_foreign_account_denied() {
        let f = fixture();
        let ctx = RequestContext::new(f.alice.clone());

        let err = GetPermissionHandler::new(f.service.clone())
            .handle(&ctx, &json!({"account": f.bob.name}))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_admin_right_needs_admin() {
        let f = fixture();
        let request = json!({
            "account": f.bob.name,
            "aces": [{"grantee": {"type": "usr", "id": "u1"}, "right": "getAccount"}]
        });

        let err = GrantPermissionHandler::new(f.service.clone())
            .handle(&RequestContext::new(f.bob.clone()), &request)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied(_)));
        let none: &[&str] = &[];
        assert!(f.service.permissions().query(f.bob.id, none).unwrap().is_empty());

        let granted = GrantPermissionHandler::new(f.service.clone())
            .handle(&RequestContext::new(f.admin.clone()), &request)
            .await
            .unwrap();
        assert_eq!(granted["aces"][0]["right"], "getAccount");
    }

    #[tokio::test]
    async fn test_unknown_right() {
        let f = fixture();
        let err = GrantPermissionHandler::new(f.service.clone())
            .handle(
                &RequestContext::new(f.alice.clone()),
                &json!({"aces": [{"grantee": {"type": "pub"}, "right": "bogus"}]}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::UnknownRight(_)));
    }

    #[tokio::test]
    async fn test_malformed_request() {
        let f = fixture();
        let err = GrantPermissionHandler::new(f.service.clone())
            .handle(&RequestContext::new(f.alice.clone()), &json!({"aces": "nope"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest(_)));
    }
}
