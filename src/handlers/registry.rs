//! Handler registry
//!
//! Maps request names to handlers and turns errors into fault responses.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::filter::{GetFilterRulesHandler, ModifyFilterRulesHandler};
use super::handler::{Handler, RequestContext};
use super::permission::{GetPermissionHandler, GrantPermissionHandler, RevokePermissionHandler};
use crate::core::{ServiceError, ServiceResult};
use crate::filters::Direction;
use crate::service::PolicyService;

/// Registry of request handlers
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every built-in handler wired to `service`
    pub fn with_defaults(service: Arc<PolicyService>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(GetPermissionHandler::new(service.clone())));
        registry.register(Arc::new(GrantPermissionHandler::new(service.clone())));
        registry.register(Arc::new(RevokePermissionHandler::new(service.clone())));
        for direction in Direction::ALL {
            registry.register(Arc::new(GetFilterRulesHandler::new(
                service.clone(),
                direction,
            )));
            registry.register(Arc::new(ModifyFilterRulesHandler::new(
                service.clone(),
                direction,
            )));
        }
        registry
    }

    /// Register a handler, replacing any handler with the same name
    pub fn register(&mut self, handler: Arc<dyn Handler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(name).cloned()
    }

    /// Registered request names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Run the named request
    pub async fn dispatch(
        &self,
        name: &str,
        ctx: &RequestContext,
        request: &Value,
    ) -> ServiceResult<Value> {
        let handler = self
            .get(name)
            .ok_or_else(|| ServiceError::InvalidRequest(format!("Unknown request: {}", name)))?;

        tracing::debug!("Dispatching {} for {}", name, ctx.caller.name);
        let result = handler.handle(ctx, request).await;
        if let Err(e) = &result {
            if e.is_client_error() {
                tracing::debug!("{} rejected: {}", name, e);
            } else {
                tracing::error!("{} failed: {}", name, e);
            }
        }
        result
    }

    /// Run the named request and always produce a response body
    pub async fn respond(&self, name: &str, ctx: &RequestContext, request: &Value) -> Value {
        match self.dispatch(name, ctx, request).await {
            Ok(response) => response,
            Err(e) => fault(&e),
        }
    }
}

/// Fault body for a failed request
pub fn fault(error: &ServiceError) -> Value {
    json!({
        "fault": {
            "code": error.code(),
            "message": error.to_string(),
        }
    })
}
