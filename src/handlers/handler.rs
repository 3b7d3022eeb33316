//! Handler trait definition
//!
//! Every request type implements this trait to provide a consistent
//! interface to the registry.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::account::Account;
use crate::core::{ServiceError, ServiceResult};

/// Per-request context supplied by the host
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The authenticated account making the request
    pub caller: Account,
}

impl RequestContext {
    pub fn new(caller: Account) -> Self {
        Self { caller }
    }
}

/// Trait for request handlers
#[async_trait]
pub trait Handler: Send + Sync {
    /// Request name the handler is registered under
    fn name(&self) -> &str;

    /// Get a description of this handler
    fn description(&self) -> &str;

    /// Handle one request
    ///
    /// The request is a JSON object; the response is a JSON object as well.
    async fn handle(&self, ctx: &RequestContext, request: &Value) -> ServiceResult<Value>;
}

/// Deserialize a request body, naming the handler on failure
pub(crate) fn parse_request<T: DeserializeOwned>(handler: &str, request: &Value) -> ServiceResult<T> {
    serde_json::from_value(request.clone())
        .map_err(|e| ServiceError::InvalidRequest(format!("Invalid {} request: {}", handler, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Sample {
        account: Option<String>,
    }

    #[test]
    fn test_parse_request() {
        let sample: Sample = parse_request("Sample", &json!({"account": "a"})).unwrap();
        assert_eq!(sample.account.as_deref(), Some("a"));

        let err = parse_request::<Sample>("Sample", &json!({"account": 5})).unwrap_err();
        match err {
            ServiceError::InvalidRequest(message) => assert!(message.starts_with("Invalid Sample request")),
            other => panic!("Expected invalid request, got {:?}", other),
        }
    }
}
