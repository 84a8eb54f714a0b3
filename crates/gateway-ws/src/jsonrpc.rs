//! JSON-RPC 2.0 request parsing and response construction.

use serde_json::{json, Value};

/// Error codes surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcErrorCode {
    InvalidRequest,
    InvalidParams,
    MethodNotFound,
    InternalError,
    AccountIdError,
}

impl RpcErrorCode {
    #[must_use]
    pub fn code(&self) -> i64 {
        match self {
            RpcErrorCode::InvalidRequest => -32600,
            RpcErrorCode::MethodNotFound => -32601,
            RpcErrorCode::InvalidParams => -32602,
            RpcErrorCode::InternalError => -32603,
            RpcErrorCode::AccountIdError => -32005,
        }
    }

    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            RpcErrorCode::InvalidRequest => "Invalid request",
            RpcErrorCode::MethodNotFound => "Method not found",
            RpcErrorCode::InvalidParams => "Invalid params",
            RpcErrorCode::InternalError => "Internal error",
            RpcErrorCode::AccountIdError => "Account ID error",
        }
    }
}

/// A parsed client request.
#[derive(Debug, Clone)]
pub struct RpcRequest {
    pub id: Option<Value>,
    pub method: String,
    pub params: Option<Value>,
}

impl RpcRequest {
    /// Parse a request out of one websocket text frame.
    pub fn parse(text: &str) -> Result<Self, String> {
        let value: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
        let method = value
            .get("method")
            .and_then(Value::as_str)
            .ok_or_else(|| "method is a required field".to_string())?
            .to_string();
        Ok(Self {
            id: value.get("id").cloned(),
            method,
            params: value.get("params").cloned(),
        })
    }
}

/// Successful reply.
#[must_use]
pub fn result_response(id: Option<&Value>, result: Value) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    })
    .to_string()
}

/// Error reply: the canonical message for the code plus a detail string.
#[must_use]
pub fn error_response(id: Option<&Value>, code: RpcErrorCode, detail: &str) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code.code(),
            "message": code.message(),
            "data": detail,
        },
    })
    .to_string()
}

/// Server-initiated subscription notification.
#[must_use]
pub fn subscribe_notification(params: Value) -> String {
    json!({
        "jsonrpc": "2.0",
        "method": "subscribe",
        "params": params,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request() {
        let request =
            RpcRequest::parse(r#"{"id": 1, "method": "ping", "params": []}"#).unwrap();
        assert_eq!(request.method, "ping");
        assert_eq!(request.id, Some(json!(1)));
    }

    #[test]
    fn test_parse_rejects_missing_method() {
        assert!(RpcRequest::parse(r#"{"id": 1}"#).is_err());
        assert!(RpcRequest::parse("not json").is_err());
    }

    #[test]
    fn test_error_response_shape() {
        let response = error_response(Some(&json!(7)), RpcErrorCode::InvalidParams, "bad feed");
        let value: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(value["error"]["code"], -32602);
        assert_eq!(value["error"]["data"], "bad feed");
        assert_eq!(value["id"], 7);
    }

    #[test]
    fn test_notification_shape() {
        let notification = subscribe_notification(json!({"subscription": "s", "result": {}}));
        let value: Value = serde_json::from_str(&notification).unwrap();
        assert_eq!(value["method"], "subscribe");
        assert!(value.get("id").is_none());
    }
}
