use hub_store::StoreError;
use serde::{Deserialize, Serialize};

/// Tool invocation request: `{ method, params?, id? }`.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    pub params: Option<serde_json::Value>,
    pub id: Option<serde_json::Value>,
}

/// Wire format: `{ id, success, result?, error?: { code: String, message } }`.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub id: Option<serde_json::Value>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Failure classes reported to tool callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    MethodNotFound,
    InvalidParams,
    Internal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ParseError => "PARSE_ERROR",
            Self::MethodNotFound => "METHOD_NOT_FOUND",
            Self::InvalidParams => "INVALID_PARAMS",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

impl RpcResponse {
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<serde_json::Value>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(RpcError {
                code: code.as_str().to_string(),
                message: message.into(),
                data: None,
            }),
        }
    }

    pub fn method_not_found(id: Option<serde_json::Value>, method: &str) -> Self {
        Self::error(id, ErrorCode::MethodNotFound, format!("Unknown tool: {method}"))
    }

    pub fn invalid_params(id: Option<serde_json::Value>, msg: impl Into<String>) -> Self {
        Self::error(id, ErrorCode::InvalidParams, msg)
    }

    pub fn internal_error(id: Option<serde_json::Value>, msg: impl Into<String>) -> Self {
        Self::error(id, ErrorCode::Internal, msg)
    }

    pub fn parse_error() -> Self {
        Self::error(None, ErrorCode::ParseError, "Request body is not a valid tool call")
    }

    /// Missing rows and rejected input are the caller's fault; anything else
    /// is reported as internal.
    pub fn from_store_error(id: Option<serde_json::Value>, err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::invalid_params(id, format!("not found: {what}")),
            StoreError::Conflict(msg) => Self::invalid_params(id, msg),
            other => {
                tracing::warn!(error = %other, "store call failed");
                Self::internal_error(id, other.to_string())
            }
        }
    }
}

/// Extract a required non-empty string param.
pub fn require_str<'a>(params: &'a serde_json::Value, key: &str) -> Result<&'a str, String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| format!("Missing required parameter: {key}"))
}

/// Extract an optional non-empty string param.
pub fn optional_str<'a>(params: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}

/// Extract an optional integer param. Integral floats (`3.0`) are accepted
/// since many clients send every number as a double.
pub fn optional_i64(params: &serde_json::Value, key: &str) -> Option<i64> {
    let value = params.get(key)?;
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.is_finite())
            .map(|f| f as i64)
    })
}

pub fn require_i64(params: &serde_json::Value, key: &str) -> Result<i64, String> {
    optional_i64(params, key).ok_or_else(|| format!("Missing required parameter: {key} (integer)"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_without_params_or_id() {
        let req: RpcRequest = serde_json::from_str(r#"{"method":"bbs_list_topics"}"#).unwrap();
        assert_eq!(req.method, "bbs_list_topics");
        assert!(req.params.is_none());
        assert!(req.id.is_none());
    }

    #[test]
    fn success_omits_error_field() {
        let resp = RpcResponse::success(Some(json!("req-1")), json!({"topics": []}));
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["id"], "req-1");
        assert_eq!(value["success"], true);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn unknown_tool_names_the_method() {
        let value = serde_json::to_value(RpcResponse::method_not_found(Some(json!(4)), "bbs_delete")).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["code"], "METHOD_NOT_FOUND");
        assert_eq!(value["error"]["message"], "Unknown tool: bbs_delete");
        assert!(value.get("result").is_none());
    }

    #[test]
    fn store_errors_split_by_blame() {
        let missing = RpcResponse::from_store_error(None, StoreError::NotFound("topic#9".into()));
        assert_eq!(missing.error.unwrap().code, ErrorCode::InvalidParams.as_str());

        let blank = RpcResponse::from_store_error(None, StoreError::Conflict("title is empty".into()));
        assert_eq!(blank.error.unwrap().message, "title is empty");

        let locked = RpcResponse::from_store_error(None, StoreError::Database("database is locked".into()));
        assert_eq!(locked.error.unwrap().code, "INTERNAL_ERROR");
    }

    #[test]
    fn string_params_reject_blank_and_non_strings() {
        let params = json!({"title": "release", "blank": "  ", "topic_id": 5});
        assert_eq!(require_str(&params, "title").unwrap(), "release");
        assert!(require_str(&params, "missing").is_err());
        assert!(require_str(&params, "blank").is_err());
        assert!(require_str(&params, "topic_id").is_err());
        assert_eq!(optional_str(&params, "blank"), None);
    }

    #[test]
    fn topic_ids_accept_integral_floats() {
        let params = json!({"a": 5, "b": 3.0, "c": 2.5, "d": "7"});
        assert_eq!(optional_i64(&params, "a"), Some(5));
        assert_eq!(optional_i64(&params, "b"), Some(3));
        assert_eq!(optional_i64(&params, "c"), None);
        assert_eq!(optional_i64(&params, "d"), None);
        assert!(require_i64(&params, "missing").is_err());
    }
}
