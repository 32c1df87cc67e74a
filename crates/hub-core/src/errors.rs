use std::time::Duration;

/// Typed failures of the generative text backend.
///
/// None of these ever reach a caller of the monitor: every variant sends the
/// current summarization attempt down the degraded path.
#[derive(Clone, Debug, thiserror::Error)]
pub enum BackendError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("rate limited")]
    RateLimited,
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("empty response")]
    EmptyResponse,
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    /// Short classification string for log fields.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::InvalidRequest(_) => "invalid_request",
            Self::RateLimited => "rate_limited",
            Self::ServerError { .. } => "server_error",
            Self::Network(_) => "network_error",
            Self::Timeout(_) => "timeout",
            Self::EmptyResponse => "empty_response",
            Self::Malformed(_) => "malformed_response",
            Self::Unavailable(_) => "unavailable",
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::Unauthorized(body),
            400 | 404 => Self::InvalidRequest(body),
            429 => Self::RateLimited,
            500..=599 => Self::ServerError { status, body },
            _ => Self::InvalidRequest(format!("unexpected status {status}: {body}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_status_mapping() {
        assert!(matches!(BackendError::from_status(401, "no".into()), BackendError::Unauthorized(_)));
        assert!(matches!(BackendError::from_status(403, "no".into()), BackendError::Unauthorized(_)));
        assert!(matches!(BackendError::from_status(400, "bad".into()), BackendError::InvalidRequest(_)));
        assert!(matches!(BackendError::from_status(404, "model".into()), BackendError::InvalidRequest(_)));
        assert!(matches!(BackendError::from_status(429, "".into()), BackendError::RateLimited));
        assert!(matches!(
            BackendError::from_status(503, "down".into()),
            BackendError::ServerError { status: 503, .. }
        ));
        assert!(matches!(BackendError::from_status(302, "moved".into()), BackendError::InvalidRequest(_)));
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(BackendError::EmptyResponse.error_kind(), "empty_response");
        assert_eq!(BackendError::Timeout(Duration::from_secs(1)).error_kind(), "timeout");
        assert_eq!(BackendError::Network("reset".into()).error_kind(), "network_error");
    }

    #[test]
    fn display_includes_detail() {
        let err = BackendError::ServerError { status: 500, body: "boom".into() };
        assert_eq!(err.to_string(), "server error 500: boom");
    }
}
