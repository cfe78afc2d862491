use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = ThrottlerError> = std::result::Result<T, E>;

/// Errors returned by the throttler operations.
#[derive(Debug, Error)]
pub enum ThrottlerError {
    /// The client used up its budget inside the current window.
    #[error("The client is currently rate limited")]
    RateLimited { retry_after: Duration },

    /// No throttle record exists for the client.
    #[error("The client has not been throttled")]
    NotThrottled,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Decode error: {0}")]
    Decode(#[from] CodecError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Failures raised by key-value store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("backend failure: {0}")]
    Backend(String),

    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("redis failure: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

/// Malformed or unserializable throttle record bytes.
#[derive(Debug, Error)]
#[error("invalid throttle record: {0}")]
pub struct CodecError(#[from] serde_json::Error);

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, code: u16) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            code,
        }
    }

    pub fn from_throttler_error(err: &ThrottlerError) -> Self {
        let message = err.to_string();
        match err {
            ThrottlerError::RateLimited { .. } => {
                Self::new("rate_limit_exceeded", "Too many requests", 429)
            }
            ThrottlerError::NotThrottled => Self::new("not_throttled", &message, 404),
            ThrottlerError::Store(_) => Self::new("service_unavailable", &message, 503),
            ThrottlerError::Decode(_) => Self::new("internal_error", &message, 500),
            ThrottlerError::Configuration(_) => Self::new("configuration_error", &message, 500),
            ThrottlerError::Validation(_) => Self::new("validation_error", &message, 400),
        }
    }
}

/// Whole seconds a limited client should wait, rounded up and never zero,
/// so waiting the advertised time is always enough.
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_millis().div_ceil(1000).max(1);
    u64::try_from(secs).unwrap_or(u64::MAX)
}

impl IntoResponse for ThrottlerError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::from_throttler_error(&self);
        let status =
            StatusCode::from_u16(body.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut response = (status, Json(body)).into_response();

        if let ThrottlerError::RateLimited { retry_after } = self {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(retry_after_secs(retry_after)),
            );
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_codes() {
        let limited = ThrottlerError::RateLimited {
            retry_after: Duration::from_secs(5),
        };
        assert_eq!(ErrorResponse::from_throttler_error(&limited).code, 429);
        assert_eq!(
            ErrorResponse::from_throttler_error(&ThrottlerError::NotThrottled).code,
            404
        );

        let store = ThrottlerError::from(StoreError::Backend("down".into()));
        let body = ErrorResponse::from_throttler_error(&store);
        assert_eq!(body.code, 503);
        assert_eq!(body.error, "service_unavailable");
    }

    #[test]
    fn test_rate_limited_response_has_retry_after() {
        let response = ThrottlerError::RateLimited {
            retry_after: Duration::from_millis(1500),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "2");
    }

    #[test]
    fn test_retry_after_secs_rounds_up() {
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(1)), 1);
        assert_eq!(retry_after_secs(Duration::from_secs(1)), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(1001)), 2);
        assert_eq!(retry_after_secs(Duration::from_millis(2500)), 3);
        assert_eq!(retry_after_secs(Duration::from_secs(600)), 600);
    }

    #[test]
    fn test_decode_error_wraps_json_error() {
        let json_err = serde_json::from_slice::<serde_json::Value>(b"{").unwrap_err();
        let err = ThrottlerError::from(CodecError::from(json_err));
        assert!(err.to_string().starts_with("Decode error: invalid throttle record"));
    }
}
