use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::ThrottlerError;
use crate::handlers::SharedState;
use crate::identity::{IdentityProvider, RealIp, RemoteIp};

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// Records a hit for every request and rejects limited clients with 429.
pub async fn throttle_requests(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let throttler = &state.throttler;

    let remaining = match throttler.throttle_remaining(&request).await {
        Ok(remaining) => remaining,
        Err(err @ ThrottlerError::RateLimited { .. }) => {
            warn!(
                target: "kv_throttler::middleware",
                client_key = %throttler.client_key(&request),
                uri = %request.uri(),
                "Rejected rate limited client"
            );
            return err.into_response();
        }
        Err(err) => {
            error!(
                target: "kv_throttler::middleware",
                error = %err,
                "Throttling failed"
            );
            return err.into_response();
        }
    };

    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert(
        X_RATELIMIT_LIMIT,
        HeaderValue::from(throttler.condition().max_requests),
    );
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));

    response
}

/// Logging middleware for request/response tracking
pub async fn logging_middleware(mut request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let client_ip = get_client_ip(&request);
    let request_id = Uuid::new_v4().to_string();

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        request.headers_mut().insert(X_REQUEST_ID, value);
    }

    info!(
        target: "kv_throttler::middleware",
        request_id = %request_id,
        method = %method,
        uri = %uri,
        client_ip = %client_ip,
        "Incoming request"
    );

    let mut response = next.run(request).await;

    let status = response.status();
    info!(
        target: "kv_throttler::middleware",
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %status,
        "Request completed"
    );

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }

    response
}

fn get_client_ip(request: &Request) -> String {
    let ip = RealIp.identify(request);
    if !ip.is_empty() {
        return ip;
    }

    let ip = RemoteIp.identify(request);
    if ip.is_empty() {
        "unknown".to_string()
    } else {
        ip
    }
}
