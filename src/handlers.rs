use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::error::ThrottlerError;
use crate::response::{ConfigResponse, HealthResponse, MessageResponse};
use crate::throttler::Throttler;
use crate::validation::RequestValidator;

/// Shared application state
pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub throttler: Throttler,
}

impl AppState {
    pub fn new(throttler: Throttler) -> SharedState {
        Arc::new(Self { throttler })
    }
}

/// Throttled landing endpoint
pub async fn index() -> impl IntoResponse {
    Json(MessageResponse::new("Request accepted"))
}

/// Throttle status of one client
pub async fn get_client_status(
    State(state): State<SharedState>,
    Path(identity): Path<String>,
) -> Result<impl IntoResponse, ThrottlerError> {
    let identity = RequestValidator::validate_identity(&identity)?;
    let status = state.throttler.status_identity(&identity).await?;
    Ok(Json(status))
}

/// Forget a client's hits
pub async fn clear_client(
    State(state): State<SharedState>,
    Path(identity): Path<String>,
) -> Result<impl IntoResponse, ThrottlerError> {
    let identity = RequestValidator::validate_identity(&identity)?;
    state.throttler.clear_identity(&identity).await?;

    tracing::info!(identity = %identity, "Cleared client throttle state");
    Ok(StatusCode::NO_CONTENT)
}

/// Active throttle configuration
pub async fn get_config(State(state): State<SharedState>) -> impl IntoResponse {
    let throttler = &state.throttler;
    Json(ConfigResponse::current(
        throttler.condition(),
        throttler.failure_mode(),
        throttler.store().backend(),
    ))
}

/// Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    let store = state.throttler.store();

    match store.ping().await {
        Ok(()) => (StatusCode::OK, Json(HealthResponse::healthy(store.backend()))),
        Err(e) => {
            tracing::warn!(store = store.backend(), error = %e, "Store health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse::unhealthy(store.backend())),
            )
        }
    }
}
