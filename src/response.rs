use crate::throttler::{FailureMode, ThrottleCondition};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub store: String,
    pub store_connected: bool,
}

impl HealthResponse {
    pub fn healthy(store: &str) -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: unix_timestamp(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            store: store.to_string(),
            store_connected: true,
        }
    }

    pub fn unhealthy(store: &str) -> Self {
        Self {
            status: "unhealthy".to_string(),
            timestamp: unix_timestamp(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            store: store.to_string(),
            store_connected: false,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub message: String,
    pub condition: ThrottleCondition,
    pub failure_mode: FailureMode,
    pub store: String,
}

impl ConfigResponse {
    pub fn current(condition: ThrottleCondition, failure_mode: FailureMode, store: &str) -> Self {
        Self {
            message: "Current configuration".to_string(),
            condition,
            failure_mode,
            store: store.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_health_response_serialization() {
        let json = serde_json::to_value(HealthResponse::healthy("memory")).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["store"], "memory");
        assert_eq!(json["store_connected"], true);
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_config_response_serialization() {
        let response = ConfigResponse::current(
            ThrottleCondition::new(Duration::from_secs(300), 20),
            FailureMode::Closed,
            "redis",
        );
        let json = serde_json::to_value(response).unwrap();
        assert_eq!(json["condition"]["interval"], "5m");
        assert_eq!(json["condition"]["max_requests"], 20);
        assert_eq!(json["failure_mode"], "closed");
    }
}
