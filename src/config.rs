use crate::config_validator::ConfigValidator;
use crate::error::ThrottlerError;
use crate::throttler::{FailureMode, ThrottleCondition};
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// Where throttle records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    Memory,
    Filesystem,
    Redis,
}

/// How the service identifies clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IdentitySource {
    /// `X-Forwarded-For` / `X-Real-IP` headers set by a reverse proxy.
    RealIp,
    /// The TCP peer address.
    RemoteIp,
}

#[derive(Debug, Clone, Parser, Validate)]
#[command(name = "kv-throttler", version, about = "Throttles HTTP clients by IP")]
pub struct Config {
    /// Server bind address
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3000")]
    pub bind_addr: SocketAddr,

    /// Backing store for throttle records
    #[arg(long, env = "STORE_BACKEND", value_enum, default_value = "memory")]
    pub store: StoreBackend,

    /// Redis connection URL, used with the redis store
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// Directory used by the filesystem store
    #[arg(long, env = "CACHE_DIR", default_value = "cache")]
    pub cache_dir: PathBuf,

    /// Trailing window a client's hits are counted in, e.g. "10m" or "30s"
    #[arg(long, env = "THROTTLE_INTERVAL", default_value = "10m", value_parser = humantime::parse_duration)]
    pub interval: Duration,

    /// Hits allowed inside one window
    #[arg(long, env = "MAX_REQUESTS", default_value_t = 10)]
    #[validate(range(min = 1))]
    pub max_requests: u64,

    /// Prefix added to every store key
    #[arg(long, env = "KEY_PREFIX", default_value = "throttle:")]
    #[validate(length(max = 64))]
    pub key_prefix: String,

    /// Client identification strategy
    #[arg(long, env = "IDENTITY_SOURCE", value_enum, default_value = "real-ip")]
    pub identity: IdentitySource,

    /// Decision when the store cannot be read
    #[arg(long, env = "FAILURE_MODE", value_enum, default_value = "open")]
    pub failure_mode: FailureMode,

    /// Upper bound for a single store call, e.g. "250ms"
    #[arg(long, env = "STORE_TIMEOUT", value_parser = humantime::parse_duration)]
    pub store_timeout: Option<Duration>,

    /// Serialize concurrent hits of one client inside this process
    #[arg(long, env = "SERIALIZE_PER_KEY", default_value_t = false)]
    pub serialize_per_key: bool,

    /// Memory store cleanup interval in seconds
    #[arg(long, env = "CLEANUP_INTERVAL", default_value_t = 300)]
    #[validate(range(min = 1))]
    pub cleanup_interval_secs: u64,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            store: StoreBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            cache_dir: PathBuf::from("cache"),
            interval: Duration::from_secs(10 * 60),
            max_requests: 10,
            key_prefix: "throttle:".to_string(),
            identity: IdentitySource::RealIp,
            failure_mode: FailureMode::Open,
            store_timeout: None,
            serialize_per_key: false,
            cleanup_interval_secs: 300,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Runs field validation and the backend-specific checks.
    pub fn check(&self) -> Result<(), ThrottlerError> {
        self.validate()
            .map_err(|e| ThrottlerError::Configuration(e.to_string()))?;
        ConfigValidator::validate_config(self)
    }

    pub fn throttle_condition(&self) -> ThrottleCondition {
        ThrottleCondition::new(self.interval, self.max_requests)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}
