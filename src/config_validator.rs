use crate::config::{Config, StoreBackend};
use crate::error::ThrottlerError;
use std::path::Path;
use std::time::Duration;

/// Cross-field checks the derive-based validation cannot express.
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate_config(config: &Config) -> Result<(), ThrottlerError> {
        config.throttle_condition().validate()?;

        match config.store {
            StoreBackend::Memory => {}
            StoreBackend::Filesystem => Self::validate_cache_dir(&config.cache_dir)?,
            StoreBackend::Redis => Self::validate_redis_url(&config.redis_url)?,
        }

        if let Some(timeout) = config.store_timeout {
            Self::validate_store_timeout(timeout)?;
        }

        Ok(())
    }

    /// Validates a Redis URL
    pub fn validate_redis_url(url: &str) -> Result<(), ThrottlerError> {
        if url.is_empty() {
            return Err(ThrottlerError::Configuration(
                "Redis URL cannot be empty".to_string(),
            ));
        }

        if !url.starts_with("redis://") && !url.starts_with("rediss://") {
            return Err(ThrottlerError::Configuration(
                "Redis URL must start with 'redis://' or 'rediss://'".to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate_cache_dir(dir: &Path) -> Result<(), ThrottlerError> {
        if dir.as_os_str().is_empty() {
            return Err(ThrottlerError::Configuration(
                "Cache directory cannot be empty".to_string(),
            ));
        }

        if dir.exists() && !dir.is_dir() {
            return Err(ThrottlerError::Configuration(format!(
                "Cache directory {} is not a directory",
                dir.display()
            )));
        }

        Ok(())
    }

    pub fn validate_store_timeout(timeout: Duration) -> Result<(), ThrottlerError> {
        if timeout.is_zero() {
            return Err(ThrottlerError::Configuration(
                "Store timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_redis_url() {
        assert!(ConfigValidator::validate_redis_url("redis://localhost:6379").is_ok());
        assert!(ConfigValidator::validate_redis_url("rediss://localhost:6379").is_ok());
    }

    #[test]
    fn test_invalid_redis_url() {
        assert!(ConfigValidator::validate_redis_url("").is_err());
        assert!(ConfigValidator::validate_redis_url("http://localhost:6379").is_err());
    }

    #[test]
    fn test_redis_url_only_checked_for_redis_store() {
        let memory = Config {
            redis_url: "http://nope".to_string(),
            ..Config::default()
        };
        assert!(ConfigValidator::validate_config(&memory).is_ok());

        let redis = Config {
            store: StoreBackend::Redis,
            ..memory
        };
        assert!(ConfigValidator::validate_config(&redis).is_err());
    }

    #[test]
    fn test_cache_dir_must_be_a_directory() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(ConfigValidator::validate_cache_dir(file.path()).is_err());
        assert!(ConfigValidator::validate_cache_dir(Path::new("")).is_err());

        let dir = tempfile::tempdir().unwrap();
        assert!(ConfigValidator::validate_cache_dir(dir.path()).is_ok());
        assert!(ConfigValidator::validate_cache_dir(&dir.path().join("missing")).is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = Config {
            interval: Duration::ZERO,
            ..Config::default()
        };
        assert!(ConfigValidator::validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_store_timeout_rejected() {
        assert!(ConfigValidator::validate_store_timeout(Duration::ZERO).is_err());
        assert!(ConfigValidator::validate_store_timeout(Duration::from_millis(5)).is_ok());
    }
}
