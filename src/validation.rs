use crate::error::ThrottlerError;
use regex::Regex;
use std::sync::LazyLock;

/// Characters found in IPv4/IPv6 addresses, hostnames and API-key style
/// identities.
static IDENTITY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9.:_\-\[\]%]{1,128}$").expect("identity pattern is a valid regex")
});

/// Request validation utilities
pub struct RequestValidator;

impl RequestValidator {
    /// Validates a client identity taken from an admin path parameter.
    pub fn validate_identity(identity: &str) -> Result<String, ThrottlerError> {
        let identity = identity.trim();

        if identity.is_empty() {
            return Err(ThrottlerError::Validation(
                "Client identity cannot be empty".to_string(),
            ));
        }

        if !IDENTITY_PATTERN.is_match(identity) {
            return Err(ThrottlerError::Validation(
                "Client identity can only contain letters, digits and '.:_-[]%', up to 128 characters"
                    .to_string(),
            ));
        }

        Ok(identity.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identities() {
        for identity in ["192.168.1.1", "2001:db8::1", "[::1]", "fe80::1%eth0", "api_key-42"] {
            assert_eq!(
                RequestValidator::validate_identity(identity).unwrap(),
                identity
            );
        }
    }

    #[test]
    fn test_identity_is_trimmed() {
        assert_eq!(
            RequestValidator::validate_identity(" 10.0.0.1 ").unwrap(),
            "10.0.0.1"
        );
    }

    #[test]
    fn test_invalid_identities() {
        assert!(RequestValidator::validate_identity("").is_err());
        assert!(RequestValidator::validate_identity("   ").is_err());
        assert!(RequestValidator::validate_identity("invalid key!").is_err());
        assert!(RequestValidator::validate_identity("a/b").is_err());
        assert!(RequestValidator::validate_identity(&"1".repeat(129)).is_err());
    }
}
