//! Key generation utilities for throttle records.

/// Maps a client identity to the store key its record lives under.
///
/// Keys must be stable for one client and distinct for distinguishable
/// clients. Stores may still transform keys on their own.
pub trait KeyGenerator: Send + Sync {
    fn generate_key(&self, identity: &str) -> String;
}

impl<F> KeyGenerator for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn generate_key(&self, identity: &str) -> String {
        self(identity)
    }
}

/// Uses the identity as the key.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityKey;

impl KeyGenerator for IdentityKey {
    fn generate_key(&self, identity: &str) -> String {
        identity.to_string()
    }
}

/// Namespaces keys with a fixed prefix, e.g. `throttle:` in a shared Redis.
#[derive(Debug, Clone)]
pub struct PrefixedKey {
    prefix: String,
}

impl PrefixedKey {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl KeyGenerator for PrefixedKey {
    fn generate_key(&self, identity: &str) -> String {
        format!("{}{}", self.prefix, identity)
    }
}

/// Wraps another generator and replaces unsafe characters with `_`.
#[derive(Debug, Clone, Default)]
pub struct SanitizedKey<G> {
    inner: G,
}

impl<G: KeyGenerator> SanitizedKey<G> {
    pub fn new(inner: G) -> Self {
        Self { inner }
    }
}

impl<G: KeyGenerator> KeyGenerator for SanitizedKey<G> {
    fn generate_key(&self, identity: &str) -> String {
        sanitize_key(&self.inner.generate_key(identity))
    }
}

/// Keeps alphanumerics, `:`, `-`, `_` and `.`; everything else becomes `_`.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ':' | '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_key() {
        assert_eq!(IdentityKey.generate_key("192.168.1.1"), "192.168.1.1");
        assert_eq!(IdentityKey.generate_key(""), "");
    }

    #[test]
    fn test_prefixed_key() {
        let generator = PrefixedKey::new("throttle:");
        assert_eq!(generator.generate_key("10.0.0.1"), "throttle:10.0.0.1");
    }

    #[test]
    fn test_sanitized_key() {
        let generator = SanitizedKey::new(PrefixedKey::new("throttle:"));
        assert_eq!(
            generator.generate_key("2001:db8::1 /x"),
            "throttle:2001:db8::1__x"
        );
    }

    #[test]
    fn test_sanitize_key() {
        let key = "test@key#with$special%chars";
        assert_eq!(sanitize_key(key), "test_key_with_special_chars");
    }

    #[test]
    fn test_closure_generator() {
        let custom = |ip: &str| format!("custom-{}", ip);
        assert_eq!(custom.generate_key("123.45.67.89"), "custom-123.45.67.89");
    }
}
