//! Static bearer-token authentication.

use std::fmt;

use tracing::warn;

/// Bearer token authentication.
///
/// An empty token is accepted; the request then carries `Bearer ` and the
/// API treats it as unauthenticated.
#[derive(Clone)]
pub struct BearerConfig {
    token: String,
}

impl BearerConfig {
    /// Create a new bearer token authentication.
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        if token.is_empty() {
            warn!("empty bearer token, requests will be sent unauthenticated");
        }
        Self { token }
    }

    /// The `Authorization` header value.
    pub fn header_value(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for BearerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerConfig")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_value() {
        assert_eq!(BearerConfig::new("abc").header_value(), "Bearer abc");
    }

    #[test]
    fn test_empty_token_is_allowed() {
        assert_eq!(BearerConfig::new("").header_value(), "Bearer ");
    }
}
