//! Caller identity.
//!
//! Identity verification happens upstream (an auth proxy or the host
//! application); the gateway only needs the verified numeric user id.

use axum::http::HeaderMap;

/// Header carrying the upstream-verified user id.
pub const DEFAULT_USER_HEADER: &str = "x-user-id";

/// Extracts a verified user id from request headers.
pub trait IdentityVerifier: Send + Sync {
    /// `None` when no valid identity is present.
    fn verify(&self, headers: &HeaderMap) -> Option<u64>;
}

/// Trusts a numeric user id forwarded in a header by the upstream verifier.
#[derive(Debug, Clone)]
pub struct ForwardedIdentity {
    header: String,
}

impl ForwardedIdentity {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into().to_ascii_lowercase(),
        }
    }
}

impl Default for ForwardedIdentity {
    fn default() -> Self {
        Self::new(DEFAULT_USER_HEADER)
    }
}

impl IdentityVerifier for ForwardedIdentity {
    fn verify(&self, headers: &HeaderMap) -> Option<u64> {
        headers
            .get(self.header.as_str())?
            .to_str()
            .ok()?
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|id| *id > 0)
    }
}

/// User id attached to an admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub u64);

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(DEFAULT_USER_HEADER, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn numeric_header_is_accepted() {
        assert_eq!(ForwardedIdentity::default().verify(&headers(" 42 ")), Some(42));
    }

    #[test]
    fn missing_or_malformed_is_rejected() {
        let verifier = ForwardedIdentity::default();
        assert_eq!(verifier.verify(&HeaderMap::new()), None);
        assert_eq!(verifier.verify(&headers("alice")), None);
        assert_eq!(verifier.verify(&headers("-3")), None);
        assert_eq!(verifier.verify(&headers("0")), None);
    }

    #[test]
    fn header_name_is_configurable() {
        let verifier = ForwardedIdentity::new("X-Remote-User");
        let mut map = HeaderMap::new();
        map.insert("x-remote-user", HeaderValue::from_static("9"));
        assert_eq!(verifier.verify(&map), Some(9));
    }
}
