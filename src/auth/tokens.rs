//! Caller tokens and the expected secret of the built-in check route
//!
//! Tokens arrive in the `token` query parameter of the upgrade request.
//! A missing parameter yields an empty token, which is never authorized
//! implicitly and is logged as `unknown`.

use std::fmt;
use url::form_urlencoded;

/// Query parameter carrying the caller token
pub const TOKEN_PARAM: &str = "token";

/// Placeholder used when logging an empty token
pub const UNKNOWN_TOKEN: &str = "unknown";

/// Extract the token from a raw query string.
///
/// Malformed percent-encoding never fails the request: the parser is lenient
/// and anything that cannot be read simply yields no token.
pub fn extract_token(query: Option<&str>) -> String {
    query
        .and_then(|q| {
            form_urlencoded::parse(q.as_bytes())
                .find(|(key, _)| key == TOKEN_PARAM)
                .map(|(_, value)| value.into_owned())
        })
        .unwrap_or_default()
}

/// Token as it should appear in logs
pub fn display_token(token: &str) -> &str {
    if token.is_empty() {
        UNKNOWN_TOKEN
    } else {
        token
    }
}

/// The secret accepted by the `/token` check route
#[derive(Clone)]
pub struct ExpectedToken {
    token: String,
}

impl ExpectedToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }

    pub fn matches(&self, token: &str) -> bool {
        // Constant-time comparison
        if token.len() != self.token.len() {
            return false;
        }

        let mut result = 0u8;
        for (a, b) in token.bytes().zip(self.token.bytes()) {
            result |= a ^ b;
        }
        result == 0
    }
}

impl fmt::Debug for ExpectedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExpectedToken([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_token_present() {
        assert_eq!(extract_token(Some("token=abc")), "abc");
        assert_eq!(extract_token(Some("foo=1&token=abc&bar=2")), "abc");
    }

    #[test]
    fn test_extract_token_percent_decoded() {
        assert_eq!(extract_token(Some("token=a%20b%2Bc")), "a b+c");
    }

    #[test]
    fn test_extract_token_missing() {
        assert_eq!(extract_token(None), "");
        assert_eq!(extract_token(Some("")), "");
        assert_eq!(extract_token(Some("other=1")), "");
        assert_eq!(extract_token(Some("token=")), "");
    }

    #[test]
    fn test_extract_token_malformed_query() {
        // Lenient parsing: broken escapes do not panic
        assert_eq!(extract_token(Some("token=%zz")), "%zz");
        assert_eq!(extract_token(Some("&&==&")), "");
    }

    #[test]
    fn test_display_token() {
        assert_eq!(display_token(""), "unknown");
        assert_eq!(display_token("abc"), "abc");
    }

    #[test]
    fn test_expected_token_matches() {
        let expected = ExpectedToken::new("token");
        assert!(expected.matches("token"));
        assert!(!expected.matches("wrong"));
        assert!(!expected.matches("token-extra"));
        assert!(!expected.matches(""));
    }

    #[test]
    fn test_expected_token_debug_redacted() {
        let expected = ExpectedToken::new("super-secret");
        assert_eq!(format!("{:?}", expected), "ExpectedToken([REDACTED])");
    }
}
