//! Token authorization against an external check service

use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use url::{Host, Url};

use super::tokens::{display_token, TOKEN_PARAM};

/// Converts a token into an authorization verdict
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Check a token. `Ok(false)` is an explicit denial; `Err` means the
    /// verdict could not be obtained and must be treated as a denial.
    async fn check_token(&self, token: &str) -> Result<bool>;
}

/// Interpret a check-service response body.
///
/// Only a body whose decimal value is exactly 1 authorizes. Anything else,
/// including non-numeric bodies, is a denial.
pub fn parse_verdict(body: &str) -> bool {
    body.trim().parse::<i64>().map(|v| v == 1).unwrap_or(false)
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        None => false,
    }
}

/// Authorizer that issues `GET <endpoint>?token=<token>` per check
#[derive(Debug, Clone)]
pub struct HttpAuthorizer {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpAuthorizer {
    /// Create an authorizer for the given endpoint with a bounded request timeout
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(timeout);
        // Loopback checks never go through an environment proxy
        if is_loopback(&endpoint) {
            builder = builder.no_proxy();
        }

        let client = builder
            .build()
            .map_err(|e| GatewayError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, endpoint })
    }

    /// Parse the endpoint from a string
    pub fn from_url(endpoint: &str, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| GatewayError::Config(format!("invalid authorization URL '{}': {}", endpoint, e)))?;
        Self::new(endpoint, timeout)
    }

    fn request_url(&self, token: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair(TOKEN_PARAM, token);
        url
    }
}

#[async_trait]
impl Authorizer for HttpAuthorizer {
    async fn check_token(&self, token: &str) -> Result<bool> {
        let response = self
            .client
            .get(self.request_url(token))
            .send()
            .await
            .map_err(|e| GatewayError::AuthorizationUnavailable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::AuthorizationUnavailable(e.to_string()))?;

        // The status is informational only; the body carries the verdict
        let verdict = parse_verdict(&body);
        debug!(token = display_token(token), status = %status, verdict, "Authorization check completed");

        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_verdict() {
        assert!(parse_verdict("1"));
        assert!(parse_verdict(" 1\n"));
        assert!(!parse_verdict("0"));
        assert!(!parse_verdict("2"));
        assert!(!parse_verdict("-1"));
        assert!(!parse_verdict(""));
        assert!(!parse_verdict("yes"));
        assert!(!parse_verdict("1.0"));
    }

    #[test]
    fn test_request_url_encodes_token() {
        let auth = HttpAuthorizer::from_url("http://localhost:3000/token", Duration::from_secs(1)).unwrap();
        let url = auth.request_url("a b&c");
        assert_eq!(url.as_str(), "http://localhost:3000/token?token=a+b%26c");
    }

    #[test]
    fn test_is_loopback() {
        assert!(is_loopback(&Url::parse("http://127.0.0.1:3000/token").unwrap()));
        assert!(is_loopback(&Url::parse("http://localhost/token").unwrap()));
        assert!(is_loopback(&Url::parse("http://[::1]:3000/token").unwrap()));
        assert!(!is_loopback(&Url::parse("https://auth.example.com/token").unwrap()));
    }

    #[test]
    fn test_invalid_endpoint() {
        let result = HttpAuthorizer::from_url("not a url", Duration::from_secs(1));
        assert!(matches!(result, Err(GatewayError::Config(_))));
    }

    #[tokio::test]
    async fn test_check_token_authorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .and(query_param("token", "token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("1"))
            .mount(&server)
            .await;

        let auth = HttpAuthorizer::from_url(&format!("{}/token", server.uri()), Duration::from_secs(2)).unwrap();
        assert!(auth.check_token("token").await.unwrap());
    }

    #[tokio::test]
    async fn test_check_token_denied_with_400() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("0"))
            .mount(&server)
            .await;

        let auth = HttpAuthorizer::from_url(&format!("{}/token", server.uri()), Duration::from_secs(2)).unwrap();
        assert!(!auth.check_token("wrong").await.unwrap());
    }

    #[tokio::test]
    async fn test_check_token_non_numeric_body_is_denial() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let auth = HttpAuthorizer::from_url(&format!("{}/token", server.uri()), Duration::from_secs(2)).unwrap();
        assert!(!auth.check_token("token").await.unwrap());
    }

    #[tokio::test]
    async fn test_check_token_timeout_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("1")
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let auth = HttpAuthorizer::from_url(&format!("{}/token", server.uri()), Duration::from_millis(200)).unwrap();
        let result = auth.check_token("token").await;
        assert!(matches!(result, Err(GatewayError::AuthorizationUnavailable(_))));
    }

    #[tokio::test]
    async fn test_check_token_unreachable_is_unavailable() {
        // Bind then drop a listener to get a port with nothing behind it
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let auth = HttpAuthorizer::from_url(&format!("http://{}/token", addr), Duration::from_secs(1)).unwrap();
        let result = auth.check_token("token").await;
        assert!(matches!(result, Err(GatewayError::AuthorizationUnavailable(_))));
    }
}
