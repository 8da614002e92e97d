//! Gateway server: configuration, listener and lifecycle

use crate::auth::{Authorizer, ExpectedToken, HttpAuthorizer};
use crate::error::{GatewayError, Result};
use crate::server::broadcast::{Broadcaster, BROADCAST_PAYLOAD, BROADCAST_PERIOD};
use crate::server::connections::ChannelRegistry;
use crate::server::websocket::{create_router, GatewayState, TOKEN_CHECK_PATH};

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

/// Default listening port
pub const DEFAULT_PORT: u16 = 3000;

/// Default upper bound on a single authorization check
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Gateway server configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,
    /// External check endpoint. `None` means the loopback `/token` route.
    pub auth_url: Option<String>,
    /// Upper bound on one authorization check
    pub auth_timeout: Duration,
    /// Broadcast tick period
    pub broadcast_period: Duration,
    /// Payload pushed on every tick
    pub broadcast_payload: String,
    /// Secret for the built-in `/token` route; `None` disables the route
    pub expected_token: Option<ExpectedToken>,
    /// Per-channel outbound queue capacity
    pub outbound_buffer: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            auth_url: None,
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            broadcast_period: BROADCAST_PERIOD,
            broadcast_payload: BROADCAST_PAYLOAD.to_string(),
            expected_token: Some(ExpectedToken::new("token")),
            outbound_buffer: 100,
        }
    }
}

impl GatewayConfig {
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = Some(url.into());
        self
    }

    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    pub fn broadcast_period(mut self, period: Duration) -> Self {
        self.broadcast_period = period;
        self
    }

    pub fn expected_token(mut self, token: Option<ExpectedToken>) -> Self {
        self.expected_token = token;
        self
    }

    /// Authorization URL for a server listening on `local_addr`.
    ///
    /// Without an explicit URL this is the server's own check route, reached
    /// through the bound IP or the matching loopback address for a wildcard.
    pub fn resolve_auth_url(&self, local_addr: SocketAddr) -> String {
        if let Some(url) = &self.auth_url {
            return url.clone();
        }

        let ip = match local_addr.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };
        // SocketAddr's Display brackets IPv6 hosts
        format!("http://{}{}", SocketAddr::new(ip, local_addr.port()), TOKEN_CHECK_PATH)
    }
}

/// The gateway: owns the registry, authorizer and broadcaster
pub struct GatewayServer {
    config: GatewayConfig,
    registry: Arc<ChannelRegistry>,
    authorizer: Option<Arc<dyn Authorizer>>,
}

impl GatewayServer {
    /// Create a server that authorizes through `config.auth_url` (or the
    /// loopback check route when unset)
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            registry: Arc::new(ChannelRegistry::new()),
            authorizer: None,
        }
    }

    /// Create a server with an injected authorizer
    pub fn with_authorizer(config: GatewayConfig, authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            config,
            registry: Arc::new(ChannelRegistry::new()),
            authorizer: Some(authorizer),
        }
    }

    pub fn registry(&self) -> Arc<ChannelRegistry> {
        self.registry.clone()
    }

    /// Bind the configured address and run until `shutdown` resolves
    pub async fn run(&self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        if self.config.broadcast_period.is_zero() {
            return Err(GatewayError::Config("broadcast period must be greater than zero".to_string()));
        }
        if self.authorizer.is_none() && self.config.auth_url.is_none() && self.config.expected_token.is_none() {
            return Err(GatewayError::Config(
                "no authorization URL configured and the token check route is disabled".to_string(),
            ));
        }

        let local_addr = listener.local_addr()?;

        let authorizer: Arc<dyn Authorizer> = match &self.authorizer {
            Some(authorizer) => authorizer.clone(),
            None => {
                let url = self.config.resolve_auth_url(local_addr);
                info!(url = %url, "Using HTTP authorizer");
                Arc::new(HttpAuthorizer::from_url(&url, self.config.auth_timeout)?)
            }
        };

        let state = GatewayState {
            registry: self.registry.clone(),
            authorizer,
            expected_token: self.config.expected_token.clone(),
            auth_timeout: self.config.auth_timeout,
            outbound_buffer: self.config.outbound_buffer,
        };

        let broadcast_task = Broadcaster::new(
            self.registry.clone(),
            self.config.broadcast_payload.clone(),
            self.config.broadcast_period,
        )
        .spawn();

        info!(addr = %local_addr, "Gateway listening");

        let result = axum::serve(listener, create_router(state))
            .with_graceful_shutdown(shutdown)
            .await;

        broadcast_task.abort();
        info!("Gateway stopped");

        result.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.broadcast_period, Duration::from_millis(4000));
        assert_eq!(config.broadcast_payload, "BROADCAST");
        assert!(config.expected_token.as_ref().unwrap().matches("token"));
    }

    #[tokio::test]
    async fn test_zero_broadcast_period_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = GatewayServer::new(GatewayConfig::default().broadcast_period(Duration::ZERO));

        let result = server.serve(listener, std::future::pending()).await;
        assert!(matches!(result, Err(GatewayError::Config(_))));
    }

    #[test]
    fn test_resolve_auth_url() {
        let addr: SocketAddr = "0.0.0.0:3123".parse().unwrap();

        let config = GatewayConfig::default();
        assert_eq!(config.resolve_auth_url(addr), "http://127.0.0.1:3123/token");

        let config = GatewayConfig::default().auth_url("http://auth.internal/check");
        assert_eq!(config.resolve_auth_url(addr), "http://auth.internal/check");
    }

    #[test]
    fn test_resolve_auth_url_follows_bound_ip() {
        let config = GatewayConfig::default();

        let specific: SocketAddr = "10.1.2.3:3000".parse().unwrap();
        assert_eq!(config.resolve_auth_url(specific), "http://10.1.2.3:3000/token");

        let v6_loopback: SocketAddr = "[::1]:3000".parse().unwrap();
        assert_eq!(config.resolve_auth_url(v6_loopback), "http://[::1]:3000/token");

        let v6_wildcard: SocketAddr = "[::]:3000".parse().unwrap();
        assert_eq!(config.resolve_auth_url(v6_wildcard), "http://[::1]:3000/token");

        let v6_specific: SocketAddr = "[fd00::5]:3000".parse().unwrap();
        assert_eq!(config.resolve_auth_url(v6_specific), "http://[fd00::5]:3000/token");
    }

    #[tokio::test]
    async fn test_no_authorization_source_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = GatewayServer::new(GatewayConfig::default().expected_token(None));

        let result = server.serve(listener, std::future::pending()).await;
        assert!(matches!(result, Err(GatewayError::Config(_))));
    }

    #[tokio::test]
    async fn test_injected_authorizer_needs_no_check_route() {
        struct AllowAll;

        #[async_trait::async_trait]
        impl Authorizer for AllowAll {
            async fn check_token(&self, _token: &str) -> Result<bool> {
                Ok(true)
            }
        }

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = GatewayServer::with_authorizer(GatewayConfig::default().expected_token(None), Arc::new(AllowAll));

        // Serves until shutdown instead of failing validation
        let result = server.serve(listener, async {}).await;
        assert!(result.is_ok());
    }
}
