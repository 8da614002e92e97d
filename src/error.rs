//! Error types for the gateway

use axum::http::StatusCode;
use thiserror::Error;

/// Errors raised while authorizing, upgrading or servicing a channel
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The authorization service could not be reached or timed out
    #[error("authorization unavailable: {0}")]
    AuthorizationUnavailable(String),

    /// The authorization service returned a negative verdict
    #[error("authorization denied")]
    AuthorizationDenied,

    /// An inbound frame could not be decoded as text
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Socket fault on an established channel
    #[error("transport error: {0}")]
    Transport(String),

    /// Upgrade request aimed at an unrecognized path
    #[error("route not found: {0}")]
    RouteNotFound(String),

    /// Send attempted on a channel that has already closed
    #[error("channel closed")]
    ChannelClosed,

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// HTTP status used when this error rejects an upgrade request
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::AuthorizationUnavailable(_) | GatewayError::AuthorizationDenied => {
                StatusCode::UNAUTHORIZED
            }
            GatewayError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Plain-text body sent with the rejection
    pub fn rejection_body(&self) -> &'static str {
        match self {
            GatewayError::AuthorizationUnavailable(_) | GatewayError::AuthorizationDenied => {
                "Unauthorized"
            }
            GatewayError::RouteNotFound(_) => "Not Found",
            _ => "Internal Server Error",
        }
    }
}

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
