//! wsgate - token-authenticated WebSocket gateway
//!
//! Accepts WebSocket upgrades on `/`, checks the `token` query parameter
//! against an authorization service, echoes inbound messages and pushes a
//! periodic broadcast to every open channel.

pub mod auth;
pub mod channels;
pub mod error;
pub mod server;

pub use auth::{Authorizer, ExpectedToken, HttpAuthorizer};
pub use channels::{Channel, ChannelState};
pub use error::{GatewayError, Result};
pub use server::{Broadcaster, ChannelRegistry, GatewayConfig, GatewayServer};
