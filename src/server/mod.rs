//! Gateway server implementation
//!
//! Handles WebSocket upgrades, channel lifecycle and periodic broadcast.

mod broadcast;
mod connections;
pub mod gateway;
pub mod websocket;

pub use broadcast::{Broadcaster, BROADCAST_PAYLOAD, BROADCAST_PERIOD};
pub use connections::ChannelRegistry;
pub use gateway::{GatewayConfig, GatewayServer, DEFAULT_AUTH_TIMEOUT, DEFAULT_PORT};
pub use websocket::{authorize, create_router, reject, GatewayState, TOKEN_CHECK_PATH, UPGRADE_PATH};
