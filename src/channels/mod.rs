//! Per-connection channels
//!
//! A channel is one promoted WebSocket connection. Its lifecycle is:
//!
//! - `Pending`: authorized, handshake in progress, not yet registered
//! - `Open`: registered and servicing messages
//! - `Closed`: terminal, after the transport closed or faulted
//!
//! There are no transitions out of `Closed`, and a channel only reaches
//! `Open` through registration, which happens after a positive verdict.

use crate::auth::display_token;
use crate::error::{GatewayError, Result};
use parking_lot::Mutex;
use std::fmt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

/// Lifecycle state of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Pending,
    Open,
    Closed,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelState::Pending => write!(f, "pending"),
            ChannelState::Open => write!(f, "open"),
            ChannelState::Closed => write!(f, "closed"),
        }
    }
}

/// Reply sent for every inbound text message
pub fn echo_reply(text: &str) -> String {
    format!("MESSAGE: You sent \"{}\"", text)
}

/// Decode a binary frame as UTF-8 text
pub fn decode_binary(data: &[u8]) -> Result<&str> {
    std::str::from_utf8(data).map_err(|e| GatewayError::MalformedMessage(e.to_string()))
}

/// An authenticated, bidirectional message channel
pub struct Channel {
    /// Unique channel ID
    id: Uuid,
    /// Token presented at upgrade time, kept for attribution only
    token: String,
    state: Mutex<ChannelState>,
    /// Outbound queue drained by the connection's writer task
    tx: mpsc::Sender<String>,
}

impl Channel {
    pub fn new(token: impl Into<String>, tx: mpsc::Sender<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            token: token.into(),
            state: Mutex::new(ChannelState::Pending),
            tx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Token as it should appear in logs
    pub fn display_token(&self) -> &str {
        display_token(&self.token)
    }

    pub fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// `Pending -> Open`. Returns false for any other starting state.
    pub fn open(&self) -> bool {
        let mut state = self.state.lock();
        if *state == ChannelState::Pending {
            *state = ChannelState::Open;
            true
        } else {
            false
        }
    }

    /// Transition to `Closed`. Returns true only for the first call.
    pub fn close(&self) -> bool {
        let mut state = self.state.lock();
        if *state == ChannelState::Closed {
            false
        } else {
            *state = ChannelState::Closed;
            true
        }
    }

    /// Queue a message, waiting for buffer space
    pub async fn send(&self, text: String) -> Result<()> {
        if self.state() == ChannelState::Closed {
            return Err(GatewayError::ChannelClosed);
        }
        self.tx.send(text).await.map_err(|_| GatewayError::ChannelClosed)
    }

    /// Queue a message without waiting
    pub fn try_send(&self, text: String) -> Result<()> {
        if self.state() == ChannelState::Closed {
            return Err(GatewayError::ChannelClosed);
        }
        self.tx.try_send(text).map_err(|e| match e {
            TrySendError::Full(_) => GatewayError::Transport("outbound buffer full".to_string()),
            TrySendError::Closed(_) => GatewayError::ChannelClosed,
        })
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("token", &self.display_token())
            .field("state", &self.state())
            .finish()
    }
}
