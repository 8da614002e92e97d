//! Periodic broadcast to every open channel

use crate::server::connections::ChannelRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// Literal payload pushed on every tick
pub const BROADCAST_PAYLOAD: &str = "BROADCAST";

/// Default tick period
pub const BROADCAST_PERIOD: Duration = Duration::from_millis(4000);

/// Pushes a fixed payload to every registered channel on a timer
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ChannelRegistry>,
    payload: String,
    period: Duration,
}

impl Broadcaster {
    pub fn new(registry: Arc<ChannelRegistry>, payload: impl Into<String>, period: Duration) -> Self {
        Self {
            registry,
            payload: payload.into(),
            period,
        }
    }

    /// Send the payload to every open channel, returning how many accepted it.
    ///
    /// Works on a registry snapshot so no lock is held while sending. Send
    /// failures (closed or saturated channels) are skipped; removal is left
    /// to the channel's own close path.
    pub fn broadcast_once(&self) -> usize {
        let channels = self.registry.snapshot();
        let mut delivered = 0;

        for channel in &channels {
            match channel.try_send(self.payload.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!(
                        channel_id = %channel.id(),
                        token = channel.display_token(),
                        error = %e,
                        "Broadcast skipped channel"
                    );
                }
            }
        }

        debug!(targets = channels.len(), delivered, "Broadcast tick");
        delivered
    }

    /// Run the timer loop forever. The first tick fires one period after start.
    pub async fn run(self) {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.broadcast_once();
        }
    }

    /// Spawn the timer loop on the runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
