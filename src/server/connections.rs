//! Registry of open channels

use crate::channels::Channel;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Concurrency-safe set of open channels
///
/// Membership is added when a channel opens and removed when it closes.
/// Readers take a snapshot, so a channel closing mid-iteration never
/// blocks registration or corrupts the set.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    channels: Arc<DashMap<Uuid, Arc<Channel>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a pending channel and add it.
    ///
    /// Returns false (and leaves the registry untouched) unless the channel
    /// was `Pending`.
    pub fn register(&self, channel: Arc<Channel>) -> bool {
        if !channel.open() {
            return false;
        }
        self.channels.insert(channel.id(), channel);
        true
    }

    /// Remove a channel. Returns true only for the call that removed it.
    pub fn remove(&self, id: Uuid) -> bool {
        self.channels.remove(&id).is_some()
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<Channel>> {
        self.channels.get(&id).map(|r| r.clone())
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.channels.contains_key(&id)
    }

    /// Point-in-time copy of all registered channels
    pub fn snapshot(&self) -> Vec<Arc<Channel>> {
        self.channels.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
