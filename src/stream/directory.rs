//! Channel membership lookups used to re-check broadcasts at delivery time.
//!
//! A notification stream can stay open for hours; membership is checked per
//! frame rather than once at connect, so a user removed from a channel stops
//! receiving its broadcasts without reconnecting.

use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::DashMap;

#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    /// Authoritative check, made before a broadcast is written to the stream.
    async fn is_member(&self, user_id: &str, channel_id: &str) -> bool;

    /// Non-blocking check run inside the bus listener, so broadcasts from
    /// channels the user is not in never take space in the stream buffer.
    /// Directories without a local view answer `true` and leave the decision
    /// to [`ChannelDirectory::is_member`].
    fn is_member_now(&self, _user_id: &str, _channel_id: &str) -> bool {
        true
    }
}

/// Every user belongs to every channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenDirectory;

#[async_trait]
impl ChannelDirectory for OpenDirectory {
    async fn is_member(&self, _user_id: &str, _channel_id: &str) -> bool {
        true
    }
}

/// Explicit channel rosters held in memory. Unknown channels have no members.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    channels: DashMap<String, HashSet<String>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, channel_id: &str, user_id: &str) {
        self.channels
            .entry(channel_id.to_string())
            .or_default()
            .insert(user_id.to_string());
    }

    /// Returns `false` if the user was not a member.
    pub fn leave(&self, channel_id: &str, user_id: &str) -> bool {
        match self.channels.get_mut(channel_id) {
            Some(mut members) => members.remove(user_id),
            None => false,
        }
    }
}

#[async_trait]
impl ChannelDirectory for InMemoryDirectory {
    async fn is_member(&self, user_id: &str, channel_id: &str) -> bool {
        self.is_member_now(user_id, channel_id)
    }

    fn is_member_now(&self, user_id: &str, channel_id: &str) -> bool {
        self.channels
            .get(channel_id)
            .map(|members| members.contains(user_id))
            .unwrap_or(false)
    }
}
