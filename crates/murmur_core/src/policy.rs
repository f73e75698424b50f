//! Which text channels get read aloud in each server.
//!
//! Every server starts in restricted mode: only the designated channel (the
//! one the join command was issued from) is spoken. Server owners can switch
//! a server to read every channel instead.

use crate::{ChannelId, ServerId};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Read messages from every text channel in the server.
    All,
    /// Read only the designated channel. `None` until a join command sets it.
    Restricted { designated: Option<ChannelId> },
}

#[derive(Debug, Clone, Copy, Default)]
struct ServerPolicy {
    read_all: bool,
    designated: Option<ChannelId>,
}

#[derive(Debug, Default)]
pub struct ReadPolicy {
    servers: RwLock<HashMap<ServerId, ServerPolicy>>,
}

impl ReadPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a newly seen server into restricted mode. Known servers are left alone.
    pub async fn register_server(&self, server: ServerId) {
        let mut servers = self.servers.write().await;
        if !servers.contains_key(&server) {
            servers.insert(server, ServerPolicy::default());
            tracing::info!(server = %server, "Server registered in restricted read mode");
        }
    }

    pub async fn designate(&self, server: ServerId, channel: ChannelId) {
        self.servers.write().await.entry(server).or_default().designated = Some(channel);
        tracing::info!(server = %server, channel = %channel, "Designated text channel set");
    }

    pub async fn clear_designated(&self, server: ServerId) {
        if let Some(policy) = self.servers.write().await.get_mut(&server) {
            if policy.designated.take().is_some() {
                tracing::info!(server = %server, "Designated text channel cleared");
            }
        }
    }

    /// Switch to reading every channel. Returns `false` if already in that mode.
    pub async fn enable_read_all(&self, server: ServerId) -> bool {
        let mut servers = self.servers.write().await;
        let policy = servers.entry(server).or_default();
        if policy.read_all {
            return false;
        }
        policy.read_all = true;
        tracing::info!(server = %server, "Switched to read-all-channels mode");
        true
    }

    /// Switch back to restricted mode. If no channel is designated yet,
    /// `current` becomes the designated channel. Returns `false` if already restricted.
    pub async fn restrict(&self, server: ServerId, current: ChannelId) -> bool {
        let mut servers = self.servers.write().await;
        let policy = servers.entry(server).or_default();
        if !policy.read_all {
            return false;
        }
        policy.read_all = false;
        if policy.designated.is_none() {
            policy.designated = Some(current);
            tracing::info!(server = %server, channel = %current, "Designated text channel set");
        }
        tracing::info!(server = %server, "Switched to restricted-channels mode");
        true
    }

    pub async fn mode(&self, server: ServerId) -> ReadMode {
        let policy = self
            .servers
            .read()
            .await
            .get(&server)
            .copied()
            .unwrap_or_default();
        if policy.read_all {
            ReadMode::All
        } else {
            ReadMode::Restricted {
                designated: policy.designated,
            }
        }
    }

    /// Whether a chat message posted in `channel` should be spoken.
    pub async fn allows(&self, server: ServerId, channel: ChannelId) -> bool {
        match self.mode(server).await {
            ReadMode::All => true,
            ReadMode::Restricted { designated } => designated == Some(channel),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const S: ServerId = ServerId(10);
    const GENERAL: ChannelId = ChannelId(1);
    const MEMES: ChannelId = ChannelId(2);

    #[tokio::test]
    async fn test_unknown_server_is_restricted_without_channel() {
        let policy = ReadPolicy::new();
        assert_eq!(
            policy.mode(S).await,
            ReadMode::Restricted { designated: None }
        );
        assert!(!policy.allows(S, GENERAL).await);
    }

    #[tokio::test]
    async fn test_designated_channel_only() {
        let policy = ReadPolicy::new();
        policy.register_server(S).await;
        policy.designate(S, GENERAL).await;
        assert!(policy.allows(S, GENERAL).await);
        assert!(!policy.allows(S, MEMES).await);

        policy.clear_designated(S).await;
        assert!(!policy.allows(S, GENERAL).await);
    }

    #[tokio::test]
    async fn test_read_all_toggle() {
        let policy = ReadPolicy::new();
        assert!(policy.enable_read_all(S).await);
        assert!(!policy.enable_read_all(S).await);
        assert_eq!(policy.mode(S).await, ReadMode::All);
        assert!(policy.allows(S, MEMES).await);

        // Restricting designates the channel the command came from
        assert!(policy.restrict(S, MEMES).await);
        assert!(!policy.restrict(S, GENERAL).await);
        assert_eq!(
            policy.mode(S).await,
            ReadMode::Restricted {
                designated: Some(MEMES)
            }
        );
    }

    #[tokio::test]
    async fn test_restrict_keeps_existing_designation() {
        let policy = ReadPolicy::new();
        policy.designate(S, GENERAL).await;
        policy.enable_read_all(S).await;
        policy.restrict(S, MEMES).await;
        assert!(policy.allows(S, GENERAL).await);
        assert!(!policy.allows(S, MEMES).await);
    }

    #[tokio::test]
    async fn test_register_does_not_reset_known_server() {
        let policy = ReadPolicy::new();
        policy.enable_read_all(S).await;
        policy.register_server(S).await;
        assert_eq!(policy.mode(S).await, ReadMode::All);
    }
}
