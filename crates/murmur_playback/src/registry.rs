//! Process-wide table of playback sessions, one per server.

use crate::backend::PlaybackBackend;
use crate::session::{PipelineDeps, Session, SessionConfig};
use murmur_core::{ChannelId, ReadPolicy, ServerId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Where a piece of text came from. Decides whether the read policy applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A regular chat message; spoken only if the server's read policy
    /// allows its channel.
    Chat { channel: ChannelId },
    /// An answer to a bot command (AI or scripted). Always spoken, whatever
    /// channel the command was issued from.
    CommandReply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// No session for the server; nothing to speak through.
    NoSession,
    /// Rejected by the server's read policy.
    Filtered,
    /// Whitespace only; there is nothing to say.
    Blank,
}

/// Owns every live session.
///
/// `lifecycle` serializes create/destroy/shutdown and is held while a
/// cancelled worker winds down. `sessions` is only held for map access, so
/// enqueues for other servers never wait on a teardown.
pub struct SessionRegistry {
    lifecycle: Mutex<()>,
    sessions: Mutex<HashMap<ServerId, Session>>,
    deps: PipelineDeps,
    config: SessionConfig,
    policy: Arc<ReadPolicy>,
}

impl SessionRegistry {
    pub fn new(deps: PipelineDeps, config: SessionConfig, policy: Arc<ReadPolicy>) -> Self {
        Self {
            lifecycle: Mutex::new(()),
            sessions: Mutex::new(HashMap::new()),
            deps,
            config,
            policy,
        }
    }

    pub fn policy(&self) -> &Arc<ReadPolicy> {
        &self.policy
    }

    /// Start a fresh session bound to `backend`. Any existing session for the
    /// server is cancelled and its queue discarded before the new worker starts.
    pub async fn create_session(&self, server: ServerId, backend: Arc<dyn PlaybackBackend>) {
        let _lifecycle = self.lifecycle.lock().await;
        let previous = self.sessions.lock().await.remove(&server);
        if let Some(previous) = previous {
            tracing::info!(server = %server, "Replacing existing playback session");
            previous.stop(self.config.shutdown_grace).await;
        }
        let session = Session::start(server, backend, self.deps.clone(), self.config.clone());
        self.sessions.lock().await.insert(server, session);
        tracing::info!(server = %server, "Playback session created");
    }

    /// Cancel the worker and drop the queue. Returns `false` if there was no session.
    pub async fn destroy_session(&self, server: ServerId) -> bool {
        let _lifecycle = self.lifecycle.lock().await;
        let Some(session) = self.sessions.lock().await.remove(&server) else {
            return false;
        };
        let discarded = session.pending();
        session.stop(self.config.shutdown_grace).await;
        tracing::info!(
            server = %server,
            discarded,
            "Playback session destroyed"
        );
        true
    }

    /// Queue `text` for speech in `server`.
    pub async fn enqueue(&self, server: ServerId, text: &str, origin: Origin) -> EnqueueOutcome {
        if text.trim().is_empty() {
            return EnqueueOutcome::Blank;
        }
        if let Origin::Chat { channel } = origin {
            if !self.policy.allows(server, channel).await {
                return EnqueueOutcome::Filtered;
            }
        }

        // Lookup and push under one guard; text never lands in a session
        // that replaced the one it was checked against.
        let sessions = self.sessions.lock().await;
        let Some(session) = sessions.get(&server) else {
            return EnqueueOutcome::NoSession;
        };
        if !session.push(text.to_string()) {
            return EnqueueOutcome::NoSession;
        }
        tracing::debug!(server = %server, "Queued text for speech");
        EnqueueOutcome::Queued
    }

    pub async fn has_session(&self, server: ServerId) -> bool {
        self.sessions.lock().await.contains_key(&server)
    }

    /// Items waiting in a server's queue, or `None` without a session.
    pub async fn pending(&self, server: ServerId) -> Option<usize> {
        self.sessions.lock().await.get(&server).map(Session::pending)
    }

    pub async fn active_servers(&self) -> Vec<ServerId> {
        let mut servers: Vec<ServerId> = self.sessions.lock().await.keys().copied().collect();
        servers.sort();
        servers
    }

    /// Tear down every session (process shutdown).
    pub async fn shutdown_all(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        let drained: Vec<Session> = {
            let mut sessions = self.sessions.lock().await;
            sessions.drain().map(|(_, s)| s).collect()
        };
        let count = drained.len();
        for session in drained {
            session.stop(self.config.shutdown_grace).await;
        }
        if count > 0 {
            tracing::info!("Stopped {} playback session(s)", count);
        }
    }
}
