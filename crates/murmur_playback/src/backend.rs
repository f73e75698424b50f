//! The voice connection seen from the pipeline.

use async_trait::async_trait;
use murmur_voice::AudioResource;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("voice connection is not available")]
    NotConnected,
    #[error("playback failed: {0}")]
    Failed(String),
    #[error("playback finished without reporting an outcome")]
    Abandoned,
}

pub type PlaybackOutcome = Result<(), PlaybackError>;

/// A live voice connection for one server.
///
/// The pipeline does not own the connection: it may be torn down at any time
/// (kick, network loss), so workers call [`is_connected`](Self::is_connected)
/// before every item instead of trusting an earlier answer.
#[async_trait]
pub trait PlaybackBackend: Send + Sync {
    async fn is_connected(&self) -> bool;

    async fn is_playing(&self) -> bool;

    /// Start playing `resource`. The returned [`Completion`] resolves once the
    /// audio has finished or failed; the caller keeps `resource` alive until then.
    async fn play(&self, resource: &AudioResource) -> Result<Completion, PlaybackError>;

    async fn disconnect(&self) -> anyhow::Result<()>;
}

/// Backend side of the single-shot completion signal.
#[derive(Debug)]
pub struct CompletionNotifier {
    tx: oneshot::Sender<PlaybackOutcome>,
}

impl CompletionNotifier {
    /// Report how playback ended. Ignored if the waiting worker was cancelled.
    pub fn notify(self, outcome: PlaybackOutcome) {
        if self.tx.send(outcome).is_err() {
            tracing::trace!("Playback completion arrived after the worker stopped waiting");
        }
    }
}

/// Worker side of the completion signal. Resolves to
/// [`PlaybackError::Abandoned`] if the notifier is dropped without firing.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<PlaybackOutcome>,
}

impl Future for Completion {
    type Output = PlaybackOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(PlaybackError::Abandoned)))
    }
}

pub fn completion_channel() -> (CompletionNotifier, Completion) {
    let (tx, rx) = oneshot::channel();
    (CompletionNotifier { tx }, Completion { rx })
}
