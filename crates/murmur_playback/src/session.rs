//! One server's queue and the worker that drains it.

use crate::backend::{PlaybackBackend, PlaybackError};
use murmur_core::speed::needs_adjustment;
use murmur_core::{MurmurConfig, ServerId, SpeedSetting};
use murmur_voice::{AudioPostProcessor, AudioResource, SpeechSynthesizer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Settings every session worker runs with.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Language tag handed to the synthesizer.
    pub language: String,
    /// Interval between "still playing?" checks while the backend is busy.
    /// Bounds the gap between two items; spoken-word pacing tolerates it.
    pub poll_interval: Duration,
    /// How long teardown waits for a cancelled worker before aborting it.
    pub shutdown_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            language: "th".to_string(),
            poll_interval: Duration::from_millis(500),
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

impl SessionConfig {
    pub fn from_config(config: &MurmurConfig) -> Self {
        Self {
            language: config.tts.language.clone(),
            poll_interval: Duration::from_millis(config.playback.poll_interval_ms),
            shutdown_grace: Duration::from_millis(config.playback.shutdown_grace_ms),
        }
    }
}

/// External services shared by all workers.
#[derive(Clone)]
pub struct PipelineDeps {
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub post_processor: Arc<dyn AudioPostProcessor>,
    pub speed: Arc<SpeedSetting>,
}

/// How a dequeued item ended. Every variant lets the worker move on.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Played { speed_adjusted: bool },
    /// The voice connection was gone when the item came up.
    SkippedNotConnected,
    SynthesisFailed(String),
    PlaybackFailed(PlaybackError),
}

/// Registry-side handle to a running session.
pub(crate) struct Session {
    server: ServerId,
    queue: mpsc::UnboundedSender<String>,
    pending: Arc<AtomicUsize>,
    shutdown: watch::Sender<bool>,
    worker: JoinHandle<()>,
}

impl Session {
    /// Create an empty queue and spawn its one worker.
    pub(crate) fn start(
        server: ServerId,
        backend: Arc<dyn PlaybackBackend>,
        deps: PipelineDeps,
        config: SessionConfig,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let pending = Arc::new(AtomicUsize::new(0));

        let worker = Worker {
            server,
            queue: queue_rx,
            pending: Arc::clone(&pending),
            backend,
            deps,
            config,
        };
        let handle = tokio::spawn(worker.run(shutdown_rx));

        Self {
            server,
            queue: queue_tx,
            pending,
            shutdown: shutdown_tx,
            worker: handle,
        }
    }

    /// Append to the queue. `false` if the worker is no longer running.
    pub(crate) fn push(&self, text: String) -> bool {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.queue.send(text).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        true
    }

    /// Items queued but not yet picked up by the worker.
    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Cancel the worker and wait for it to exit. Pending items are discarded.
    pub(crate) async fn stop(self, grace: Duration) {
        let Session {
            server,
            queue,
            shutdown,
            mut worker,
            ..
        } = self;

        let _ = shutdown.send(true);
        drop(queue);

        match tokio::time::timeout(grace, &mut worker).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_panic() => {
                tracing::error!(server = %server, "Audio worker panicked: {}", e)
            }
            Ok(Err(_)) => {}
            Err(_) => {
                tracing::warn!(server = %server, "Audio worker ignored cancellation, aborting");
                worker.abort();
            }
        }
    }
}

struct Worker {
    server: ServerId,
    queue: mpsc::UnboundedReceiver<String>,
    pending: Arc<AtomicUsize>,
    backend: Arc<dyn PlaybackBackend>,
    deps: PipelineDeps,
    config: SessionConfig,
}

impl Worker {
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(server = %self.server, "Audio worker started");

        loop {
            let text = tokio::select! {
                biased;
                _ = cancelled(&mut shutdown) => break,
                next = self.queue.recv() => match next {
                    Some(text) => text,
                    None => break,
                },
            };
            self.pending.fetch_sub(1, Ordering::SeqCst);
            tracing::info!(server = %self.server, "Dequeued for speech: {:?}", text);

            // Anything produced for this item is dropped (and so released)
            // if cancellation wins the race.
            let outcome = tokio::select! {
                biased;
                _ = cancelled(&mut shutdown) => {
                    tracing::info!(server = %self.server, "Cancelled with an item in flight");
                    break;
                }
                outcome = self.process(&text) => outcome,
            };
            self.report(&outcome);
        }

        tracing::info!(server = %self.server, "Audio worker stopped");
    }

    async fn process(&self, text: &str) -> ItemOutcome {
        if !self.backend.is_connected().await {
            return ItemOutcome::SkippedNotConnected;
        }
        if !self.wait_until_idle().await {
            return ItemOutcome::SkippedNotConnected;
        }

        let original = match self
            .deps
            .synthesizer
            .synthesize(text, &self.config.language)
            .await
        {
            Ok(resource) => resource,
            Err(e) => return ItemOutcome::SynthesisFailed(format!("{:#}", e)),
        };

        // Read once per item: a speed change applies from the next item on
        let speed = self.deps.speed.get();
        let adjusted = if needs_adjustment(speed) {
            match self.deps.post_processor.adjust_speed(&original, speed).await {
                Ok(resource) => Some(resource),
                Err(e) => {
                    tracing::warn!(
                        server = %self.server,
                        "Speed adjustment to {}x failed, playing at normal speed: {:#}",
                        speed,
                        e
                    );
                    None
                }
            }
        } else {
            None
        };

        let source = adjusted.as_ref().unwrap_or(&original);
        let outcome = match self.backend.play(source).await {
            Ok(completion) => match completion.await {
                Ok(()) => ItemOutcome::Played {
                    speed_adjusted: adjusted.is_some(),
                },
                Err(e) => ItemOutcome::PlaybackFailed(e),
            },
            Err(e) => ItemOutcome::PlaybackFailed(e),
        };

        self.release(original);
        if let Some(resource) = adjusted {
            self.release(resource);
        }
        outcome
    }

    /// Poll until the backend is idle. `false` if the connection went away meanwhile.
    async fn wait_until_idle(&self) -> bool {
        while self.backend.is_playing().await {
            tokio::time::sleep(self.config.poll_interval).await;
            if !self.backend.is_connected().await {
                return false;
            }
        }
        true
    }

    fn release(&self, resource: AudioResource) {
        let path = resource.path().to_path_buf();
        if let Err(e) = resource.release() {
            tracing::error!(server = %self.server, "Failed to remove {}: {}", path.display(), e);
        }
    }

    fn report(&self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Played { speed_adjusted } => tracing::info!(
                server = %self.server,
                speed_adjusted,
                "Finished playing and cleaned up audio"
            ),
            ItemOutcome::SkippedNotConnected => tracing::warn!(
                server = %self.server,
                "Voice connection unavailable, dropped item"
            ),
            ItemOutcome::SynthesisFailed(e) => {
                tracing::error!(server = %self.server, "Speech synthesis failed: {}", e)
            }
            ItemOutcome::PlaybackFailed(e) => {
                tracing::error!(server = %self.server, "Player error: {}", e)
            }
        }
    }
}

/// Resolves once cancellation is requested or the session handle is gone.
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
