//! Speech playback pipeline
//!
//! One [`SessionRegistry`] per process maps each server to at most one
//! session. A session is a FIFO queue of text plus a single worker task that
//! synthesizes, re-times, and plays each item through the server's
//! [`PlaybackBackend`], strictly one at a time.

mod backend;
mod registry;
mod session;

pub use backend::{
    completion_channel, Completion, CompletionNotifier, PlaybackBackend, PlaybackError,
    PlaybackOutcome,
};
pub use registry::{EnqueueOutcome, Origin, SessionRegistry};
pub use session::{ItemOutcome, PipelineDeps, SessionConfig};
