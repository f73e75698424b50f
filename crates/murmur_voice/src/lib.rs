//! Voice module for murmur
//!
//! Turns text into temporary audio files: speech synthesis, speed
//! post-processing, and the file ownership rules both rely on.

mod postprocess;
mod resource;
mod tts;

pub use postprocess::{AudioPostProcessor, FfmpegSpeed};
pub use resource::{temp_audio_path, AudioFormat, AudioResource};
pub use tts::{split_text, GoogleTts, SpeechSynthesizer, MAX_CHUNK_CHARS};
