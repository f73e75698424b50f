//! Temporary audio files and their release rules.

use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Encodings produced by the synthesizer and post-processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioFormat {
    #[default]
    Mp3,
    Wav,
    OggOpus,
}

impl AudioFormat {
    /// Get the MIME type for this format
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
            Self::Wav => "audio/wav",
            Self::OggOpus => "audio/ogg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::OggOpus => "ogg",
        }
    }
}

/// A fresh, unique file name for synthesized audio inside `dir`.
pub fn temp_audio_path(dir: &Path, format: AudioFormat) -> PathBuf {
    dir.join(format!(
        "murmur_{}.{}",
        Uuid::new_v4().simple(),
        format.extension()
    ))
}

/// One temporary audio file, owned by the queue item being processed.
///
/// The file is removed exactly once: either by [`AudioResource::release`],
/// which consumes the value, or on drop if it was never released (for
/// example when the worker processing it is cancelled).
#[derive(Debug)]
pub struct AudioResource {
    path: PathBuf,
    format: AudioFormat,
    armed: bool,
}

impl AudioResource {
    /// Take ownership of a temporary file. It does not need to exist yet.
    pub fn temporary(path: impl Into<PathBuf>, format: AudioFormat) -> Self {
        Self {
            path: path.into(),
            format,
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Path next to this file with `suffix` appended to the stem,
    /// e.g. `a.mp3` → `a_speed_adjusted.mp3`.
    pub fn sibling(&self, suffix: &str) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.path.with_file_name(format!(
            "{}{}.{}",
            stem,
            suffix,
            self.format.extension()
        ))
    }

    /// Delete the file. A file that is already gone is not an error.
    pub fn release(mut self) -> io::Result<()> {
        self.armed = false;
        remove_if_present(&self.path)
    }
}

impl Drop for AudioResource {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match remove_if_present(&self.path) {
            Ok(()) => tracing::debug!("Released unplayed audio {}", self.path.display()),
            Err(e) => tracing::warn!("Failed to remove {}: {}", self.path.display(), e),
        }
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
