//! Speed adjustment of synthesized audio

use crate::resource::AudioResource;
use anyhow::{Context, Result};
use async_trait::async_trait;
use murmur_core::speed::validate_speed;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

/// Re-times an audio file. The input is never modified; on success a new
/// temporary resource is returned and the caller owns both.
#[async_trait]
pub trait AudioPostProcessor: Send + Sync {
    async fn adjust_speed(&self, input: &AudioResource, factor: f32) -> Result<AudioResource>;
}

/// Speed adjustment through ffmpeg's `atempo` filter (pitch preserved).
pub struct FfmpegSpeed {
    bin: PathBuf,
    timeout: Duration,
}

impl FfmpegSpeed {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl AudioPostProcessor for FfmpegSpeed {
    async fn adjust_speed(&self, input: &AudioResource, factor: f32) -> Result<AudioResource> {
        validate_speed(factor)?;

        // Owned up front so partial output is removed on every failure path
        let output = AudioResource::temporary(input.sibling("_speed_adjusted"), input.format());

        let run = Command::new(&self.bin)
            .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(input.path())
            .arg("-filter:a")
            .arg(format!("atempo={}", factor))
            .arg("-vn")
            .arg(output.path())
            .kill_on_drop(true)
            .output();

        let result = match tokio::time::timeout(self.timeout, run).await {
            Ok(res) => res.with_context(|| format!("Failed to run {}", self.bin.display()))?,
            Err(_) => anyhow::bail!("ffmpeg timed out after {}s", self.timeout.as_secs()),
        };

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            anyhow::bail!("ffmpeg exited with {}: {}", result.status, stderr.trim());
        }
        if !output.path().exists() {
            anyhow::bail!("ffmpeg produced no output at {}", output.path().display());
        }

        Ok(output)
    }
}
