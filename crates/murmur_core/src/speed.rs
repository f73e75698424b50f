//! Playback speed multiplier shared by every session.
//!
//! Workers read the value once per item, right before post-processing, so a
//! change never affects the item that is already being played.

use arc_swap::ArcSwap;
use std::sync::Arc;
use thiserror::Error;

pub const MIN_SPEED: f32 = 0.5;
pub const MAX_SPEED: f32 = 2.0;
pub const DEFAULT_SPEED: f32 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SpeedError {
    #[error("speed {0} is outside the allowed range {MIN_SPEED}..={MAX_SPEED}")]
    OutOfRange(f32),
    #[error("speed must be a finite number")]
    NotFinite,
}

/// Check a requested multiplier against the inclusive `[0.5, 2.0]` range.
pub fn validate_speed(speed: f32) -> Result<f32, SpeedError> {
    if !speed.is_finite() {
        return Err(SpeedError::NotFinite);
    }
    if !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
        return Err(SpeedError::OutOfRange(speed));
    }
    Ok(speed)
}

/// Whether a factor differs from normal speed enough to be worth re-timing.
pub fn needs_adjustment(speed: f32) -> bool {
    (speed - 1.0).abs() > f32::EPSILON
}

/// Process-wide speed multiplier with lock-free reads.
#[derive(Debug)]
pub struct SpeedSetting {
    value: ArcSwap<f32>,
}

impl SpeedSetting {
    pub fn new(initial: f32) -> Result<Self, SpeedError> {
        let initial = validate_speed(initial)?;
        Ok(Self {
            value: ArcSwap::from_pointee(initial),
        })
    }

    pub fn get(&self) -> f32 {
        **self.value.load()
    }

    /// Replace the multiplier. On rejection the previous value is kept.
    pub fn set(&self, speed: f32) -> Result<f32, SpeedError> {
        let speed = validate_speed(speed)?;
        self.value.store(Arc::new(speed));
        tracing::debug!("Speed multiplier set to {}x", speed);
        Ok(speed)
    }
}

impl Default for SpeedSetting {
    fn default() -> Self {
        Self {
            value: ArcSwap::from_pointee(DEFAULT_SPEED),
        }
    }
}
