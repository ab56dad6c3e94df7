//! # Session Configuration
//!
//! `PracticeConfig` is immutable for the lifetime of a session: "update"
//! is always "build a new config and stop → start", never in-place
//! mutation. That keeps the hot paths in the matcher and detector free
//! of torn reads, the same reasoning that favors a fresh per-frame
//! analysis value over an accumulator mutated from two threads.

use crate::error::{PracticeError, Result};

/// Immutable configuration for one practice session.
#[derive(Debug, Clone)]
pub struct PracticeConfig {
    /// Opaque handle identifying the input device to open, or `None` for
    /// the default device.
    pub device_id: Option<String>,
    pub pitch_tolerance_cents: f64,
    pub timing_tolerance_ms: u64,
    pub min_confidence: f64,
    pub sample_rate_hz: u32,
    pub frame_size: usize,
    pub bins_per_octave: u32,
    /// May be negative; subtracted from raw playback position before
    /// clamping to zero.
    pub latency_compensation_ms: i64,
}

impl Default for PracticeConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            pitch_tolerance_cents: 50.0,
            timing_tolerance_ms: 150,
            min_confidence: 0.7,
            sample_rate_hz: 44_100,
            frame_size: 4096,
            bins_per_octave: 36,
            latency_compensation_ms: 0,
        }
    }
}

impl PracticeConfig {
    /// Validates numeric ranges, rejecting the config with `InvalidConfig`
    /// rather than letting an out-of-range value silently misbehave at
    /// runtime.
    pub fn validate(&self) -> Result<()> {
        if self.pitch_tolerance_cents < 0.0 {
            return Err(PracticeError::InvalidConfig(
                "pitch_tolerance_cents must be >= 0".into(),
            ));
        }
        if self.min_confidence < 0.0 || self.min_confidence > 1.0 {
            return Err(PracticeError::InvalidConfig(
                "min_confidence must be in [0, 1]".into(),
            ));
        }
        if self.sample_rate_hz == 0 {
            return Err(PracticeError::InvalidConfig(
                "sample_rate_hz must be > 0".into(),
            ));
        }
        if self.frame_size == 0 {
            return Err(PracticeError::InvalidConfig("frame_size must be > 0".into()));
        }
        Ok(())
    }

    /// Returns a copy of this config with `device_id` replaced. A new
    /// session must be started to pick it up (stop → start).
    pub fn with_device(&self, device_id: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.device_id = Some(device_id.into());
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(PracticeConfig::default().validate().is_ok());
    }

    #[test]
    fn negative_tolerance_rejected() {
        let mut cfg = PracticeConfig::default();
        cfg.pitch_tolerance_cents = -1.0;
        assert!(matches!(cfg.validate(), Err(PracticeError::InvalidConfig(_))));
    }

    #[test]
    fn confidence_out_of_range_rejected() {
        let mut cfg = PracticeConfig::default();
        cfg.min_confidence = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_sample_rate_rejected() {
        let mut cfg = PracticeConfig::default();
        cfg.sample_rate_hz = 0;
        assert!(cfg.validate().is_err());
    }
}
