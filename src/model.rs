//! # Data Model
//!
//! Value types shared by every component: the externally supplied
//! `ExpectedNote` score, the detector's `DetectedNote` output, device
//! metadata, tuning-string descriptors, and the periodically published
//! `LiveScoreSnapshot`. These cross the boundary to the host application
//! (the on-screen display, any persisted session record), so they derive
//! `Serialize`/`Deserialize` for that external boundary.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::note;

/// An externally supplied note the player is expected to play at a given
/// point in the score. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectedNote {
    pub time_ms: u64,
    pub duration_ms: u64,
    pub midi: u8,
    pub string: u8,
    pub fret: u8,
    pub measure_index: u32,
    pub beat_index: u32,
}

impl ExpectedNote {
    /// Derived display name, e.g. `"E4"`.
    pub fn note_name(&self) -> String {
        note::note_name(self.midi as i32)
    }
}

/// A single non-silent pitch estimate emitted by the detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedNote {
    /// Monotonic milliseconds since the owning session's capture start.
    pub timestamp_ms: u64,
    pub frequency_hz: f64,
    /// Fractional MIDI note number derived from `frequency_hz`.
    pub midi: f64,
    /// Deviation from the nearest semitone, in `(-50, 50]` cents.
    pub cents_from_nearest: f64,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f64,
    pub note_name: String,
}

/// Metadata for an enumerable audio input device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioDeviceInfo {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

/// One string of a tuner preset: target pitch and display name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningString {
    /// 1 = highest-pitched string, counting up to 12.
    pub string_number: u8,
    pub note_name: String,
    pub target_hz: f64,
    pub midi: f64,
}

/// Immutable, periodically published summary of a practice session's
/// progress and accuracy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveScoreSnapshot {
    pub total_notes_in_song: usize,
    pub notes_encountered: usize,
    pub hits_overall: usize,
    pub misses_overall: usize,
    pub hits_so_far: usize,
    pub misses_so_far: usize,
    pub current_position_ms: u64,
    pub total_duration_ms: u64,
    /// Most recent feedback strings, newest first, capped at 5.
    pub feedback: VecDeque<String>,
}

impl LiveScoreSnapshot {
    pub fn overall_accuracy(&self) -> f64 {
        self.hits_overall as f64 / (self.total_notes_in_song.max(1) as f64)
    }

    pub fn partial_accuracy(&self) -> f64 {
        self.hits_so_far as f64 / (self.notes_encountered.max(1) as f64)
    }

    pub fn progress(&self) -> f64 {
        if self.total_duration_ms == 0 {
            return 1.0;
        }
        (self.current_position_ms as f64 / self.total_duration_ms as f64).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_derived_ratios() {
        let snap = LiveScoreSnapshot {
            total_notes_in_song: 10,
            notes_encountered: 4,
            hits_overall: 3,
            misses_overall: 1,
            hits_so_far: 3,
            misses_so_far: 1,
            current_position_ms: 500,
            total_duration_ms: 1000,
            feedback: VecDeque::new(),
        };
        assert!((snap.overall_accuracy() - 0.3).abs() < 1e-9);
        assert!((snap.partial_accuracy() - 0.75).abs() < 1e-9);
        assert!((snap.progress() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn expected_note_derives_name() {
        let n = ExpectedNote {
            time_ms: 0,
            duration_ms: 100,
            midi: 64,
            string: 2,
            fret: 0,
            measure_index: 0,
            beat_index: 0,
        };
        assert_eq!(n.note_name(), "E4");
    }
}
