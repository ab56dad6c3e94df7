//! # Tuner Session
//!
//! Walks the player string-by-string from lowest to highest pitch,
//! reporting live cents deviation and confirming a lock once the
//! current string holds within tolerance continuously for 500 ms.
//!
//! New relative to the per-key manual/auto mode this workspace's tuning
//! table once supported, but grounded on its note/frequency math
//! (`calculate_cents_deviation`, equal-temperament lookup), narrowed to
//! string-indexed presets instead of arbitrary 88-key selection.

use std::time::Duration;

use crate::model::TuningString;
use crate::note;

/// Cents within which a string counts as in tune.
pub const DEFAULT_CENTS_TOLERANCE: f64 = 5.0;
/// Continuous in-tune duration required to confirm a lock.
pub const LOCK_HOLD: Duration = Duration::from_millis(500);

/// A fixed tuning preset, highest string first as commonly notated
/// (matching how an external view would list strings), reversed to
/// lowest-first when built into a session.
#[derive(Debug, Clone, Copy)]
pub struct Preset {
    pub name: &'static str,
    /// MIDI numbers, highest-pitched string first.
    pub midi_high_to_low: &'static [u8],
}

pub const STANDARD: Preset = Preset {
    name: "Standard EADGBE",
    midi_high_to_low: &[64, 59, 55, 50, 45, 40],
};
pub const DROP_D: Preset = Preset {
    name: "Drop D",
    midi_high_to_low: &[64, 59, 55, 50, 45, 38],
};
pub const EB_STANDARD: Preset = Preset {
    name: "Eb Standard",
    midi_high_to_low: &[63, 58, 54, 49, 44, 39],
};
pub const DADGAD: Preset = Preset {
    name: "DADGAD",
    midi_high_to_low: &[62, 57, 55, 50, 45, 38],
};

/// Result of feeding one detected frequency into the session.
#[derive(Debug, Clone, Copy)]
pub struct TuningUpdate {
    pub string_number: u8,
    pub detected_hz: f64,
    pub detected_cents: f64,
    pub in_tune: bool,
}

struct StringState {
    descriptor: TuningString,
    tuned: bool,
}

/// String-by-string pitch-lock state machine. Always has at least one
/// string; the cursor is clamped to `[0, n-1]`.
pub struct TunerSession {
    strings: Vec<StringState>,
    current_index: usize,
    cents_tolerance: f64,
    last_detected_hz: Option<f64>,
    last_detected_cents: Option<f64>,
    in_tune_since: Option<std::time::Instant>,
}

impl TunerSession {
    fn from_midi_lowest_first(midi_lowest_to_highest: Vec<u8>) -> Self {
        assert!(!midi_lowest_to_highest.is_empty(), "tuner session needs at least one string");
        let count = midi_lowest_to_highest.len();
        let strings = midi_lowest_to_highest
            .into_iter()
            .enumerate()
            .map(|(i, midi)| StringState {
                descriptor: TuningString {
                    // `i` counts up from the lowest-pitched string, but
                    // string_number 1 is the highest-pitched (spec.md §3).
                    string_number: (count - i) as u8,
                    note_name: note::note_name(midi as i32),
                    target_hz: note::midi_to_hz(midi as f64),
                    midi: midi as f64,
                },
                tuned: false,
            })
            .collect();
        Self {
            strings,
            current_index: 0,
            cents_tolerance: DEFAULT_CENTS_TOLERANCE,
            last_detected_hz: None,
            last_detected_cents: None,
            in_tune_since: None,
        }
    }

    /// Builds a session from a named preset. The preset's MIDI list is
    /// given highest-pitched first, matching how an external view would
    /// naturally enumerate strings; this reverses it so string 1 is the
    /// lowest-pitched.
    pub fn from_preset(preset: Preset) -> Self {
        let lowest_first: Vec<u8> = preset.midi_high_to_low.iter().rev().copied().collect();
        Self::from_midi_lowest_first(lowest_first)
    }

    /// Builds a session from an explicit MIDI list supplied in the
    /// external view's native (highest-first) order.
    pub fn from_midi_highest_first(midi_highest_to_lowest: Vec<u8>) -> Self {
        let lowest_first: Vec<u8> = midi_highest_to_lowest.into_iter().rev().collect();
        Self::from_midi_lowest_first(lowest_first)
    }

    pub fn default_tuning() -> Self {
        Self::from_preset(STANDARD)
    }

    pub fn current_string(&self) -> &TuningString {
        &self.strings[self.current_index].descriptor
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn is_current_tuned(&self) -> bool {
        self.strings[self.current_index].tuned
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Feeds one detected frequency for the current string. Resets the
    /// in-tune streak whenever the signal leaves tolerance; the caller
    /// (the session facade) is responsible for calling
    /// `confirm_if_locked` once enough time has actually elapsed, since
    /// this type has no access to a wall clock source beyond
    /// `std::time::Instant`.
    pub fn update(&mut self, detected_hz: f64) -> TuningUpdate {
        let target_hz = self.current_string().target_hz;
        let detected_cents = 1200.0 * (detected_hz / target_hz).log2();
        let in_tune = detected_cents.abs() <= self.cents_tolerance;

        self.last_detected_hz = Some(detected_hz);
        self.last_detected_cents = Some(detected_cents);

        if in_tune {
            if self.in_tune_since.is_none() {
                self.in_tune_since = Some(std::time::Instant::now());
            }
        } else {
            self.in_tune_since = None;
        }

        TuningUpdate {
            string_number: self.current_string().string_number,
            detected_hz,
            detected_cents,
            in_tune,
        }
    }

    /// Confirms the lock and advances the cursor if the current string
    /// has been continuously in tune for at least [`LOCK_HOLD`]. A
    /// shorter streak leaves the session unchanged.
    pub fn confirm_if_locked(&mut self) -> bool {
        let Some(since) = self.in_tune_since else { return false };
        if since.elapsed() < LOCK_HOLD {
            return false;
        }
        self.strings[self.current_index].tuned = true;
        self.in_tune_since = None;
        if self.current_index + 1 < self.strings.len() {
            self.current_index += 1;
        }
        true
    }

    /// Moves to the next string without marking the current one tuned.
    /// Saturates at the last string.
    pub fn next(&mut self) {
        if self.current_index + 1 < self.strings.len() {
            self.current_index += 1;
            self.in_tune_since = None;
        }
    }

    /// Moves to the previous string without marking tuned. Saturates at
    /// the first string.
    pub fn previous(&mut self) {
        if self.current_index > 0 {
            self.current_index -= 1;
            self.in_tune_since = None;
        }
    }

    /// Jumps directly to `index` without marking tuned. Out-of-range
    /// indices are clamped to the last valid string.
    pub fn jump_to(&mut self, index: usize) {
        self.current_index = index.min(self.strings.len() - 1);
        self.in_tune_since = None;
    }

    /// Clears every tuned flag and returns the cursor to the lowest
    /// string.
    pub fn reset(&mut self) {
        for s in &mut self.strings {
            s.tuned = false;
        }
        self.current_index = 0;
        self.in_tune_since = None;
        self.last_detected_hz = None;
        self.last_detected_cents = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_preset_is_lowest_first() {
        let t = TunerSession::from_preset(STANDARD);
        assert_eq!(t.len(), 6);
        assert_eq!(t.current_string().note_name, "E2");
        assert!((t.current_string().target_hz - note::midi_to_hz(40.0)).abs() < 1e-6);
    }

    #[test]
    fn string_number_one_is_highest_pitched() {
        let t = TunerSession::from_preset(STANDARD);
        // Iteration starts at the lowest string (E2), which must carry
        // string_number 6 of 6, not 1 (string_number 1 = highest, per
        // spec.md §3).
        assert_eq!(t.current_string().string_number, 6);
        let mut t = t;
        for _ in 0..5 {
            t.next();
        }
        assert_eq!(t.current_string().note_name, "E4");
        assert_eq!(t.current_string().string_number, 1);
    }

    #[test]
    fn in_tune_detection_reports_small_cents() {
        let mut t = TunerSession::from_preset(STANDARD);
        let target = t.current_string().target_hz;
        let update = t.update(target);
        assert!(update.in_tune);
        assert!(update.detected_cents.abs() < 1e-6);
    }

    #[test]
    fn out_of_tune_detection_is_flagged() {
        let mut t = TunerSession::from_preset(STANDARD);
        let target = t.current_string().target_hz;
        let update = t.update(target * 1.05);
        assert!(!update.in_tune);
    }

    #[test]
    fn short_in_tune_streak_does_not_confirm() {
        let mut t = TunerSession::from_preset(STANDARD);
        let target = t.current_string().target_hz;
        t.update(target);
        assert!(!t.confirm_if_locked());
        assert_eq!(t.current_index(), 0);
    }

    #[test]
    fn leaving_tolerance_resets_the_streak() {
        let mut t = TunerSession::from_preset(STANDARD);
        let target = t.current_string().target_hz;
        t.update(target);
        assert!(t.in_tune_since.is_some());
        t.update(target * 1.5);
        assert!(t.in_tune_since.is_none());
    }

    #[test]
    fn navigation_does_not_mark_tuned() {
        let mut t = TunerSession::from_preset(STANDARD);
        t.next();
        assert_eq!(t.current_index(), 1);
        assert!(!t.is_current_tuned());
        t.previous();
        assert_eq!(t.current_index(), 0);
    }

    #[test]
    fn navigation_saturates_at_bounds() {
        let mut t = TunerSession::from_preset(STANDARD);
        t.previous();
        assert_eq!(t.current_index(), 0);
        for _ in 0..10 {
            t.next();
        }
        assert_eq!(t.current_index(), t.len() - 1);
    }

    #[test]
    fn reset_clears_tuned_flags_and_cursor() {
        let mut t = TunerSession::from_preset(STANDARD);
        t.next();
        t.reset();
        assert_eq!(t.current_index(), 0);
        assert!(!t.is_current_tuned());
    }

    #[test]
    fn explicit_midi_list_is_reversed_to_lowest_first() {
        let t = TunerSession::from_midi_highest_first(vec![64, 59, 55, 50, 45, 40]);
        assert_eq!(t.current_string().midi as u8, 40);
    }
}
