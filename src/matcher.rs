//! # Practice Matcher
//!
//! Classifies each externally supplied `ExpectedNote` as hit or missed
//! exactly once, driven by detector output and an externally pushed
//! playback position, and publishes `LiveScoreSnapshot` on demand.
//!
//! New relative to anything in the pitch-detection plumbing, but
//! grounded on the same shape as `capture_processing::process`: a pure
//! function over a buffer, driven by a single owning thread, with index
//! sets kept as plain `Vec<bool>` rather than concurrent sets. All
//! mutable state lives behind one lock at the call site (`session.rs`),
//! never inside this type itself.

use std::collections::VecDeque;

use crate::config::PracticeConfig;
use crate::error::{PracticeError, Result};
use crate::model::{DetectedNote, ExpectedNote, LiveScoreSnapshot};

const FEEDBACK_CAPACITY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatcherState {
    Idle,
    Running,
    Paused,
}

/// Single-consumer capability callbacks, owned for the lifetime of one
/// `start`/`stop` cycle rather than registered as process-wide listeners.
pub type HitCallback = Box<dyn FnMut(&ExpectedNote, usize) + Send>;
pub type MissedCallback = Box<dyn FnMut(&ExpectedNote, usize) + Send>;

pub struct PracticeMatcher {
    expected: Vec<ExpectedNote>,
    hit: Vec<bool>,
    missed: Vec<bool>,
    position_ms: u64,
    total_duration_ms: u64,
    total_notes_in_song: usize,
    feedback: VecDeque<String>,
    state: MatcherState,
    pitch_tolerance_cents: f64,
    timing_tolerance_ms: u64,
    latency_compensation_ms: i64,
    on_hit: Option<HitCallback>,
    on_missed: Option<MissedCallback>,
}

impl PracticeMatcher {
    pub fn new(config: &PracticeConfig) -> Self {
        Self {
            expected: Vec::new(),
            hit: Vec::new(),
            missed: Vec::new(),
            position_ms: 0,
            total_duration_ms: 0,
            total_notes_in_song: 0,
            feedback: VecDeque::new(),
            state: MatcherState::Idle,
            pitch_tolerance_cents: config.pitch_tolerance_cents,
            timing_tolerance_ms: config.timing_tolerance_ms,
            latency_compensation_ms: config.latency_compensation_ms,
            on_hit: None,
            on_missed: None,
        }
    }

    pub fn state(&self) -> MatcherState {
        self.state
    }

    /// Sorts and freezes a new score. Resets all classification state and
    /// returns the matcher to `idle` regardless of its prior state.
    pub fn load_notes(&mut self, mut notes: Vec<ExpectedNote>, total_duration_ms: u64) {
        notes.sort_by_key(|n| n.time_ms);
        let n = notes.len();
        self.expected = notes;
        self.total_notes_in_song = n;
        self.reset_scoring();
        self.total_duration_ms = total_duration_ms;
        self.state = MatcherState::Idle;
    }

    fn reset_scoring(&mut self) {
        let n = self.expected.len();
        self.hit = vec![false; n];
        self.missed = vec![false; n];
        self.position_ms = 0;
        self.feedback.clear();
    }

    /// `idle -> running`, resetting classification state. Rejects a
    /// redundant start with `SessionAlreadyActive`.
    pub fn start(&mut self, on_hit: HitCallback, on_missed: MissedCallback) -> Result<()> {
        if self.state == MatcherState::Running {
            return Err(PracticeError::SessionAlreadyActive);
        }
        self.reset_scoring();
        self.on_hit = Some(on_hit);
        self.on_missed = Some(on_missed);
        self.state = MatcherState::Running;
        Ok(())
    }

    pub fn pause(&mut self) {
        if self.state == MatcherState::Running {
            self.state = MatcherState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == MatcherState::Paused {
            self.state = MatcherState::Running;
        }
    }

    /// `running/paused -> idle`. Drops the callbacks (per the
    /// capability-object lifetime) and returns the final snapshot.
    pub fn stop(&mut self) -> LiveScoreSnapshot {
        self.state = MatcherState::Idle;
        self.on_hit = None;
        self.on_missed = None;
        self.current_snapshot()
    }

    pub fn reset(&mut self) {
        self.reset_scoring();
        self.state = MatcherState::Idle;
    }

    /// Applies latency compensation, clamps to zero, and sweeps for newly
    /// passed notes. `raw_ms` is expected monotonic within a session; a
    /// regression is accepted (it just republishes a stale-looking
    /// position) rather than rejected.
    pub fn update_position(&mut self, raw_ms: i64) {
        let compensated = raw_ms - self.latency_compensation_ms;
        self.position_ms = compensated.max(0) as u64;
        self.process_passed_notes();
    }

    pub fn position_ms(&self) -> u64 {
        self.position_ms
    }

    fn processed(&self, i: usize) -> bool {
        self.hit[i] || self.missed[i]
    }

    /// Scans expected notes in time order looking for a match for `d`.
    /// Returns the matched note and its index; consumes at most one
    /// expected note per call.
    pub fn on_detection(&mut self, d: &DetectedNote) -> Option<(ExpectedNote, usize)> {
        if self.state != MatcherState::Running {
            return None;
        }
        for i in 0..self.expected.len() {
            if self.processed(i) {
                continue;
            }
            let delta_t = self.expected[i].time_ms as i64 - self.position_ms as i64;
            if delta_t < -(self.timing_tolerance_ms as i64) {
                continue;
            }
            if delta_t > self.timing_tolerance_ms as i64 {
                break;
            }
            let delta_cents = (d.midi - self.expected[i].midi as f64).abs() * 100.0;
            if delta_cents <= self.pitch_tolerance_cents {
                self.hit[i] = true;
                let note = self.expected[i].clone();
                self.push_feedback(format!("\u{2713} {} (+{delta_cents:.0}\u{a2})", note.note_name()));
                if let Some(cb) = self.on_hit.as_mut() {
                    cb(&note, i);
                }
                return Some((note, i));
            }
        }
        None
    }

    /// Classifies every unprocessed note whose hit window has fully
    /// closed as missed.
    pub fn process_passed_notes(&mut self) {
        for i in 0..self.expected.len() {
            if self.processed(i) {
                continue;
            }
            if self.position_ms > self.expected[i].time_ms + self.timing_tolerance_ms {
                self.missed[i] = true;
                let note = self.expected[i].clone();
                self.push_feedback(format!("\u{2717} Missed {}", note.note_name()));
                if let Some(cb) = self.on_missed.as_mut() {
                    cb(&note, i);
                }
            }
        }
    }

    fn push_feedback(&mut self, line: String) {
        self.feedback.push_front(line);
        self.feedback.truncate(FEEDBACK_CAPACITY);
    }

    pub fn current_snapshot(&self) -> LiveScoreSnapshot {
        let hits = self.hit.iter().filter(|&&h| h).count();
        let misses = self.missed.iter().filter(|&&m| m).count();
        LiveScoreSnapshot {
            total_notes_in_song: self.total_notes_in_song,
            notes_encountered: hits + misses,
            hits_overall: hits,
            misses_overall: misses,
            hits_so_far: hits,
            misses_so_far: misses,
            current_position_ms: self.position_ms,
            total_duration_ms: self.total_duration_ms,
            feedback: self.feedback.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(time_ms: u64, midi: u8) -> ExpectedNote {
        ExpectedNote {
            time_ms,
            duration_ms: 200,
            midi,
            string: 1,
            fret: 0,
            measure_index: 0,
            beat_index: 0,
        }
    }

    fn detected(midi: f64) -> DetectedNote {
        DetectedNote {
            timestamp_ms: 950,
            frequency_hz: 440.0 * 2f64.powf((midi - 69.0) / 12.0),
            midi,
            cents_from_nearest: 0.0,
            confidence: 0.9,
            note_name: "?".to_string(),
        }
    }

    fn running_matcher(notes: Vec<ExpectedNote>, total_duration_ms: u64) -> PracticeMatcher {
        let cfg = PracticeConfig::default();
        let mut m = PracticeMatcher::new(&cfg);
        m.load_notes(notes, total_duration_ms);
        m.start(Box::new(|_, _| {}), Box::new(|_, _| {})).unwrap();
        m
    }

    #[test]
    fn perfect_single_note_hit() {
        let mut m = running_matcher(vec![note(1000, 64)], 2000);
        m.update_position(950);
        let hit = m.on_detection(&detected(64.00));
        assert!(hit.is_some());
        m.update_position(1000);
        let snap = m.current_snapshot();
        assert_eq!(snap.hits_overall, 1);
        assert_eq!(snap.misses_overall, 0);
        assert!((snap.partial_accuracy() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn out_of_tolerance_pitch_misses() {
        let mut m = running_matcher(vec![note(1000, 64)], 2000);
        m.update_position(1000);
        // 64.5 => exactly 50 cents away: boundary, still matches.
        assert!(m.on_detection(&detected(64.5)).is_some());

        let mut m2 = running_matcher(vec![note(1000, 64)], 2000);
        m2.update_position(1000);
        // 60 cents away: no match, later becomes a miss.
        assert!(m2.on_detection(&detected(64.6)).is_none());
        m2.update_position(1200);
        let snap = m2.current_snapshot();
        assert_eq!(snap.misses_overall, 1);
    }

    #[test]
    fn out_of_tolerance_timing_misses_with_feedback() {
        let mut m = running_matcher(vec![note(1000, 64)], 2000);
        m.update_position(1200);
        assert!(m.on_detection(&detected(64.0)).is_none());
        let snap = m.current_snapshot();
        assert_eq!(snap.misses_overall, 1);
        assert_eq!(snap.feedback.front().unwrap(), "\u{2717} Missed E4");
    }

    #[test]
    fn boundary_position_at_exact_time_is_matchable() {
        let mut m = running_matcher(vec![note(1000, 64)], 2000);
        m.update_position(1000);
        assert!(m.on_detection(&detected(64.0)).is_some());
    }

    #[test]
    fn boundary_position_at_tolerance_edge_is_matchable() {
        let mut m = running_matcher(vec![note(1000, 64)], 2000);
        m.update_position(1150); // exactly time_ms + timing_tolerance_ms
        assert!(m.on_detection(&detected(64.0)).is_some());
    }

    #[test]
    fn multiple_concurrent_notes_tie_break_by_index() {
        let mut m = running_matcher(vec![note(1000, 64), note(1000, 67)], 2000);
        m.update_position(1000);
        let (first, idx0) = m.on_detection(&detected(64.0)).unwrap();
        assert_eq!(idx0, 0);
        assert_eq!(first.midi, 64);
        let (second, idx1) = m.on_detection(&detected(67.0)).unwrap();
        assert_eq!(idx1, 1);
        assert_eq!(second.midi, 67);
        let snap = m.current_snapshot();
        assert_eq!(snap.hits_overall, 2);
    }

    #[test]
    fn pause_across_miss_window_misses_exactly_once() {
        let mut m = running_matcher(vec![note(1000, 64)], 2000);
        m.update_position(900);
        m.pause();
        // No detection arrives while paused.
        m.resume();
        m.update_position(1200);
        let snap = m.current_snapshot();
        assert_eq!(snap.misses_overall, 1);
        // A second sweep must not double-count.
        m.process_passed_notes();
        let snap2 = m.current_snapshot();
        assert_eq!(snap2.misses_overall, 1);
    }

    #[test]
    fn ignores_detections_while_not_running() {
        let cfg = PracticeConfig::default();
        let mut m = PracticeMatcher::new(&cfg);
        m.load_notes(vec![note(1000, 64)], 2000);
        assert!(m.on_detection(&detected(64.0)).is_none());
    }

    #[test]
    fn restart_resets_classification() {
        let mut m = running_matcher(vec![note(1000, 64)], 2000);
        m.update_position(1000);
        m.on_detection(&detected(64.0));
        assert_eq!(m.current_snapshot().hits_overall, 1);
        m.stop();
        m.start(Box::new(|_, _| {}), Box::new(|_, _| {})).unwrap();
        assert_eq!(m.current_snapshot().hits_overall, 0);
    }

    #[test]
    fn double_start_rejected() {
        let mut m = running_matcher(vec![note(1000, 64)], 2000);
        assert!(matches!(
            m.start(Box::new(|_, _| {}), Box::new(|_, _| {})),
            Err(PracticeError::SessionAlreadyActive)
        ));
    }
}
