//! # Practice Session Facade
//!
//! `PracticeSession` is the single entry point a host embeds: every
//! inbound call and outbound callback named by the external-interfaces
//! design lives here, orchestrating `AudioSource` (via `DetectorWorker`),
//! `PracticeMatcher`, `TunerSession`, and the periodic snapshot
//! publisher behind one coarse lock per component, never exposing the
//! worker threads themselves.
//!
//! No GUI framework lives underneath this facade: listener callbacks are
//! taken as owned boxed closures at `start_practice` / `start_tuning` and
//! dropped at `stop`, a capability-object design rather than process-wide
//! pub/sub.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;

use crate::audio::AudioSource;
use crate::config::PracticeConfig;
use crate::detector::DetectorWorker;
use crate::error::{PracticeError, Result};
use crate::matcher::{MatcherState, PracticeMatcher};
use crate::model::{AudioDeviceInfo, ExpectedNote, LiveScoreSnapshot};
use crate::tuner::{Preset, TunerSession, TuningUpdate};

const SNAPSHOT_INTERVAL: Duration = Duration::from_millis(100);

type ErrorSink = Arc<Mutex<Box<dyn FnMut(PracticeError) + Send>>>;

fn call_error_sink(sink: &ErrorSink, e: PracticeError) {
    let mut guard = sink.lock().unwrap();
    (&mut **guard)(e);
}

/// Where a tuning session's string list comes from.
pub enum TuningSource {
    Preset(Preset),
    /// MIDI numbers in the external view's native order (highest-pitched
    /// string first).
    ExplicitMidiHighToLow(Vec<u8>),
    DefaultStandard,
}

struct SnapshotPublisher {
    shutdown_tx: crossbeam_channel::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl SnapshotPublisher {
    fn spawn<F>(matcher: Arc<Mutex<PracticeMatcher>>, mut on_snapshot: F) -> Self
    where
        F: FnMut(LiveScoreSnapshot) + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let handle = std::thread::spawn(move || {
            eprintln!("[publisher] worker started");
            loop {
                match shutdown_rx.recv_timeout(SNAPSHOT_INTERVAL) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {
                        let snapshot = {
                            let m = matcher.lock().unwrap();
                            if m.state() != MatcherState::Running {
                                None
                            } else {
                                Some(m.current_snapshot())
                            }
                        };
                        if let Some(snapshot) = snapshot {
                            on_snapshot(snapshot);
                        }
                    }
                }
            }
            eprintln!("[publisher] worker finished");
        });
        Self {
            shutdown_tx,
            handle: Some(handle),
        }
    }

    fn stop(&mut self) {
        let _ = self.shutdown_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SnapshotPublisher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Headless owner of one practice-or-tuning pipeline. Only one of
/// practice and tuning is active at a time; starting one while the
/// other is active is the caller's responsibility to avoid (both paths
/// open their own audio line and would otherwise contend for the same
/// device).
pub struct PracticeSession {
    config: PracticeConfig,
    matcher: Arc<Mutex<PracticeMatcher>>,
    practice_detector: Option<DetectorWorker>,
    practice_error_sink: Option<ErrorSink>,
    publisher: Option<SnapshotPublisher>,

    tuner: Option<Arc<Mutex<TunerSession>>>,
    tuning_detector: Option<DetectorWorker>,
}

impl PracticeSession {
    pub fn new(config: PracticeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            matcher: Arc::new(Mutex::new(PracticeMatcher::new(&config))),
            config,
            practice_detector: None,
            practice_error_sink: None,
            publisher: None,
            tuner: None,
            tuning_detector: None,
        })
    }

    pub fn list_audio_devices() -> Vec<AudioDeviceInfo> {
        AudioSource::list_devices()
    }

    /// Notes may arrive in any order; the matcher sorts and freezes them.
    pub fn load_expected_notes(&mut self, notes: Vec<ExpectedNote>, total_duration_ms: u64) {
        self.matcher.lock().unwrap().load_notes(notes, total_duration_ms);
    }

    pub fn start_practice<H, M, S, Err>(
        &mut self,
        config: PracticeConfig,
        on_snapshot: S,
        on_note_hit: H,
        on_note_missed: M,
        on_error: Err,
    ) -> Result<()>
    where
        H: FnMut(&ExpectedNote, usize) + Send + 'static,
        M: FnMut(&ExpectedNote, usize) + Send + 'static,
        S: FnMut(LiveScoreSnapshot) + Send + 'static,
        Err: FnMut(PracticeError) + Send + 'static,
    {
        config.validate()?;
        self.matcher
            .lock()
            .unwrap()
            .start(Box::new(on_note_hit), Box::new(on_note_missed))?;

        let error_sink: ErrorSink = Arc::new(Mutex::new(Box::new(on_error)));
        match self.spawn_practice_detector(&config, Arc::clone(&error_sink)) {
            Ok(detector) => {
                self.config = config;
                self.practice_detector = Some(detector);
                self.practice_error_sink = Some(error_sink);
                self.publisher = Some(SnapshotPublisher::spawn(Arc::clone(&self.matcher), on_snapshot));
                Ok(())
            }
            Err(e) => {
                self.matcher.lock().unwrap().stop();
                Err(e)
            }
        }
    }

    fn spawn_practice_detector(
        &self,
        config: &PracticeConfig,
        error_sink: ErrorSink,
    ) -> Result<DetectorWorker> {
        let matcher_for_detector = Arc::clone(&self.matcher);
        DetectorWorker::spawn(
            config.clone(),
            move |note| {
                matcher_for_detector.lock().unwrap().on_detection(&note);
            },
            move |e| call_error_sink(&error_sink, e),
        )
    }

    /// Called at the host's tick rate (10-50 Hz); must be monotonic
    /// within a session.
    pub fn update_playback_position(&mut self, position_ms: i64) {
        self.matcher.lock().unwrap().update_position(position_ms);
    }

    /// `running -> paused`: retains matcher state and returns instantly
    /// (spec.md §5). The detector's shutdown is signaled and its join
    /// deferred to a background thread rather than blocked on here.
    pub fn pause_practice(&mut self) {
        self.matcher.lock().unwrap().pause();
        if let Some(detector) = self.practice_detector.take() {
            detector.pause();
        }
    }

    /// `paused -> running`: restarts the detector with the same config.
    /// May fail with `DeviceUnavailable`, leaving the session `paused`.
    pub fn resume_practice(&mut self) -> Result<()> {
        let Some(error_sink) = self.practice_error_sink.clone() else {
            return Err(PracticeError::InvalidConfig(
                "resume_practice called before start_practice".into(),
            ));
        };
        let detector = self.spawn_practice_detector(&self.config, error_sink)?;
        self.practice_detector = Some(detector);
        self.matcher.lock().unwrap().resume();
        Ok(())
    }

    /// `running/paused -> idle`: stops the detector, cancels the
    /// publisher, returns the final snapshot.
    pub fn stop_practice(&mut self) -> LiveScoreSnapshot {
        self.practice_detector = None;
        self.publisher = None;
        self.practice_error_sink = None;
        self.matcher.lock().unwrap().stop()
    }

    /// Resets classification state without unloading the notes.
    pub fn reset_practice(&mut self) {
        self.matcher.lock().unwrap().reset();
    }

    pub fn current_snapshot(&self) -> LiveScoreSnapshot {
        self.matcher.lock().unwrap().current_snapshot()
    }

    pub fn start_tuning<U, Err>(
        &mut self,
        source: TuningSource,
        device_id: Option<String>,
        mut on_update: U,
        on_error: Err,
    ) -> Result<()>
    where
        U: FnMut(TuningUpdate) + Send + 'static,
        Err: FnMut(PracticeError) + Send + 'static,
    {
        let session = match source {
            TuningSource::Preset(p) => TunerSession::from_preset(p),
            TuningSource::ExplicitMidiHighToLow(list) => TunerSession::from_midi_highest_first(list),
            TuningSource::DefaultStandard => TunerSession::default_tuning(),
        };
        let tuner = Arc::new(Mutex::new(session));
        let mut cfg = self.config.clone();
        cfg.device_id = device_id;

        let tuner_for_detector = Arc::clone(&tuner);
        let detector = DetectorWorker::spawn(
            cfg,
            move |note| {
                let update = tuner_for_detector.lock().unwrap().update(note.frequency_hz);
                on_update(update);
            },
            on_error,
        )?;

        self.tuner = Some(tuner);
        self.tuning_detector = Some(detector);
        Ok(())
    }

    pub fn stop_tuning(&mut self) {
        self.tuning_detector = None;
        self.tuner = None;
    }

    pub fn tuning_next(&mut self) -> Result<()> {
        self.with_tuner(|t| t.next())
    }

    pub fn tuning_previous(&mut self) -> Result<()> {
        self.with_tuner(|t| t.previous())
    }

    pub fn tuning_jump_to(&mut self, index: usize) -> Result<()> {
        self.with_tuner(|t| t.jump_to(index))
    }

    pub fn tuning_reset(&mut self) -> Result<()> {
        self.with_tuner(|t| t.reset())
    }

    /// Checks whether the current string has held in tune for the
    /// required lock duration and, if so, confirms it and advances the
    /// cursor. Returns whether a confirmation happened.
    pub fn tuning_confirm_and_advance(&mut self) -> Result<bool> {
        let Some(tuner) = &self.tuner else {
            return Err(PracticeError::InvalidConfig("no tuning session active".into()));
        };
        Ok(tuner.lock().unwrap().confirm_if_locked())
    }

    fn with_tuner(&self, f: impl FnOnce(&mut TunerSession)) -> Result<()> {
        let Some(tuner) = &self.tuner else {
            return Err(PracticeError::InvalidConfig("no tuning session active".into()));
        };
        f(&mut tuner.lock().unwrap());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_validates_config() {
        let mut bad = PracticeConfig::default();
        bad.sample_rate_hz = 0;
        assert!(PracticeSession::new(bad).is_err());
    }

    #[test]
    fn load_notes_and_snapshot_before_start() {
        let mut session = PracticeSession::new(PracticeConfig::default()).unwrap();
        session.load_expected_notes(
            vec![ExpectedNote {
                time_ms: 0,
                duration_ms: 100,
                midi: 64,
                string: 1,
                fret: 0,
                measure_index: 0,
                beat_index: 0,
            }],
            1000,
        );
        let snap = session.current_snapshot();
        assert_eq!(snap.total_notes_in_song, 1);
        assert_eq!(snap.notes_encountered, 0);
    }

    #[test]
    fn tuning_calls_without_active_session_are_rejected() {
        let mut session = PracticeSession::new(PracticeConfig::default()).unwrap();
        assert!(session.tuning_next().is_err());
        assert!(session.tuning_confirm_and_advance().is_err());
    }
}
