//! # Pitch Detection Engine
//!
//! Converts a stream of audio frames into a stream of [`DetectedNote`]
//! events, filtered to the guitar band and a confidence floor, via a
//! single FFT-peak pass built on `fft.rs`'s windowing/FFT pipeline and
//! `pitch.rs`'s parabolic interpolation.
//!
//! The worker is a dedicated thread draining the audio line via
//! `crossbeam_channel::select!`, with a `shutdown_tx` for cooperative
//! cancellation and a guaranteed `stream.pause()`/drop on every exit path.

use crossbeam_channel::Sender;
use std::thread::JoinHandle;

use crate::audio::AudioSource;
use crate::config::PracticeConfig;
use crate::error::{PracticeError, Result};
use crate::model::DetectedNote;
use crate::note;
use crate::{fft, pitch};

/// Lower bound of the guitar-constrained detection band (Hz), the open
/// low-E string.
pub const MIN_FREQ_HZ: f64 = 65.41;
/// Upper bound of the guitar-constrained detection band (Hz).
pub const MAX_FREQ_HZ: f64 = 1318.51;

/// Noise gate: frames with RMS below this are treated as silence and
/// produce no event.
const NOISE_GATE_RMS: f32 = 0.01;

/// Stateless-per-frame, stateful-across-frames pitch estimator. Holds only
/// the running sample counter needed to stamp monotonic timestamps; every
/// other quantity is recomputed fresh each frame.
pub struct Detector {
    sample_rate_hz: u32,
    min_confidence: f64,
    samples_consumed: u64,
}

impl Detector {
    pub fn new(config: &PracticeConfig) -> Self {
        Self {
            sample_rate_hz: config.sample_rate_hz,
            min_confidence: config.min_confidence,
            samples_consumed: 0,
        }
    }

    pub fn samples_consumed(&self) -> u64 {
        self.samples_consumed
    }

    /// Runs the per-frame detection algorithm on one frame of samples,
    /// returning `None` for silence or sub-threshold detections.
    pub fn process_frame(&mut self, frame: &[f32]) -> Option<DetectedNote> {
        let frame_start_samples = self.samples_consumed;
        self.samples_consumed += frame.len() as u64;

        if frame.is_empty() {
            return None;
        }

        // 1. Noise gate.
        let rms = (frame.iter().map(|&s| s * s).sum::<f32>() / frame.len() as f32).sqrt();
        if rms < NOISE_GATE_RMS {
            return None;
        }

        // 2-3. Hann window + real FFT (fft::perform_fft windows internally).
        let spectrum = fft::perform_fft(frame);
        let magnitudes = fft::spectrum_to_magnitudes(&spectrum);
        if magnitudes.len() < 3 {
            return None;
        }

        let sample_rate = self.sample_rate_hz as f64;
        let frame_size = frame.len() as f64;
        let bin_hz = sample_rate / frame_size;

        // 4. Band-limit the peak search, leaving room on both sides for
        // the 3-point parabolic interpolation.
        let band_lo = ((MIN_FREQ_HZ / bin_hz).ceil() as usize).max(1);
        let band_hi = ((MAX_FREQ_HZ / bin_hz).floor() as usize).min(magnitudes.len() - 2);
        if band_lo > band_hi {
            return None;
        }

        // 5. Peak within the band.
        let (peak_bin, &peak_mag) = magnitudes[band_lo..=band_hi]
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, m)| (band_lo + i, m))?;

        // 6. Parabolic interpolation for sub-bin precision.
        let p = pitch::parabolic_offset(
            magnitudes[peak_bin - 1],
            magnitudes[peak_bin],
            magnitudes[peak_bin + 1],
        ) as f64;
        let peak_freq = (peak_bin as f64 + p) * sample_rate / frame_size;

        // 7. Confidence: peak-to-band-average ratio, scaled by loudness.
        let band_avg = magnitudes[band_lo..=band_hi].iter().map(|&m| m as f64).sum::<f64>()
            / (band_hi - band_lo + 1) as f64;
        let c0 = if band_avg > 0.0 {
            (peak_mag as f64 / (10.0 * band_avg)).min(1.0)
        } else {
            0.0
        };
        let confidence = c0 * (20.0 * rms as f64).min(1.0);

        // 8. Emit.
        if confidence < self.min_confidence || peak_freq < MIN_FREQ_HZ || peak_freq > MAX_FREQ_HZ {
            return None;
        }

        let midi = note::hz_to_midi(peak_freq);
        let cents_from_nearest = note::cents_from_nearest_semitone(midi);
        let timestamp_ms = frame_start_samples * 1000 / self.sample_rate_hz as u64;

        Some(DetectedNote {
            timestamp_ms,
            frequency_hz: peak_freq,
            midi,
            cents_from_nearest,
            confidence,
            note_name: note::note_name(midi.round() as i32),
        })
    }
}

/// Owns exactly one worker thread that drains the audio line. Every
/// detection is handed to the single downstream consumer (the matcher or
/// the tuner, via `on_note`) synchronously and directly: the consumer's
/// own critical section is short (§5), so there is no separate queue to
/// back up and nothing for a drop-oldest policy to protect against.
pub struct DetectorWorker {
    shutdown_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl DetectorWorker {
    /// Opens the audio line per `config` and spawns the draining thread.
    /// `on_note` is invoked synchronously on the worker thread for every
    /// detection (the matcher's or tuner's consumption point); `on_error`
    /// is invoked for both transient frame-read failures and the fatal
    /// line-closed condition.
    pub fn spawn<N, E>(config: PracticeConfig, mut on_note: N, mut on_error: E) -> Result<Self>
    where
        N: FnMut(DetectedNote) + Send + 'static,
        E: FnMut(PracticeError) + Send + 'static,
    {
        let mut source = AudioSource::open(
            config.device_id.as_deref(),
            config.sample_rate_hz,
            config.frame_size,
        )?;
        let (frame_rx, error_rx) = source.channels();
        let frame_rx = frame_rx.expect("audio source channel available after open");
        let error_rx = error_rx.expect("audio source error channel available after open");

        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let mut detector = Detector::new(&config);

        let handle = std::thread::spawn(move || {
            eprintln!("[detector] worker started");
            loop {
                crossbeam_channel::select! {
                    recv(frame_rx) -> msg => match msg {
                        Ok(frame) => {
                            if let Some(note) = detector.process_frame(&frame) {
                                on_note(note);
                            }
                        }
                        Err(_) => {
                            eprintln!("[detector] audio line closed");
                            on_error(PracticeError::DetectorFatal("audio line closed".into()));
                            break;
                        }
                    },
                    recv(error_rx) -> msg => {
                        if let Ok(e) = msg {
                            on_error(PracticeError::FrameReadError(e));
                        }
                    },
                    recv(shutdown_rx) -> _ => {
                        eprintln!("[detector] shutdown received");
                        break;
                    },
                }
            }
            source.close();
            eprintln!("[detector] worker finished");
        });

        Ok(Self {
            shutdown_tx,
            handle: Some(handle),
        })
    }

    /// Signals shutdown and joins the worker, capped at 500ms. A worker
    /// that refuses to exit in time is abandoned. Used by `stop_practice`,
    /// where a bounded synchronous wait is acceptable.
    pub fn stop(&mut self) {
        let _ = self.shutdown_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            let start = std::time::Instant::now();
            while !handle.is_finished() && start.elapsed() < std::time::Duration::from_millis(500)
            {
                std::thread::sleep(std::time::Duration::from_millis(10));
            }
            if handle.is_finished() {
                let _ = handle.join();
            }
            // else: abandoned, resources released best-effort by the OS.
        }
    }

    /// Signals shutdown and detaches the join onto a background thread,
    /// so the caller returns immediately. `pause_practice` needs this:
    /// spec.md §5 requires pause to be instant, unlike `stop`'s capped
    /// synchronous join. Consumes `self` since there is nothing left to
    /// do with a paused worker other than let it wind down.
    pub fn pause(mut self) {
        let _ = self.shutdown_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            std::thread::spawn(move || {
                let _ = handle.join();
            });
        }
    }
}

impl Drop for DetectorWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_frame(freq: f64, sample_rate: u32, n: usize, amplitude: f32) -> Vec<f32> {
        (0..n)
            .map(|i| {
                amplitude
                    * (2.0 * std::f64::consts::PI * freq * i as f64 / sample_rate as f64).sin()
                        as f32
            })
            .collect()
    }

    fn detector_with(sample_rate_hz: u32, min_confidence: f64) -> Detector {
        let mut cfg = PracticeConfig::default();
        cfg.sample_rate_hz = sample_rate_hz;
        cfg.min_confidence = min_confidence;
        Detector::new(&cfg)
    }

    #[test]
    fn silence_yields_no_detection() {
        let mut det = detector_with(44_100, 0.0);
        let frame = vec![0.0f32; 4096];
        assert!(det.process_frame(&frame).is_none());
    }

    #[test]
    fn loud_e4_string_is_detected_in_band() {
        let mut det = detector_with(44_100, 0.0);
        // E4 = open high-E string-ish, well inside [65.41, 1318.51].
        let frame = sine_frame(329.63, 44_100, 4096, 0.8);
        let note = det.process_frame(&frame).expect("should detect a pitch");
        assert!((note.frequency_hz - 329.63).abs() < 5.0);
        assert!(note.confidence >= 0.0 && note.confidence <= 1.0);
        assert!(note.frequency_hz >= MIN_FREQ_HZ && note.frequency_hz <= MAX_FREQ_HZ);
    }

    #[test]
    fn below_band_frequency_never_emits_an_out_of_band_pitch() {
        // 40 Hz is below MIN_FREQ_HZ; the band search is restricted to
        // [MIN_FREQ_HZ, MAX_FREQ_HZ], so any detection it does emit
        // (from spectral leakage) must still fall inside that band.
        let mut det = detector_with(44_100, 0.0);
        let frame = sine_frame(40.0, 44_100, 4096, 0.8);
        if let Some(note) = det.process_frame(&frame) {
            assert!(note.frequency_hz >= MIN_FREQ_HZ && note.frequency_hz <= MAX_FREQ_HZ);
        }
    }

    #[test]
    fn timestamps_are_monotonic_across_frames() {
        let mut det = detector_with(44_100, 0.0);
        let frame = sine_frame(329.63, 44_100, 4096, 0.8);
        let first = det.process_frame(&frame).unwrap();
        let second = det.process_frame(&frame).unwrap();
        assert!(second.timestamp_ms >= first.timestamp_ms);
    }

    #[test]
    fn confidence_floor_excludes_quiet_signal() {
        let mut det = detector_with(44_100, 0.99);
        // Quiet enough to clear the noise gate but not the confidence floor.
        let frame = sine_frame(329.63, 44_100, 4096, 0.02);
        assert!(det.process_frame(&frame).is_none());
    }
}
