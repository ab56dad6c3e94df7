//! # Windowing & FFT
//!
//! High-performance spectral transform for real-time audio analysis.
//! DC-offset removal, Hann window, RustFFT pipeline, generalized from a
//! single fixed buffer-size constant to an arbitrary frame size taken
//! from `PracticeConfig::frame_size`.

use rustfft::{num_complex::Complex, FftPlanner};

/// Removes the DC offset from a signal by making its average value zero.
fn remove_dc_offset(signal: &mut [f32]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Applies a Hann window of the buffer's own length to reduce spectral
/// leakage before the forward transform.
pub fn apply_hann_window(buffer: &mut [f32]) {
    let n = buffer.len();
    if n < 2 {
        return;
    }
    let n_minus_1 = (n - 1) as f32;
    for (i, sample) in buffer.iter_mut().enumerate() {
        let multiplier = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos());
        *sample *= multiplier;
    }
}

/// Performs a forward FFT on a windowed signal and returns the complex
/// spectrum. `signal.len()` is the frame size; any length is accepted.
pub fn perform_fft(signal: &[f32]) -> Vec<Complex<f32>> {
    let mut processed = signal.to_vec();
    remove_dc_offset(&mut processed);
    apply_hann_window(&mut processed);

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(processed.len());

    let mut buffer: Vec<Complex<f32>> = processed
        .into_iter()
        .map(|sample| Complex { re: sample, im: 0.0 })
        .collect();

    fft.process(&mut buffer);
    buffer
}

/// Extracts the magnitude spectrum up to (not including) the Nyquist bin.
pub fn spectrum_to_magnitudes(spectrum: &[Complex<f32>]) -> Vec<f32> {
    spectrum
        .iter()
        .take(spectrum.len() / 2)
        .map(|c| c.norm())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: f32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn fft_peak_matches_sine_frequency() {
        let sample_rate = 44_100.0;
        let frame_size = 4096;
        let freq = 220.0;
        let signal = sine(freq, sample_rate, frame_size);

        let spectrum = perform_fft(&signal);
        let magnitudes = spectrum_to_magnitudes(&spectrum);

        let (peak_bin, _) = magnitudes
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap();
        let peak_freq = peak_bin as f32 * sample_rate / frame_size as f32;
        assert!((peak_freq - freq).abs() < sample_rate / frame_size as f32 * 2.0);
    }
}
