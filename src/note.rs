//! # Pitch / Note Math
//!
//! Conversions between frequency, MIDI note number, cents, and note names.
//! Grounded on `tuning.rs`'s equal-temperament table, generalized from an
//! 88-key piano lookup to the full MIDI range since expected/detected notes
//! here carry a MIDI number directly rather than a piano key index.

/// MIDI number of concert A4 (440 Hz).
pub const A4_MIDI: f64 = 69.0;
/// Frequency of concert A4 in Hz.
pub const A4_HZ: f64 = 440.0;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Converts a frequency in Hz to a fractional MIDI note number.
///
/// `midi(hz) = 69 + 12 * log2(hz / 440)`. Inverse of [`midi_to_hz`].
pub fn hz_to_midi(hz: f64) -> f64 {
    A4_MIDI + 12.0 * (hz / A4_HZ).log2()
}

/// Converts a (possibly fractional) MIDI note number to a frequency in Hz.
///
/// `hz(midi) = 440 * 2^((midi - 69) / 12)`. Inverse of [`hz_to_midi`].
pub fn midi_to_hz(midi: f64) -> f64 {
    A4_HZ * 2f64.powf((midi - A4_MIDI) / 12.0)
}

/// Cents deviation of `freq` from `reference`: `1200 * log2(freq / reference)`.
///
/// `cents(r, r) == 0`, `cents(2r, r) == 1200`.
pub fn cents_from(freq: f64, reference: f64) -> f64 {
    1200.0 * (freq / reference).log2()
}

/// Deviation in cents of a fractional MIDI number from its nearest integer
/// semitone, folded into `(-50, 50]`.
pub fn cents_from_nearest_semitone(midi: f64) -> f64 {
    let nearest = midi.round();
    let mut cents = (midi - nearest) * 100.0;
    // round() ties to even, which can put us at exactly -50; the target
    // range is the half-open (-50, 50], so fold a -50 tie to +50.
    if cents <= -50.0 {
        cents += 100.0;
    }
    cents
}

/// Renders an integer MIDI note number as a name like `"E4"` or `"C#3"`,
/// using the same octave convention as standard MIDI (C-1 = note 0, so
/// middle C / MIDI 60 is "C4").
pub fn note_name(midi: i32) -> String {
    let pitch_class = midi.rem_euclid(12) as usize;
    let octave = midi / 12 - 1;
    format!("{}{}", NOTE_NAMES[pitch_class], octave)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midi_hz_round_trip() {
        let mut hz = 60.0;
        while hz <= 1500.0 {
            let midi = hz_to_midi(hz);
            let back = midi_to_hz(midi);
            assert!((back - hz).abs() < 1e-6, "{hz} -> {midi} -> {back}");
            hz += 7.3;
        }
    }

    #[test]
    fn cents_known_values() {
        assert!((cents_from(440.0, 440.0)).abs() < 1e-9);
        assert!((cents_from(880.0, 440.0) - 1200.0).abs() < 1e-9);
    }

    #[test]
    fn note_names_middle_c_and_a4() {
        assert_eq!(note_name(60), "C4");
        assert_eq!(note_name(69), "A4");
        assert_eq!(note_name(64), "E4");
    }

    #[test]
    fn cents_from_nearest_is_folded_range() {
        assert!(cents_from_nearest_semitone(64.0).abs() < 1e-9);
        let c = cents_from_nearest_semitone(64.5);
        assert!((c - 50.0).abs() < 1e-6 || (c + 50.0).abs() < 1e-6);
    }
}
