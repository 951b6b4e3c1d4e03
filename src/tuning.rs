//! Tuning
//!
//! Note-number to frequency conversion and pitch-bend arithmetic.

use libm::Libm;

/// Reference pitch for A, in Hz
pub const A_REFERENCE_HZ: f64 = 440.0;

/// Centre of the 14-bit pitch-bend range
pub const BEND_CENTER: u16 = 8192;

/// Convert a note number to a frequency in Hz.
///
/// Equal temperament anchored so that note 9 sounds at `440 / 32` Hz; every
/// 12 semitones doubles the frequency. Note 69 therefore lands on 440 Hz.
#[inline]
pub fn note_to_frequency(note: i32) -> f64 {
    (A_REFERENCE_HZ / 32.0) * Libm::<f64>::pow(2.0, (note - 9) as f64 / 12.0)
}

/// Combine the two 7-bit pitch-bend data bytes into a 14-bit value
#[inline]
pub fn bend_value(lsb: u8, msb: u8) -> u16 {
    ((msb as u16 & 0x7F) << 7) + (lsb as u16 & 0x7F)
}

/// Normalize a 14-bit bend value to [-1, 1]
#[inline]
pub fn normalize_bend(value: u16) -> f64 {
    (value as f64 - BEND_CENTER as f64) / BEND_CENTER as f64
}

/// Frequency multiplier for a bend, given the bend range in semitones
#[inline]
pub fn bend_multiplier(lsb: u8, msb: u8, range_semitones: f64) -> f64 {
    let semitones = normalize_bend(bend_value(lsb, msb)) * range_semitones;
    Libm::<f64>::pow(2.0, semitones / 12.0)
}

/// Apply a bend multiplier to a base frequency
#[inline]
pub fn bent_frequency(base: f64, multiplier: f64) -> f64 {
    base + (multiplier - 1.0) * base
}
