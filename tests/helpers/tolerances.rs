//! Tolerance constants for slicer tests.

/// Floating point rounding errors (exact gain, passthrough).
pub const FLOAT_EPSILON: f32 = 1e-6;

/// Silence threshold (~-80dB).
pub const SILENCE_THRESHOLD: f32 = 0.0001;

/// 16-bit quantization step size.
pub const INT16_EPSILON: f32 = 1.0 / 32768.0;

/// How far a detected onset may sit from the synthesized one, in seconds.
/// One analysis hop at 44.1 kHz is ~11.6 ms; two hops plus slack.
pub const ONSET_TOLERANCE_S: f64 = 0.03;

/// Allowed tempo estimate error in bpm.
pub const BPM_TOLERANCE: f32 = 3.0;
