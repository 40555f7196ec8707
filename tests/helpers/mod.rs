//! Test helpers and fixtures for reslice integration tests.
//!
//! Signals are synthesized in memory and written to temporary WAV files
//! where a test needs the loader. Nothing here opens an audio device.
//!
//! ## Tolerance Levels
//!
//! Use the appropriate tolerance from [`tolerances`] module:
//! - `FLOAT_EPSILON` (1e-6): Exact operations (gain, passthrough)
//! - `SILENCE_THRESHOLD` (0.0001): Silence detection (-80dB)
//! - `ONSET_TOLERANCE_S` (30 ms): Detected vs synthesized onset time
//! - `BPM_TOLERANCE` (3 bpm): Tempo estimates

#![allow(dead_code)]

pub mod tolerances;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reslice::prelude::*;
use std::path::{Path, PathBuf};

/// Default test sample rate
pub const TEST_SAMPLE_RATE: u32 = 44100;

/// Short decaying clicks at each time in `times`.
pub fn generate_clicks(duration_secs: f64, times: &[f64]) -> Vec<f32> {
    let num_samples = (TEST_SAMPLE_RATE as f64 * duration_secs) as usize;
    let mut samples = vec![0.0f32; num_samples];

    for &time in times {
        let pos = (time * TEST_SAMPLE_RATE as f64) as usize;
        for (i, s) in samples.iter_mut().skip(pos).take(50).enumerate() {
            *s += 0.8 * (-0.1 * i as f32).exp();
        }
    }
    samples
}

/// Clicks on every beat at `bpm`, starting at `offset_secs`.
pub fn generate_click_track(bpm: f64, duration_secs: f64, offset_secs: f64) -> Vec<f32> {
    let beat = 60.0 / bpm;
    let times: Vec<f64> = (0..)
        .map(|i| offset_secs + i as f64 * beat)
        .take_while(|t| *t < duration_secs)
        .collect();
    generate_clicks(duration_secs, &times)
}

/// Decaying 440 Hz plucks starting at each time in `times`.
pub fn generate_plucks(duration_secs: f64, times: &[f64]) -> Vec<f32> {
    let num_samples = (TEST_SAMPLE_RATE as f64 * duration_secs) as usize;
    let mut samples = vec![0.0f32; num_samples];
    for &time in times {
        let pos = (time * TEST_SAMPLE_RATE as f64) as usize;
        for (i, s) in samples.iter_mut().skip(pos).enumerate() {
            let t = i as f32 / TEST_SAMPLE_RATE as f32;
            *s += 0.8 * (-t / 0.03).exp() * (2.0 * std::f32::consts::PI * 440.0 * t).sin();
        }
    }
    samples
}

/// Seeded white noise in `-amplitude..amplitude`.
pub fn generate_noise(num_samples: usize, amplitude: f32, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..num_samples)
        .map(|_| rng.gen_range(-amplitude..amplitude))
        .collect()
}

/// Sample index -> value ramp, so rendered output reveals which samples were read.
pub fn generate_ramp(num_samples: usize) -> Vec<f32> {
    (0..num_samples).map(|i| i as f32 / num_samples as f32).collect()
}

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

pub fn peak(samples: &[f32]) -> f32 {
    samples
        .iter()
        .map(|s| s.abs())
        .fold(0.0_f32, |a, b| a.max(b))
}

/// Assert that a signal is approximately silent (all values near zero).
pub fn assert_silence(samples: &[f32], tolerance: f32) {
    let max = peak(samples);
    assert!(
        max <= tolerance,
        "Expected silence, but peak amplitude was {}",
        max
    );
}

pub fn assert_has_audio(samples: &[f32], min_rms: f32) {
    let r = rms(samples);
    assert!(
        r >= min_rms,
        "Expected audio content with RMS >= {}, but RMS was {}",
        min_rms,
        r
    );
}

/// Assert every expected onset has a detected one within `tolerance` seconds.
pub fn assert_onsets_near(detected: &[f64], expected: &[f64], tolerance: f64) {
    assert_eq!(
        detected.len(),
        expected.len(),
        "Expected onsets {:?}, detected {:?}",
        expected,
        detected
    );
    for (d, e) in detected.iter().zip(expected) {
        assert!(
            (d - e).abs() <= tolerance,
            "Onset {} detected at {} (tolerance {})",
            e,
            d,
            tolerance
        );
    }
}

/// Write a 32-bit float WAV, interleaving `channels` copies of `samples`.
pub fn write_wav_f32(path: &Path, samples: &[f32], sample_rate: u32, channels: u16) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("Failed to create WAV");
    for &s in samples {
        for _ in 0..channels {
            writer.write_sample(s).expect("Failed to write sample");
        }
    }
    writer.finalize().expect("Failed to finalize WAV");
}

/// Write a mono 16-bit WAV.
pub fn write_wav_i16(path: &Path, samples: &[f32], sample_rate: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("Failed to create WAV");
    for &s in samples {
        writer
            .write_sample((s * i16::MAX as f32) as i16)
            .expect("Failed to write sample");
    }
    writer.finalize().expect("Failed to finalize WAV");
}

/// Write `samples` as a mono float WAV inside `dir` and return its path.
pub fn wav_fixture(dir: &tempfile::TempDir, name: &str, samples: &[f32]) -> PathBuf {
    let path = dir.path().join(name);
    write_wav_f32(&path, samples, TEST_SAMPLE_RATE, 1);
    path
}

/// Session over in-memory samples with the peak-only envelope.
pub fn test_session(samples: Vec<f32>) -> SliceSession {
    SliceSession::builder()
        .audio(AudioBuffer::new(samples, TEST_SAMPLE_RATE))
        .envelope_mode(EnvelopeMode::Peak)
        .build()
        .expect("Failed to create test session")
}
