//! Streaming spectral flux shared by the onset detector and tempo estimator.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Frames whose RMS falls below this are treated as silence (about -80 dBFS).
const SILENCE_RMS: f32 = 1e-4;

/// Hann window of `size` points.
pub(crate) fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| {
            let angle = 2.0 * core::f32::consts::PI * i as f32 / (size - 1) as f32;
            0.5 * (1.0 - angle.cos())
        })
        .collect()
}

/// Sliding analysis window fed one hop at a time.
///
/// Each call to [`SpectralFlux::push`] shifts `hop.len()` new samples into a
/// window of `window_size` samples, takes the magnitude spectrum and returns
/// the sum of positive magnitude differences against the previous frame.
/// The FFT is planned once; `push` does not allocate.
pub(crate) struct SpectralFlux {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    frame: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    prev_magnitudes: Vec<f32>,
}

impl SpectralFlux {
    pub(crate) fn new(window_size: usize) -> Self {
        let fft = FftPlanner::new().plan_fft_forward(window_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        Self {
            fft,
            window: hann_window(window_size),
            frame: vec![0.0; window_size],
            spectrum: vec![Complex::new(0.0, 0.0); window_size],
            scratch,
            prev_magnitudes: vec![0.0; window_size / 2],
        }
    }

    pub(crate) fn reset(&mut self) {
        self.frame.fill(0.0);
        self.prev_magnitudes.fill(0.0);
    }

    /// Shift in one hop and return the flux of the new frame.
    pub(crate) fn push(&mut self, hop: &[f32]) -> f32 {
        let n = self.frame.len();
        let hop = &hop[hop.len().saturating_sub(n)..];
        self.frame.copy_within(hop.len().., 0);
        self.frame[n - hop.len()..].copy_from_slice(hop);

        let energy: f32 = self.frame.iter().map(|s| s * s).sum();
        if (energy / n as f32).sqrt() < SILENCE_RMS {
            self.prev_magnitudes.fill(0.0);
            return 0.0;
        }

        for ((bin, s), w) in self.spectrum.iter_mut().zip(&self.frame).zip(&self.window) {
            *bin = Complex::new(s * w, 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);

        let mut flux = 0.0;
        for (prev, bin) in self.prev_magnitudes.iter_mut().zip(&self.spectrum) {
            let mag = bin.norm();
            let diff = mag - *prev;
            if diff > 0.0 {
                flux += diff;
            }
            *prev = mag;
        }
        flux
    }
}
