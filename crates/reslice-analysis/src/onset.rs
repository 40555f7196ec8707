//! Spectral-flux onset detection.
//!
//! Each hop produces one flux value. A frame is reported as an onset when its
//! flux is a local maximum that clears an adaptive threshold built from the
//! recent flux history:
//!
//! ```text
//! level = median(history) + threshold * mean(history) + FLUX_FLOOR
//! ```
//!
//! A peak can only be confirmed once the following hop has been seen, so
//! onsets are reported one hop late. The reported time is the start of the
//! newest hop in the peak frame.

use crate::analyzer::OnsetDetector;
use crate::flux::SpectralFlux;
use reslice_core::{Error, Result};
use std::collections::VecDeque;

/// Flux values kept for the adaptive threshold.
const HISTORY_LEN: usize = 8;

/// Absolute floor under the adaptive threshold.
const FLUX_FLOOR: f32 = 0.01;

/// Streaming spectral-flux onset detector.
pub struct SpectralFluxOnsets {
    sample_rate: u32,
    hop_size: usize,
    flux: SpectralFlux,
    /// Relative threshold over the history mean (0.0 - 1.0)
    threshold: f32,
    /// Minimum gap between reported onsets in samples
    min_gap: usize,
    history: VecDeque<f32>,
    sorted: Vec<f32>,
    before: f32,
    candidate: f32,
    hops_seen: usize,
    last_onset: Option<usize>,
}

impl SpectralFluxOnsets {
    /// Create a detector for hops of `hop_size` samples analysed through a
    /// window of `window_size` samples.
    pub fn new(sample_rate: u32, window_size: usize, hop_size: usize) -> Result<Self> {
        if sample_rate == 0 {
            return Err(Error::InvalidParameter("sample_rate must be positive".into()));
        }
        if hop_size == 0 || window_size < hop_size {
            return Err(Error::InvalidParameter(format!(
                "need 0 < hop_size <= window_size, got hop {hop_size}, window {window_size}"
            )));
        }

        Ok(Self {
            sample_rate,
            hop_size,
            flux: SpectralFlux::new(window_size),
            threshold: 0.3,
            min_gap: (sample_rate as f64 * 0.05) as usize, // 50ms minimum gap
            history: VecDeque::with_capacity(HISTORY_LEN + 1),
            sorted: Vec::with_capacity(HISTORY_LEN),
            before: 0.0,
            candidate: 0.0,
            hops_seen: 0,
            last_onset: None,
        })
    }

    /// Set detection threshold (0.0 - 1.0)
    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold.clamp(0.0, 1.0);
    }

    /// Set minimum gap between detections in milliseconds
    pub fn set_min_gap_ms(&mut self, gap_ms: f32) {
        self.min_gap = (gap_ms.max(0.0) / 1000.0 * self.sample_rate as f32) as usize;
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    fn level(&mut self) -> f32 {
        if self.history.is_empty() {
            return FLUX_FLOOR;
        }
        self.sorted.clear();
        self.sorted.extend(self.history.iter().copied());
        self.sorted.sort_unstable_by(f32::total_cmp);

        let median = self.sorted[self.sorted.len() / 2];
        let mean = self.sorted.iter().sum::<f32>() / self.sorted.len() as f32;
        median + self.threshold * mean + FLUX_FLOOR
    }
}

impl OnsetDetector for SpectralFluxOnsets {
    fn process(&mut self, hop: &[f32]) -> Option<f64> {
        let value = self.flux.push(hop);
        let frame = self.hops_seen;
        self.hops_seen += 1;

        let mut onset = None;
        if frame > 0 {
            let peak = frame - 1;
            let is_peak = self.candidate > self.before && self.candidate >= value;
            if is_peak && self.candidate > self.level() {
                let position = peak * self.hop_size;
                let clear = self
                    .last_onset
                    .map_or(true, |last| position >= last + self.min_gap);
                if clear {
                    self.last_onset = Some(position);
                    onset = Some(position as f64 / self.sample_rate as f64);
                }
            }

            self.history.push_back(self.candidate);
            if self.history.len() > HISTORY_LEN {
                self.history.pop_front();
            }
            self.before = self.candidate;
        }
        self.candidate = value;

        onset
    }

    fn reset(&mut self) {
        self.flux.reset();
        self.history.clear();
        self.before = 0.0;
        self.candidate = 0.0;
        self.hops_seen = 0;
        self.last_onset = None;
    }
}
