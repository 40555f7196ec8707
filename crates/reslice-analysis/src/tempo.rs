//! Tempo estimation by autocorrelating the spectral-flux novelty curve.

use crate::analyzer::TempoEstimator;
use crate::flux::SpectralFlux;
use reslice_core::{Error, Result};
use std::collections::VecDeque;

const MIN_BPM: f32 = 60.0;
const MAX_BPM: f32 = 200.0;

/// Novelty history the autocorrelation runs over.
const HISTORY_SECONDS: f32 = 6.0;
/// Nothing is reported until this much audio has been seen.
const MIN_HISTORY_SECONDS: f32 = 2.0;
/// Interval between reported estimates.
const REPORT_SECONDS: f32 = 0.5;

/// Centre and width (in octaves) of the preference curve over tempo.
const PREFERRED_BPM: f32 = 120.0;
const PREFERENCE_OCTAVES: f32 = 1.0;

/// Triangular smoothing applied to the novelty curve.
const SMOOTHING: [f32; 5] = [1.0 / 9.0, 2.0 / 9.0, 3.0 / 9.0, 2.0 / 9.0, 1.0 / 9.0];

/// Streaming tempo estimator.
///
/// Keeps a few seconds of spectral-flux novelty and, every half second once
/// enough history exists, picks the autocorrelation peak among the lags that
/// correspond to 60..200 bpm. Lags are weighted by a log-Gaussian centred on
/// 120 bpm to settle octave ambiguity, and the winning lag is refined by
/// parabolic interpolation before conversion to bpm.
pub struct FluxTempoEstimator {
    sample_rate: u32,
    hop_size: usize,
    flux: SpectralFlux,
    novelty: VecDeque<f32>,
    centered: Vec<f32>,
    capacity: usize,
    min_history: usize,
    report_every: usize,
    since_report: usize,
    min_lag: usize,
    max_lag: usize,
}

impl FluxTempoEstimator {
    pub fn new(sample_rate: u32, window_size: usize, hop_size: usize) -> Result<Self> {
        if sample_rate == 0 {
            return Err(Error::InvalidParameter("sample_rate must be positive".into()));
        }
        if hop_size == 0 || window_size < hop_size {
            return Err(Error::InvalidParameter(format!(
                "need 0 < hop_size <= window_size, got hop {hop_size}, window {window_size}"
            )));
        }

        let hops_per_second = sample_rate as f32 / hop_size as f32;
        let hops = |seconds: f32| ((seconds * hops_per_second).ceil() as usize).max(1);
        let min_lag = ((60.0 / MAX_BPM * hops_per_second).floor() as usize).max(1);
        let max_lag = hops(60.0 / MIN_BPM).max(min_lag + 1);
        let capacity = hops(HISTORY_SECONDS).max(2 * max_lag + 2);

        Ok(Self {
            sample_rate,
            hop_size,
            flux: SpectralFlux::new(window_size),
            novelty: VecDeque::with_capacity(capacity + 1),
            centered: Vec::with_capacity(capacity),
            capacity,
            min_history: hops(MIN_HISTORY_SECONDS).max(2 * max_lag),
            report_every: hops(REPORT_SECONDS),
            since_report: 0,
            min_lag,
            max_lag,
        })
    }

    fn lag_to_bpm(&self, lag: f32) -> f32 {
        60.0 * self.sample_rate as f32 / (lag * self.hop_size as f32)
    }

    /// Weighted autocorrelation of the centred novelty at `lag`.
    fn score(&self, lag: usize) -> f32 {
        let acf: f32 = self
            .centered
            .iter()
            .zip(&self.centered[lag..])
            .map(|(a, b)| a * b)
            .sum();
        let octaves = (self.lag_to_bpm(lag as f32) / PREFERRED_BPM).log2() / PREFERENCE_OCTAVES;
        acf * (-0.5 * octaves * octaves).exp()
    }

    fn estimate(&mut self) -> Option<f32> {
        let n = self.novelty.len();
        self.centered.clear();
        self.centered.extend((0..n).map(|i| {
            SMOOTHING
                .iter()
                .enumerate()
                .filter_map(|(k, w)| {
                    let j = (i + k).checked_sub(SMOOTHING.len() / 2)?;
                    self.novelty.get(j).map(|v| v * w)
                })
                .sum::<f32>()
        }));
        let mean = self.centered.iter().sum::<f32>() / n as f32;
        for v in &mut self.centered {
            *v -= mean;
        }

        let mut best_lag = 0;
        let mut best = 0.0;
        for lag in self.min_lag..=self.max_lag {
            let value = self.score(lag);
            if value > best {
                best = value;
                best_lag = lag;
            }
        }
        if best_lag == 0 {
            return None;
        }

        let prev = self.score(best_lag - 1);
        let next = self.score(best_lag + 1);
        let curvature = prev - 2.0 * best + next;
        let shift = if curvature < 0.0 {
            (0.5 * (prev - next) / curvature).clamp(-0.5, 0.5)
        } else {
            0.0
        };

        Some(self.lag_to_bpm(best_lag as f32 + shift))
    }
}

impl TempoEstimator for FluxTempoEstimator {
    fn process(&mut self, hop: &[f32]) -> Option<f32> {
        let value = self.flux.push(hop);
        self.novelty.push_back(value);
        if self.novelty.len() > self.capacity {
            self.novelty.pop_front();
        }

        self.since_report += 1;
        if self.novelty.len() < self.min_history || self.since_report < self.report_every {
            return None;
        }
        self.since_report = 0;
        self.estimate()
    }

    fn reset(&mut self) {
        self.flux.reset();
        self.novelty.clear();
        self.since_report = 0;
    }
}
