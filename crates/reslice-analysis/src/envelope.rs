//! Per-block envelope cache for drawing the waveform next to the grid.
//!
//! The buffer is cut into consecutive blocks of `samples_per_block` samples
//! (the last one may be short). Each block stores its min/max/RMS and, in
//! [`EnvelopeMode::Spectral`], the share of spectral magnitude falling into
//! three bands: below 200 Hz, 200 Hz to 2 kHz, and above 2 kHz.

use crate::flux::hann_window;
use reslice_core::{Error, Result, TempoGrid};
use rustfft::{num_complex::Complex, FftPlanner};
use std::ops::Range;

/// Upper edge of the low band in Hz
pub const LOW_BAND_HZ: f32 = 200.0;
/// Upper edge of the mid band in Hz
pub const HIGH_BAND_HZ: f32 = 2000.0;

/// Added to the band total before normalizing, so silence maps to zeros.
const BAND_EPSILON: f32 = 1e-8;

/// What each block carries besides its levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum EnvelopeMode {
    /// Peak levels only
    #[default]
    Peak,
    /// Levels plus low/mid/high band energy
    Spectral,
}

/// Normalized band energy: the three shares sum to ~1, or are all zero for a
/// silent block.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct BandEnergy {
    pub low: f32,
    pub mid: f32,
    pub high: f32,
}

impl BandEnergy {
    pub fn as_array(&self) -> [f32; 3] {
        [self.low, self.mid, self.high]
    }
}

/// A single block of envelope data
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct EnvelopeBlock {
    /// Minimum sample value in this block
    pub min: f32,
    /// Maximum sample value in this block
    pub max: f32,
    /// RMS level of this block
    pub rms: f32,
    /// Band energy, present in spectral mode
    pub bands: Option<BandEnergy>,
}

impl EnvelopeBlock {
    #[inline]
    pub fn peak(&self) -> f32 {
        self.min.abs().max(self.max.abs())
    }
}

/// Envelope of a whole buffer.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Envelope {
    blocks: Vec<EnvelopeBlock>,
    samples_per_block: usize,
    total_samples: usize,
    mode: EnvelopeMode,
}

impl Envelope {
    /// Compute the envelope of `samples`.
    pub fn compute(
        samples: &[f32],
        sample_rate: u32,
        samples_per_block: usize,
        mode: EnvelopeMode,
    ) -> Result<Self> {
        if samples_per_block == 0 {
            return Err(Error::InvalidParameter(
                "samples_per_block must be at least 1".into(),
            ));
        }
        if sample_rate == 0 {
            return Err(Error::InvalidParameter("sample_rate must be positive".into()));
        }

        let mut blocks: Vec<EnvelopeBlock> = samples
            .chunks(samples_per_block)
            .map(compute_block)
            .collect();

        if mode == EnvelopeMode::Spectral {
            let mut bands = BandAnalyzer::new(samples_per_block, sample_rate);
            for (block, chunk) in blocks.iter_mut().zip(samples.chunks(samples_per_block)) {
                block.bands = Some(bands.analyze(chunk));
            }
        }

        Ok(Self {
            blocks,
            samples_per_block,
            total_samples: samples.len(),
            mode,
        })
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn mode(&self) -> EnvelopeMode {
        self.mode
    }

    pub fn samples_per_block(&self) -> usize {
        self.samples_per_block
    }

    pub fn total_samples(&self) -> usize {
        self.total_samples
    }

    pub fn blocks(&self) -> &[EnvelopeBlock] {
        &self.blocks
    }

    pub fn block(&self, index: usize) -> Option<&EnvelopeBlock> {
        self.blocks.get(index)
    }

    /// Block holding `sample`, clamped to the last block.
    pub fn block_index(&self, sample: usize) -> Option<usize> {
        let last = self.blocks.len().checked_sub(1)?;
        Some((sample / self.samples_per_block).min(last))
    }

    /// Envelope at `sample`, clamped to the last block. `None` when empty.
    pub fn at_sample(&self, sample: usize) -> Option<&EnvelopeBlock> {
        self.block_index(sample).map(|i| &self.blocks[i])
    }

    /// Blocks overlapping grid row `row`. Empty past the end of the buffer.
    pub fn blocks_for_row(&self, grid: &TempoGrid, row: usize) -> Range<usize> {
        let start = grid.row_to_sample(row).min(self.total_samples);
        let end = grid.row_to_sample(row + 1).min(self.total_samples);
        let first = start / self.samples_per_block;
        let last = end.div_ceil(self.samples_per_block);
        first.min(self.blocks.len())..last.min(self.blocks.len())
    }

    /// Get the overall peak level
    pub fn peak(&self) -> f32 {
        self.blocks
            .iter()
            .map(EnvelopeBlock::peak)
            .fold(0.0f32, f32::max)
    }

    /// Get the average RMS level
    pub fn average_rms(&self) -> f32 {
        if self.blocks.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.blocks.iter().map(|b| b.rms).sum();
        sum / self.blocks.len() as f32
    }
}

fn compute_block(samples: &[f32]) -> EnvelopeBlock {
    let mut min = f32::MAX;
    let mut max = f32::MIN;
    let mut sum_sq = 0.0f32;

    for &s in samples {
        min = min.min(s);
        max = max.max(s);
        sum_sq += s * s;
    }

    EnvelopeBlock {
        min,
        max,
        rms: (sum_sq / samples.len() as f32).sqrt(),
        bands: None,
    }
}

/// Windowed FFT over one block, split into three bands.
struct BandAnalyzer {
    fft: std::sync::Arc<dyn rustfft::Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    bin_hz: f32,
}

impl BandAnalyzer {
    fn new(block_size: usize, sample_rate: u32) -> Self {
        let fft_size = block_size.next_power_of_two();
        Self {
            fft: FftPlanner::new().plan_fft_forward(fft_size),
            window: hann_window(block_size),
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            bin_hz: sample_rate as f32 / fft_size as f32,
        }
    }

    fn analyze(&mut self, block: &[f32]) -> BandEnergy {
        self.buffer.fill(Complex::new(0.0, 0.0));
        for ((bin, s), w) in self.buffer.iter_mut().zip(block).zip(&self.window) {
            *bin = Complex::new(s * w, 0.0);
        }
        self.fft.process(&mut self.buffer);

        let mut bands = [0.0f32; 3];
        for (k, c) in self.buffer[..=self.buffer.len() / 2].iter().enumerate() {
            let freq = k as f32 * self.bin_hz;
            let band = if freq < LOW_BAND_HZ {
                0
            } else if freq < HIGH_BAND_HZ {
                1
            } else {
                2
            };
            bands[band] += c.norm();
        }

        let total = bands.iter().sum::<f32>() + BAND_EPSILON;
        BandEnergy {
            low: bands[0] / total,
            mid: bands[1] / total,
            high: bands[2] / total,
        }
    }
}
