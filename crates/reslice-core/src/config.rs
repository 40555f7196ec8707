//! Slicer configuration.

use crate::error::{require_positive, Error, Result};
use crate::marker::DEDUP_EPSILON;
use crate::region::DEFAULT_BASE_PITCH;
use serde::{Deserialize, Serialize};

/// Tempo grid, quantizer, analyzer and playback settings for a slice session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SliceConfig {
    /// Tempo used for the row grid and for quantizing onsets.
    pub bpm: f64,
    /// Rows drawn per 4/4 bar.
    pub rows_per_bar: u32,
    /// Pitch id of the first region. Later ids saturate at `i32::MAX`.
    pub base_pitch: i32,
    /// Quantize steps per bar applied to detected onsets.
    pub subdivision: u32,
    /// Analyzer hop in samples.
    pub hop_size: usize,
    /// Analyzer window in samples.
    pub window_size: usize,
    /// Envelope cache block size in samples.
    pub samples_per_block: usize,
    /// Onsets closer than this many seconds collapse into one marker.
    /// Zero collapses only identical times.
    pub dedup_epsilon: f64,
    /// Playback gain.
    pub volume: f32,
    /// Window played in place of a degenerate range, in seconds.
    pub fallback_window: f64,
    /// Tick resolution handed to tick-based exporters.
    pub ticks_per_quarter: u32,
}

impl Default for SliceConfig {
    fn default() -> Self {
        Self {
            bpm: 140.0,
            rows_per_bar: 16,
            base_pitch: DEFAULT_BASE_PITCH,
            subdivision: 24,
            hop_size: 512,
            window_size: 1024,
            samples_per_block: 1024,
            dedup_epsilon: DEDUP_EPSILON,
            volume: 0.8,
            fallback_window: 0.5,
            ticks_per_quarter: 480,
        }
    }
}

impl SliceConfig {
    pub fn validate(&self) -> Result<()> {
        require_positive("bpm", self.bpm)?;
        require_positive("fallback_window", self.fallback_window)?;

        for (name, value) in [
            ("rows_per_bar", self.rows_per_bar as usize),
            ("subdivision", self.subdivision as usize),
            ("hop_size", self.hop_size),
            ("window_size", self.window_size),
            ("samples_per_block", self.samples_per_block),
            ("ticks_per_quarter", self.ticks_per_quarter as usize),
        ] {
            if value == 0 {
                return Err(Error::InvalidParameter(format!("{name} must be at least 1")));
            }
        }

        if self.window_size < self.hop_size {
            return Err(Error::InvalidParameter(format!(
                "window_size {} is smaller than hop_size {}",
                self.window_size, self.hop_size
            )));
        }
        if !(self.dedup_epsilon.is_finite() && self.dedup_epsilon >= 0.0) {
            return Err(Error::InvalidParameter(format!(
                "dedup_epsilon must be non-negative, got {}",
                self.dedup_epsilon
            )));
        }
        if !(self.volume.is_finite() && self.volume >= 0.0) {
            return Err(Error::InvalidParameter(format!(
                "volume must be non-negative, got {}",
                self.volume
            )));
        }
        Ok(())
    }
}
