//! Tempo grid with 3 clocks: sample index, seconds and grid rows/ticks.
//!
//! A bar is always four beats. The grid splits each bar into `rows_per_bar`
//! rows of equal duration; the row width in samples is rounded once, so the
//! sample clock and the seconds clock agree to within half a sample per row.

use crate::error::{require_positive, Result};
use crate::Error;

/// Beats per bar assumed by the grid (4/4).
pub const BEATS_PER_BAR: f64 = 4.0;

/// Slack applied before flooring seconds into rows, so that
/// `seconds_to_row(row_to_seconds(r)) == r` survives float rounding.
const ROW_EPSILON: f64 = 1e-9;

/// Duration of one 4/4 bar at `bpm`.
#[inline]
pub fn seconds_per_bar(bpm: f64) -> f64 {
    (60.0 / bpm) * BEATS_PER_BAR
}

/// Nearest sample index for a time in seconds (negative times clamp to 0).
#[inline]
pub fn seconds_to_sample(seconds: f64, sample_rate: u32) -> usize {
    let pos = (seconds * sample_rate as f64).round();
    if pos.is_finite() && pos > 0.0 {
        pos as usize
    } else {
        0
    }
}

#[inline]
pub fn sample_to_seconds(sample: usize, sample_rate: u32) -> f64 {
    sample as f64 / sample_rate as f64
}

/// Absolute tick position of a time, at `ppq` ticks per quarter note.
pub fn seconds_to_ticks(seconds: f64, bpm: f64, ppq: u32) -> u64 {
    let ticks = (seconds * (bpm / 60.0) * ppq as f64).floor();
    if ticks.is_finite() && ticks > 0.0 {
        ticks as u64
    } else {
        0
    }
}

/// Snap a tick position to the nearest multiple of `row_ticks`.
pub fn quantize_ticks(tick: u64, row_ticks: u64) -> u64 {
    if row_ticks == 0 {
        return tick;
    }
    ((tick as f64 / row_ticks as f64).round() as u64) * row_ticks
}

/// Fixed-height row grid for one buffer at one tempo.
///
/// Cheap to build: recompute it whenever bpm or rows-per-bar change rather
/// than caching it next to the buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoGrid {
    bpm: f64,
    rows_per_bar: u32,
    sample_rate: u32,
    total_samples: usize,
    seconds_per_row: f64,
    samples_per_row: usize,
    total_rows: usize,
}

impl TempoGrid {
    pub fn new(bpm: f64, rows_per_bar: u32, sample_rate: u32, total_samples: usize) -> Result<Self> {
        require_positive("bpm", bpm)?;
        if rows_per_bar == 0 {
            return Err(Error::InvalidParameter("rows_per_bar must be at least 1".into()));
        }
        if sample_rate == 0 {
            return Err(Error::InvalidParameter("sample_rate must be positive".into()));
        }

        let seconds_per_row = seconds_per_bar(bpm) / rows_per_bar as f64;
        let samples_per_row = ((seconds_per_row * sample_rate as f64).round() as usize).max(1);
        let total_rows = total_samples.div_ceil(samples_per_row);

        Ok(Self {
            bpm,
            rows_per_bar,
            sample_rate,
            total_samples,
            seconds_per_row,
            samples_per_row,
            total_rows,
        })
    }

    #[inline]
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    #[inline]
    pub fn rows_per_bar(&self) -> u32 {
        self.rows_per_bar
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn total_samples(&self) -> usize {
        self.total_samples
    }

    #[inline]
    pub fn seconds_per_bar(&self) -> f64 {
        seconds_per_bar(self.bpm)
    }

    #[inline]
    pub fn seconds_per_row(&self) -> f64 {
        self.seconds_per_row
    }

    #[inline]
    pub fn samples_per_row(&self) -> usize {
        self.samples_per_row
    }

    /// Number of rows needed to cover the buffer. The last row may be partial.
    #[inline]
    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    #[inline]
    pub fn sample_to_row(&self, sample: usize) -> usize {
        sample / self.samples_per_row
    }

    #[inline]
    pub fn row_to_sample(&self, row: usize) -> usize {
        row * self.samples_per_row
    }

    #[inline]
    pub fn row_to_seconds(&self, row: usize) -> f64 {
        row as f64 * self.seconds_per_row
    }

    /// Row containing `seconds`. Negative or NaN times map to row 0.
    #[inline]
    pub fn seconds_to_row(&self, seconds: f64) -> usize {
        let row = (seconds / self.seconds_per_row + ROW_EPSILON).floor();
        if row.is_finite() && row > 0.0 {
            row as usize
        } else {
            0
        }
    }

    /// Whether `row` opens a bar (drawn with the heavy grid line).
    #[inline]
    pub fn is_bar_start(&self, row: usize) -> bool {
        row % self.rows_per_bar as usize == 0
    }

    /// Ticks covered by one row at `ppq` ticks per quarter note (at least 1).
    pub fn row_ticks(&self, ppq: u32) -> u64 {
        let ticks = (ppq as f64 * BEATS_PER_BAR / self.rows_per_bar as f64).round() as u64;
        ticks.max(1)
    }

    /// Same grid at a different tempo or subdivision, for the same buffer.
    pub fn with_tempo(&self, bpm: f64, rows_per_bar: u32) -> Result<Self> {
        Self::new(bpm, rows_per_bar, self.sample_rate, self.total_samples)
    }
}
