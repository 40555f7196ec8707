//! Playable regions derived from markers.
//!
//! Regions are never stored on their own: they are recomputed from the
//! marker list whenever they are needed, so they cannot go stale.

use crate::error::{Error, Result};
use crate::grid::TempoGrid;
use crate::marker::Marker;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Deref, RangeInclusive};

/// Pitch id given to the first region unless configured otherwise (C2).
pub const DEFAULT_BASE_PITCH: i32 = 36;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Note label for a pitch id, e.g. 36 -> "C2", 61 -> "C#4".
pub fn note_name(pitch_id: i32) -> String {
    let pc = pitch_id.rem_euclid(12) as usize;
    let octave = pitch_id.div_euclid(12) - 1;
    format!("{}{}", NOTE_NAMES[pc], octave)
}

/// Half-open sample range `[start_sample, end_sample)` tagged with a pitch id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub start_sample: usize,
    pub end_sample: usize,
    pub pitch_id: i32,
}

impl Region {
    pub fn new(start_sample: usize, end_sample: usize, pitch_id: i32) -> Self {
        Self {
            start_sample,
            end_sample,
            pitch_id,
        }
    }

    /// Length in samples (0 for degenerate regions).
    #[inline]
    pub fn len(&self) -> usize {
        self.end_sample.saturating_sub(self.start_sample)
    }

    /// Zero or negative length. Such regions are kept but must not be played.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.end_sample <= self.start_sample
    }

    #[inline]
    pub fn is_playable(&self) -> bool {
        !self.is_degenerate()
    }

    #[inline]
    pub fn contains(&self, sample: usize) -> bool {
        sample >= self.start_sample && sample < self.end_sample
    }

    pub fn note_name(&self) -> String {
        note_name(self.pitch_id)
    }

    /// Rows touched by this region, or `None` for a degenerate region.
    pub fn row_span(&self, grid: &TempoGrid) -> Option<RangeInclusive<usize>> {
        if self.is_degenerate() {
            return None;
        }
        Some(grid.sample_to_row(self.start_sample)..=grid.sample_to_row(self.end_sample - 1))
    }

    /// Playhead position inside the region in `0.0..=1.0`.
    pub fn fraction(&self, cursor: usize) -> f32 {
        let offset = cursor.saturating_sub(self.start_sample).min(self.len());
        offset as f32 / self.len().max(1) as f32
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<region> key={} offset={} end={}",
            self.pitch_id, self.start_sample, self.end_sample
        )
    }
}

/// Ordered, contiguous partition of `[0, total_samples)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Regions {
    regions: Vec<Region>,
    total_samples: usize,
}

impl Deref for Regions {
    type Target = [Region];

    fn deref(&self) -> &[Region] {
        &self.regions
    }
}

impl IntoIterator for Regions {
    type Item = Region;
    type IntoIter = std::vec::IntoIter<Region>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions.into_iter()
    }
}

impl<'a> IntoIterator for &'a Regions {
    type Item = &'a Region;
    type IntoIter = std::slice::Iter<'a, Region>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions.iter()
    }
}

impl Regions {
    pub fn total_samples(&self) -> usize {
        self.total_samples
    }

    pub fn into_vec(self) -> Vec<Region> {
        self.regions
    }

    /// Regions with a non-zero length. Pitch ids are not renumbered.
    pub fn playable(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter().filter(|r| r.is_playable())
    }

    /// Zero-length regions with their index, for the caller to decide on.
    pub fn degenerate(&self) -> Vec<(usize, Region)> {
        self.regions
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_degenerate())
            .map(|(i, r)| (i, *r))
            .collect()
    }

    /// Fail on an empty buffer or on the first zero-length region.
    pub fn validate(&self) -> Result<()> {
        if self.total_samples == 0 {
            return Err(Error::EmptyBuffer);
        }
        match self.regions.iter().position(Region::is_degenerate) {
            Some(index) => {
                let r = self.regions[index];
                Err(Error::DegenerateRegion {
                    index,
                    start: r.start_sample,
                    end: r.end_sample,
                })
            }
            None => Ok(()),
        }
    }

    /// Region containing `sample`, with its index.
    pub fn find(&self, sample: usize) -> Option<(usize, &Region)> {
        // Contiguous and sorted: the candidate is the last region starting at or before `sample`.
        let idx = self
            .regions
            .partition_point(|r| r.start_sample <= sample)
            .checked_sub(1)?;
        self.regions[idx..]
            .iter()
            .enumerate()
            .find(|(_, r)| r.contains(sample))
            .map(|(i, r)| (idx + i, r))
    }

    /// Regions whose start falls on `row`, in order.
    pub fn starting_on_row<'a>(
        &'a self,
        grid: &'a TempoGrid,
        row: usize,
    ) -> impl Iterator<Item = &'a Region> + 'a {
        self.regions
            .iter()
            .filter(move |r| grid.sample_to_row(r.start_sample) == row)
    }
}

/// Turn markers into contiguous regions covering `[0, total_samples)`.
///
/// Region `i` ends where marker `i + 1` starts; the last region ends at
/// `total_samples`. The first region always starts at sample 0, so audio
/// before the first marker belongs to the first slice. Marker positions past
/// the buffer clamp to `total_samples`. Markers that round to the same sample
/// produce zero-length regions, which are kept (see [`Regions::degenerate`]).
pub fn derive_regions(
    markers: &[Marker],
    sample_rate: u32,
    total_samples: usize,
    base_pitch: i32,
) -> Regions {
    if markers.is_empty() {
        return Regions {
            regions: vec![Region::new(0, total_samples, base_pitch)],
            total_samples,
        };
    }

    let boundary = |i: usize| markers[i].sample(sample_rate).min(total_samples);

    let regions = (0..markers.len())
        .map(|i| {
            let start = if i == 0 { 0 } else { boundary(i) };
            let end = if i + 1 < markers.len() {
                boundary(i + 1)
            } else {
                total_samples
            };
            let offset = i32::try_from(i).unwrap_or(i32::MAX);
            Region::new(start, end, base_pitch.saturating_add(offset))
        })
        .collect();

    Regions {
        regions,
        total_samples,
    }
}
