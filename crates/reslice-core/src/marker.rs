//! Slice markers: sorted, deduplicated time points in seconds.
//!
//! Every mutation (bulk replace, insert, remove, move) re-sorts the list and
//! collapses runs of markers closer than the dedup epsilon, so the list is
//! always strictly increasing with a minimum spacing.

use crate::error::{Error, Result};
use crate::grid::{seconds_per_bar, seconds_to_sample, TempoGrid};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Markers closer than this (in seconds) collapse into one.
pub const DEDUP_EPSILON: f64 = 0.001;

/// A slice point in seconds from the start of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub time: f64,
}

impl Marker {
    pub fn new(time: f64) -> Self {
        Self { time }
    }

    /// Nearest sample index at `sample_rate`.
    #[inline]
    pub fn sample(&self, sample_rate: u32) -> usize {
        seconds_to_sample(self.time, sample_rate)
    }
}

/// Width of one quantize step: a bar divided into `subdivision` steps.
///
/// Returns `None` when quantization must be skipped (non-positive bpm or a
/// zero subdivision); markers then stay at their raw times.
pub fn quantize_unit(bpm: f64, subdivision: u32) -> Option<f64> {
    if !(bpm.is_finite() && bpm > 0.0) || subdivision == 0 {
        return None;
    }
    Some(seconds_per_bar(bpm) / subdivision as f64)
}

/// Snap `time` to the nearest multiple of `unit`.
#[inline]
pub fn quantize_time(time: f64, unit: f64) -> f64 {
    (time / unit).round() * unit
}

/// Snap every time onto the tempo grid. Returns false if quantization was skipped.
pub fn quantize_times(times: &mut [f64], bpm: f64, subdivision: u32) -> bool {
    let Some(unit) = quantize_unit(bpm, subdivision) else {
        return false;
    };
    for t in times.iter_mut() {
        *t = quantize_time(*t, unit);
    }
    true
}

/// Sort ascending and collapse runs closer than `epsilon` into their first member.
///
/// Equal times always collapse, so the result is strictly increasing even
/// with a zero epsilon.
pub fn sort_and_dedup(times: &mut Vec<f64>, epsilon: f64) {
    times.retain(|t| t.is_finite() && *t >= 0.0);
    times.sort_by(|a, b| a.total_cmp(b));
    times.dedup_by(|next, kept| *next <= *kept || *next - *kept < epsilon);
}

/// Ordered marker sequence with the dedup invariant.
///
/// Deserialized lists go through the same sort and dedup as every edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawMarkerList")]
pub struct MarkerList {
    markers: Vec<Marker>,
    epsilon: f64,
}

#[derive(Deserialize)]
struct RawMarkerList {
    markers: Vec<Marker>,
    #[serde(default = "default_epsilon")]
    epsilon: f64,
}

fn default_epsilon() -> f64 {
    DEDUP_EPSILON
}

impl From<RawMarkerList> for MarkerList {
    fn from(raw: RawMarkerList) -> Self {
        Self::from_times(raw.markers.into_iter().map(|m| m.time), raw.epsilon)
    }
}

impl Default for MarkerList {
    fn default() -> Self {
        Self::new(DEDUP_EPSILON)
    }
}

impl MarkerList {
    /// Negative or non-finite `epsilon` is treated as zero.
    pub fn new(epsilon: f64) -> Self {
        let epsilon = if epsilon.is_finite() { epsilon.max(0.0) } else { 0.0 };
        Self {
            markers: Vec::new(),
            epsilon,
        }
    }

    /// Build from raw times. Negative and non-finite times are dropped.
    pub fn from_times(times: impl IntoIterator<Item = f64>, epsilon: f64) -> Self {
        let mut list = Self::new(epsilon);
        list.replace(times);
        list
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn as_slice(&self) -> &[Marker] {
        &self.markers
    }

    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.markers.iter()
    }

    pub fn get(&self, index: usize) -> Option<Marker> {
        self.markers.get(index).copied()
    }

    pub fn times(&self) -> Vec<f64> {
        self.markers.iter().map(|m| m.time).collect()
    }

    pub fn clear(&mut self) {
        self.markers.clear();
    }

    /// Replace every marker (detection result).
    pub fn replace(&mut self, times: impl IntoIterator<Item = f64>) {
        let times: Vec<f64> = times.into_iter().collect();
        self.set_times(times);
    }

    fn set_times(&mut self, mut times: Vec<f64>) {
        sort_and_dedup(&mut times, self.epsilon);
        self.markers = times.into_iter().map(Marker::new).collect();
    }

    /// Insert one marker. Returns false if the time is invalid or collapses
    /// into an existing marker.
    pub fn insert_marker(&mut self, time: f64) -> bool {
        if !(time.is_finite() && time >= 0.0) {
            return false;
        }
        let before = self.markers.len();
        let mut times = self.times();
        times.push(time);
        self.set_times(times);
        self.markers.len() > before
    }

    /// Remove every marker whose time lies in `range` (half-open). Returns the count removed.
    pub fn remove_markers_in(&mut self, range: Range<f64>) -> usize {
        let before = self.markers.len();
        self.markers.retain(|m| !range.contains(&m.time));
        before - self.markers.len()
    }

    /// Move marker `index` to `new_time`, then re-sort and re-dedup.
    ///
    /// Returns the index the marker ends up at. If it lands within the dedup
    /// epsilon of a neighbour, the two collapse and the survivor's index is returned.
    pub fn move_marker(&mut self, index: usize, new_time: f64) -> Result<usize> {
        if index >= self.markers.len() {
            return Err(Error::OutOfRangeIndex {
                index,
                len: self.markers.len(),
            });
        }
        if !(new_time.is_finite() && new_time >= 0.0) {
            return Err(Error::InvalidParameter(format!(
                "marker time must be a non-negative number, got {new_time}"
            )));
        }

        let mut times = self.times();
        times[index] = new_time;
        self.set_times(times);

        Ok(self.nearest_index(new_time).unwrap_or(0))
    }

    /// Re-quantize all markers onto the grid; only done when explicitly requested.
    pub fn quantize(&mut self, bpm: f64, subdivision: u32) -> bool {
        let mut times = self.times();
        let applied = quantize_times(&mut times, bpm, subdivision);
        self.set_times(times);
        applied
    }

    fn nearest_index(&self, time: f64) -> Option<usize> {
        self.markers
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (a.time - time).abs().total_cmp(&(b.time - time).abs()))
            .map(|(i, _)| i)
    }

    // Row-level editing (grid clicks)

    /// Whether any marker's sample falls inside `row`.
    pub fn has_marker_on_row(&self, grid: &TempoGrid, row: usize) -> bool {
        let sr = grid.sample_rate();
        self.markers
            .iter()
            .any(|m| grid.sample_to_row(m.sample(sr)) == row)
    }

    /// Add a marker at the start of `row` unless the row already carries one.
    pub fn add_at_row(&mut self, grid: &TempoGrid, row: usize) -> bool {
        if self.has_marker_on_row(grid, row) {
            return false;
        }
        self.insert_marker(grid.row_to_seconds(row))
    }

    /// Remove every marker whose sample falls inside `row`.
    pub fn remove_row(&mut self, grid: &TempoGrid, row: usize) -> usize {
        let sr = grid.sample_rate();
        let before = self.markers.len();
        self.markers
            .retain(|m| grid.sample_to_row(m.sample(sr)) != row);
        before - self.markers.len()
    }

    /// Rows carrying at least one marker, ascending and unique.
    pub fn marker_rows(&self, grid: &TempoGrid) -> Vec<usize> {
        let sr = grid.sample_rate();
        let mut rows: Vec<usize> = self
            .markers
            .iter()
            .map(|m| grid.sample_to_row(m.sample(sr)))
            .collect();
        rows.dedup();
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn is_strictly_spaced(list: &MarkerList) -> bool {
        list.as_slice()
            .windows(2)
            .all(|w| w[1].time > w[0].time && w[1].time - w[0].time >= list.epsilon())
    }

    #[test]
    fn test_from_times_sorts_and_dedups() {
        let list = MarkerList::from_times([0.5, 0.1, 0.1004, 0.3, f64::NAN, -1.0], DEDUP_EPSILON);
        assert_eq!(list.times(), vec![0.1, 0.3, 0.5]);
    }

    #[test]
    fn test_dedup_keeps_first_of_run() {
        let mut times = vec![0.2000, 0.2006, 0.2012, 0.4];
        sort_and_dedup(&mut times, 0.001);
        // Each survivor is compared with the last kept marker, not its raw neighbour.
        assert_eq!(times, vec![0.2000, 0.2012, 0.4]);
    }

    #[test]
    fn test_quantize_unit_skips_degenerate_tempo() {
        assert!(quantize_unit(0.0, 24).is_none());
        assert!(quantize_unit(-10.0, 24).is_none());
        assert!(quantize_unit(120.0, 0).is_none());

        let unit = quantize_unit(120.0, 16).unwrap();
        assert_relative_eq!(unit, 0.125);

        let mut times = vec![0.13, 0.26];
        assert!(!quantize_times(&mut times, 0.0, 16));
        assert_eq!(times, vec![0.13, 0.26]);
    }

    #[test]
    fn test_insert_marker() {
        let mut list = MarkerList::default();
        assert!(list.insert_marker(1.0));
        assert!(list.insert_marker(0.5));
        assert!(!list.insert_marker(1.0004));
        assert!(!list.insert_marker(-0.1));
        assert!(!list.insert_marker(f64::INFINITY));
        assert_eq!(list.times(), vec![0.5, 1.0]);
    }

    #[test]
    fn test_remove_markers_in_range() {
        let mut list = MarkerList::from_times([0.1, 0.2, 0.3, 0.4], DEDUP_EPSILON);
        assert_eq!(list.remove_markers_in(0.2..0.4), 2);
        assert_eq!(list.times(), vec![0.1, 0.4]);
        assert_eq!(list.remove_markers_in(5.0..6.0), 0);
    }

    #[test]
    fn test_move_marker_resorts() {
        let mut list = MarkerList::from_times([0.1, 0.2, 0.3], DEDUP_EPSILON);
        let idx = list.move_marker(0, 0.25).unwrap();
        assert_eq!(list.times(), vec![0.2, 0.25, 0.3]);
        assert_eq!(idx, 1);
    }

    #[test]
    fn test_move_marker_collapses_into_neighbour() {
        let mut list = MarkerList::from_times([0.1, 0.2, 0.3], DEDUP_EPSILON);
        let idx = list.move_marker(0, 0.2003).unwrap();
        assert_eq!(list.times(), vec![0.2, 0.3]);
        assert_eq!(idx, 0);
    }

    #[test]
    fn test_move_marker_out_of_range() {
        let mut list = MarkerList::from_times([0.1], DEDUP_EPSILON);
        assert_eq!(
            list.move_marker(3, 0.5),
            Err(Error::OutOfRangeIndex { index: 3, len: 1 })
        );
        assert!(matches!(
            list.move_marker(0, f64::NAN),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_row_editing() {
        // 120 bpm, 4 rows per bar: 0.5 s per row, 22050 samples per row.
        let grid = TempoGrid::new(120.0, 4, 44100, 441_000).unwrap();
        let mut list = MarkerList::default();

        assert!(list.add_at_row(&grid, 3));
        assert!(!list.add_at_row(&grid, 3));
        assert!(list.insert_marker(1.6)); // also row 3
        assert_eq!(list.marker_rows(&grid), vec![3]);

        assert!(list.add_at_row(&grid, 0));
        assert_eq!(list.marker_rows(&grid), vec![0, 3]);

        assert_eq!(list.remove_row(&grid, 3), 2);
        assert_eq!(list.times(), vec![0.0]);
    }

    #[test]
    fn test_requantize_on_request() {
        let mut list = MarkerList::from_times([0.13, 0.26, 0.37], DEDUP_EPSILON);
        assert!(list.quantize(120.0, 16));
        assert_eq!(list.times(), vec![0.125, 0.25, 0.375]);
    }

    #[test]
    fn test_serde_round_trip() {
        let list = MarkerList::from_times([0.25, 0.5], DEDUP_EPSILON);
        let json = serde_json::to_string(&list).unwrap();
        let back: MarkerList = serde_json::from_str(&json).unwrap();
        assert_eq!(back, list);
    }

    #[test]
    fn test_deserialize_sorts_and_dedups() {
        let json = r#"{"markers":[{"time":0.5},{"time":0.1},{"time":0.1},{"time":-2.0}],"epsilon":0.001}"#;
        let list: MarkerList = serde_json::from_str(json).unwrap();
        assert_eq!(list.times(), vec![0.1, 0.5]);

        let list: MarkerList = serde_json::from_str(r#"{"markers":[{"time":0.3},{"time":0.3004}]}"#).unwrap();
        assert_eq!(list.epsilon(), DEDUP_EPSILON);
        assert_eq!(list.times(), vec![0.3]);
    }

    #[test]
    fn test_zero_epsilon_still_collapses_equal_times() {
        let list = MarkerList::from_times([0.25, 0.25, 0.5, 0.2501], 0.0);
        assert_eq!(list.times(), vec![0.25, 0.2501, 0.5]);
        assert!(is_strictly_spaced(&list));

        let mut list = MarkerList::new(0.0);
        assert!(list.insert_marker(1.0));
        assert!(!list.insert_marker(1.0));
        assert_eq!(list.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_quantize_is_idempotent(
            raw in prop::collection::vec(0.0f64..30.0, 0..64),
            bpm in 40.0f64..240.0,
            subdivision in 1u32..=64,
        ) {
            let once = {
                let mut list = MarkerList::from_times(raw.iter().copied(), DEDUP_EPSILON);
                list.quantize(bpm, subdivision);
                list
            };
            let mut twice = once.clone();
            twice.quantize(bpm, subdivision);
            prop_assert_eq!(once.times(), twice.times());
        }

        #[test]
        fn prop_edits_keep_invariant(
            raw in prop::collection::vec(0.0f64..10.0, 0..32),
            inserts in prop::collection::vec(0.0f64..10.0, 0..16),
            moves in prop::collection::vec((0usize..48, 0.0f64..10.0), 0..16),
        ) {
            let mut list = MarkerList::from_times(raw, DEDUP_EPSILON);
            prop_assert!(is_strictly_spaced(&list));
            for t in inserts {
                list.insert_marker(t);
                prop_assert!(is_strictly_spaced(&list));
            }
            for (i, t) in moves {
                let _ = list.move_marker(i, t);
                prop_assert!(is_strictly_spaced(&list));
            }
        }
    }
}
