//! # Reslice Core
//!
//! Pure building blocks of the onset slicer:
//! - **Tempo grid**: conversions between sample index, seconds, grid rows and ticks
//! - **Markers**: sorted, deduplicated slice points with editor operations
//! - **Regions**: contiguous, pitch-tagged sample ranges derived from markers
//! - **Config**: validated session settings
//!
//! Nothing here touches audio devices or files.
//!
//! ## Example
//!
//! ```rust
//! use reslice_core::{derive_regions, MarkerList, TempoGrid, DEDUP_EPSILON};
//!
//! let grid = TempoGrid::new(140.0, 16, 44100, 441_000).unwrap();
//! assert_eq!(grid.total_rows(), 94);
//!
//! let mut markers = MarkerList::from_times([0.0, 0.75, 1.5], DEDUP_EPSILON);
//! markers.add_at_row(&grid, 40);
//!
//! let regions = derive_regions(markers.as_slice(), 44100, 441_000, 36);
//! assert_eq!(regions.len(), 4);
//! assert_eq!(regions[3].end_sample, 441_000);
//! ```

pub mod config;
pub mod error;
pub mod grid;
pub mod marker;
pub mod region;

mod lockfree;

pub use config::SliceConfig;
pub use error::{Error, Result};
pub use grid::{
    quantize_ticks, sample_to_seconds, seconds_per_bar, seconds_to_sample, seconds_to_ticks,
    TempoGrid,
};
pub use lockfree::{AtomicFlag, AtomicFloat};
pub use marker::{
    quantize_time, quantize_times, quantize_unit, sort_and_dedup, Marker, MarkerList,
    DEDUP_EPSILON,
};
pub use region::{derive_regions, note_name, Region, Regions, DEFAULT_BASE_PITCH};
