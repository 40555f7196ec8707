//! # Reslice - Onset Slicer
//!
//! Cuts a recording into pitch-tagged slices at detected onsets and lays
//! them out on a tracker-style tempo grid.
//!
//! ## Architecture
//!
//! Reslice is an umbrella crate that coordinates:
//! - **reslice-core** - Tempo grid, markers, regions and settings
//! - **reslice-analysis** - Onset detection, tempo estimation, quantizing and envelopes
//! - **reslice-playback** - WAV loading, region playback and CPAL output
//!
//! [`SliceSession`] ties them together around one loaded buffer.
//!
//! ## Quick Start
//!
//! ```ignore
//! use reslice::prelude::*;
//!
//! let mut session = SliceSession::builder()
//!     .wav("break.wav")
//!     .bpm(170.0)
//!     .build()?;
//!
//! session.detect_onsets(true)?;
//! for region in session.regions().iter() {
//!     println!("{region}");
//! }
//!
//! session.start_output()?;
//! session.play_region(2)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default) - the `reslice` command-line tool
//! - `serialization` - serde support for analysis types

/// Re-export of reslice-core for direct access
pub use reslice_core as core;

pub use reslice_analysis as analysis;

pub use reslice_playback as playback;

pub use reslice_core::{
    derive_regions, note_name, Marker, MarkerList, Region, Regions, SliceConfig, TempoGrid,
};

pub use reslice_analysis::{
    Detection, Envelope, EnvelopeBlock, EnvelopeMode, OnsetDetector, OnsetQuantizer,
    TempoEstimator,
};

pub use reslice_playback::{
    list_devices, AudioBuffer, PlaybackRange, PlaybackState, PlaybackVoice, Player, SampleSource,
};

mod builder;
mod detection;
mod error;
mod session;

pub use builder::{SliceSessionBuilder, DEFAULT_SAMPLE_RATE};
pub use detection::{DetectionHandle, DetectionStatus};
pub use error::{Error, Result};
pub use session::{PlayingRegion, SliceSession};

/// Convenience prelude for common imports
pub mod prelude {
    pub use crate::{
        AudioBuffer, Detection, DetectionHandle, DetectionStatus, EnvelopeMode, MarkerList,
        PlaybackRange, PlayingRegion, Region, Result, SliceConfig, SliceSession,
        SliceSessionBuilder, TempoGrid,
    };
}
