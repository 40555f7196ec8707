//! # Reslice Analysis
//!
//! Offline analysis passes over a mono `&[f32]` buffer:
//! - **Onset detection**: streaming spectral flux with an adaptive threshold
//! - **Tempo estimation**: autocorrelation of the flux novelty curve
//! - **Onset quantization**: hop-by-hop driver that snaps onsets to the tempo grid
//! - **Envelope cache**: per-block levels and low/mid/high band energy
//!
//! The analyzers sit behind the [`OnsetDetector`] and [`TempoEstimator`]
//! traits so other detectors can be plugged into [`OnsetQuantizer`].
//!
//! ## Example
//!
//! ```rust
//! use reslice_analysis::{detect_onsets, Envelope, EnvelopeMode};
//! use reslice_core::SliceConfig;
//!
//! let mut samples = vec![0.0f32; 44100];
//! for i in 0..50 {
//!     samples[22050 + i] = (-0.1 * i as f32).exp() * 0.8;
//! }
//!
//! let config = SliceConfig::default();
//! let detection = detect_onsets(&samples, 44100, &config, false).unwrap();
//! assert_eq!(detection.markers.len(), 1);
//!
//! let envelope = Envelope::compute(&samples, 44100, 1024, EnvelopeMode::Spectral).unwrap();
//! assert_eq!(envelope.len(), 44);
//! ```

pub mod analyzer;
pub mod envelope;
pub mod onset;
pub mod quantizer;
pub mod tempo;

mod flux;

pub use analyzer::{for_each_hop, OnsetDetector, TempoEstimator};
pub use envelope::{BandEnergy, Envelope, EnvelopeBlock, EnvelopeMode};
pub use onset::SpectralFluxOnsets;
pub use quantizer::{detect_onsets, Detection, OnsetQuantizer};
pub use tempo::FluxTempoEstimator;
