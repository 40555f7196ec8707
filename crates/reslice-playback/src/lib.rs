//! # Reslice Playback
//!
//! Audio I/O for the slicer:
//! - **Playback engine**: [`Player`] on the foreground, [`PlaybackVoice`] on the audio thread
//! - **Output**: CPAL stream pulling from any [`SampleSource`]
//! - **Loader**: WAV decoding into a mono [`AudioBuffer`]
//!
//! The voice never blocks, allocates or logs. A degenerate range is replaced
//! by a short fallback window rather than refused.
//!
//! ## Example
//!
//! ```rust
//! use reslice_playback::{playback_pair, AudioBuffer, SampleSource};
//!
//! let buffer = AudioBuffer::new(vec![0.5f32; 44100 * 3], 44100);
//! let (player, mut voice) = playback_pair(buffer.shared(), buffer.sample_rate(), 1.0, 0.5);
//!
//! let range = player.play_range(1.0, 2.0).unwrap();
//! assert_eq!((range.start, range.end), (44100, 88200));
//!
//! let mut out = vec![0.0f32; 44100];
//! voice.render(&mut out);
//! assert!(!player.is_playing());
//! ```

mod engine;
mod error;
mod loader;
mod output;

pub use engine::{playback_pair, PlaybackRange, PlaybackState, PlaybackVoice, Player, SampleSource};
pub use error::{Error, Result};
pub use loader::AudioBuffer;
pub use output::{list_devices, OutputStream};
