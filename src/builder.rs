//! Builder for configuring and constructing a `SliceSession`.

use crate::{Result, SliceSession};
use reslice_analysis::EnvelopeMode;
use reslice_core::SliceConfig;
use reslice_playback::AudioBuffer;
use std::path::PathBuf;

/// Sample rate of the empty buffer a session starts with when no audio is given.
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

enum AudioSource {
    Empty,
    Wav(PathBuf),
    Buffer(AudioBuffer),
}

/// Settings are validated together in [`build()`](Self::build), so the order
/// of calls does not matter.
///
/// # Example
///
/// ```ignore
/// use reslice::prelude::*;
///
/// let session = SliceSession::builder()
///     .wav("loop.wav")
///     .bpm(172.0)
///     .rows_per_bar(16)
///     .build()?;
///
/// session.detect_onsets(false)?;
/// println!("{}", session.region_table());
/// ```
pub struct SliceSessionBuilder {
    config: SliceConfig,
    source: AudioSource,
    output_device: Option<usize>,
    envelope_mode: EnvelopeMode,
}

impl Default for SliceSessionBuilder {
    fn default() -> Self {
        Self {
            config: SliceConfig::default(),
            source: AudioSource::Empty,
            output_device: None,
            envelope_mode: EnvelopeMode::Spectral,
        }
    }
}

impl SliceSessionBuilder {
    /// Replace every setting at once, e.g. with one read from a JSON file.
    pub fn config(mut self, config: SliceConfig) -> Self {
        self.config = config;
        self
    }

    /// Default: 140
    pub fn bpm(mut self, bpm: f64) -> Self {
        self.config.bpm = bpm;
        self
    }

    /// Default: 16
    pub fn rows_per_bar(mut self, rows_per_bar: u32) -> Self {
        self.config.rows_per_bar = rows_per_bar;
        self
    }

    /// Pitch id of the first region. Default: 36 (C2)
    pub fn base_pitch(mut self, base_pitch: i32) -> Self {
        self.config.base_pitch = base_pitch;
        self
    }

    /// Quantize steps per bar for detected onsets. Default: 24
    pub fn subdivision(mut self, subdivision: u32) -> Self {
        self.config.subdivision = subdivision;
        self
    }

    pub fn hop_size(mut self, hop_size: usize) -> Self {
        self.config.hop_size = hop_size;
        self
    }

    pub fn window_size(mut self, window_size: usize) -> Self {
        self.config.window_size = window_size;
        self
    }

    pub fn samples_per_block(mut self, samples_per_block: usize) -> Self {
        self.config.samples_per_block = samples_per_block;
        self
    }

    pub fn dedup_epsilon(mut self, epsilon: f64) -> Self {
        self.config.dedup_epsilon = epsilon;
        self
    }

    /// Default: 0.8
    pub fn volume(mut self, volume: f32) -> Self {
        self.config.volume = volume;
        self
    }

    /// Seconds played when a requested range is empty. Default: 0.5
    pub fn fallback_window(mut self, seconds: f64) -> Self {
        self.config.fallback_window = seconds;
        self
    }

    pub fn output_device(mut self, index: usize) -> Self {
        self.output_device = Some(index);
        self
    }

    /// Default: [`EnvelopeMode::Spectral`]
    pub fn envelope_mode(mut self, mode: EnvelopeMode) -> Self {
        self.envelope_mode = mode;
        self
    }

    /// Load a WAV file when building.
    pub fn wav(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = AudioSource::Wav(path.into());
        self
    }

    /// Use already decoded audio.
    pub fn audio(mut self, audio: AudioBuffer) -> Self {
        self.source = AudioSource::Buffer(audio);
        self
    }

    pub fn build(self) -> Result<SliceSession> {
        self.config.validate()?;

        let (audio, source) = match self.source {
            AudioSource::Empty => (AudioBuffer::empty(DEFAULT_SAMPLE_RATE), None),
            AudioSource::Buffer(audio) => (audio, None),
            AudioSource::Wav(path) => (AudioBuffer::load_wav(&path)?, Some(path)),
        };

        SliceSession::from_parts(
            self.config,
            audio,
            source,
            self.envelope_mode,
            self.output_device,
        )
    }
}
