//! Decoded mono audio and the WAV loader that produces it.
//!
//! Multi-channel files are averaged into one channel here, before anything
//! else sees them. Integer PCM is scaled to `-1.0..1.0`.

use crate::{Error, Result};
use std::path::Path;
use std::sync::Arc;

/// Immutable mono sample buffer with its sample rate.
///
/// Cloning is cheap: the samples are shared.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Arc<[f32]>,
    sample_rate: u32,
    source_channels: u16,
}

impl AudioBuffer {
    pub fn new(samples: impl Into<Arc<[f32]>>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            source_channels: 1,
        }
    }

    /// An empty buffer at `sample_rate`.
    pub fn empty(sample_rate: u32) -> Self {
        Self::new(Vec::new(), sample_rate)
    }

    /// Average interleaved frames of `channels` samples into mono.
    /// A trailing partial frame is dropped.
    pub fn from_interleaved(data: &[f32], channels: u16, sample_rate: u32) -> Self {
        let ch = channels.max(1) as usize;
        let samples: Vec<f32> = data
            .chunks_exact(ch)
            .map(|frame| frame.iter().sum::<f32>() / ch as f32)
            .collect();
        Self {
            samples: samples.into(),
            sample_rate,
            source_channels: ch as u16,
        }
    }

    /// Decode a WAV file into mono.
    pub fn load_wav(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = hound::WavReader::open(path)?;
        let spec = reader.spec();

        if spec.channels == 0 || spec.sample_rate == 0 {
            return Err(Error::UnsupportedFormat(format!(
                "{}: {} channels at {} Hz",
                path.display(),
                spec.channels,
                spec.sample_rate
            )));
        }

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<_, _>>()?,
            hound::SampleFormat::Int => {
                if !(1..=32).contains(&spec.bits_per_sample) {
                    return Err(Error::UnsupportedFormat(format!(
                        "{} bit integer PCM",
                        spec.bits_per_sample
                    )));
                }
                let scale = 1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<std::result::Result<_, _>>()?
            }
        };

        let buffer = Self::from_interleaved(&interleaved, spec.channels, spec.sample_rate);
        tracing::info!(
            path = %path.display(),
            sample_rate = buffer.sample_rate,
            channels = spec.channels,
            frames = buffer.len(),
            "loaded wav"
        );
        Ok(buffer)
    }

    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Shared handle to the samples, for the real-time side.
    pub fn shared(&self) -> Arc<[f32]> {
        Arc::clone(&self.samples)
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count of the source before downmixing.
    pub fn source_channels(&self) -> u16 {
        self.source_channels
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    type Writer = hound::WavWriter<std::io::BufWriter<std::fs::File>>;

    fn write_wav(path: &Path, spec: hound::WavSpec, write: impl FnOnce(&mut Writer)) {
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        write(&mut writer);
        writer.finalize().unwrap();
    }

    #[test]
    fn test_interleaved_downmix() {
        let data = [1.0, 0.0, 0.5, 0.5, -1.0, 1.0, 0.3];
        let buffer = AudioBuffer::from_interleaved(&data, 2, 48000);
        assert_eq!(buffer.samples(), &[0.5, 0.5, 0.0]);
        assert_eq!(buffer.source_channels(), 2);
        assert_eq!(buffer.sample_rate(), 48000);
    }

    #[test]
    fn test_load_stereo_i16() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        write_wav(&path, spec, |w| {
            for _ in 0..100 {
                w.write_sample(16384i16).unwrap();
                w.write_sample(0i16).unwrap();
            }
        });

        let buffer = AudioBuffer::load_wav(&path).unwrap();
        assert_eq!(buffer.len(), 100);
        assert_eq!(buffer.source_channels(), 2);
        assert_relative_eq!(buffer.samples()[0], 0.25, epsilon = 1e-6);
        assert_relative_eq!(buffer.duration_seconds(), 100.0 / 44100.0);
    }

    #[test]
    fn test_load_mono_float() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        write_wav(&path, spec, |w| {
            for i in 0..10 {
                w.write_sample(i as f32 * 0.1).unwrap();
            }
        });

        let buffer = AudioBuffer::load_wav(&path).unwrap();
        assert_eq!(buffer.len(), 10);
        assert_relative_eq!(buffer.samples()[9], 0.9, epsilon = 1e-6);
    }

    #[test]
    fn test_load_24_bit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deep.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 24,
            sample_format: hound::SampleFormat::Int,
        };
        write_wav(&path, spec, |w| {
            w.write_sample(-(1i32 << 23)).unwrap();
            w.write_sample(1i32 << 22).unwrap();
        });

        let buffer = AudioBuffer::load_wav(&path).unwrap();
        assert_eq!(buffer.samples(), &[-1.0, 0.5]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = AudioBuffer::load_wav(dir.path().join("nope.wav"));
        assert!(matches!(result, Err(Error::Wav(_))));
    }

    #[test]
    fn test_empty_buffer() {
        let buffer = AudioBuffer::empty(44100);
        assert!(buffer.is_empty());
        assert_eq!(buffer.duration_seconds(), 0.0);
    }
}
