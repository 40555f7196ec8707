//! CPAL output stream driving a [`SampleSource`].

use crate::engine::{Player, SampleSource};
use crate::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

/// Wrapper to hold `cpal::Stream` in a `Send` context.
///
/// # Safety
/// `cpal::Stream` is `!Send` due to platform internals. The stream is only
/// created, kept and dropped behind the owning session's mutex and is never
/// used from the audio callback itself.
struct StreamHandle(#[allow(dead_code)] cpal::Stream);

unsafe impl Send for StreamHandle {}

/// A running output stream. Dropping it stops playback output.
pub struct OutputStream {
    _stream: StreamHandle,
    sample_rate: u32,
    channels: usize,
    device_name: String,
}

impl OutputStream {
    /// Open `device_index` (or the default device) and start pulling samples
    /// from `source`. The mono signal is copied to every output channel.
    ///
    /// The device is asked for `sample_rate`; when it cannot run at that rate
    /// the default rate is used and playback is pitched accordingly.
    pub fn start<S>(
        source: S,
        player: &Player,
        sample_rate: u32,
        device_index: Option<usize>,
    ) -> Result<Self>
    where
        S: SampleSource + 'static,
    {
        let device = get_device(device_index)?;
        let device_name = device.name()?;
        let config = choose_config(&device, sample_rate)?;
        let stream_config: cpal::StreamConfig = config.clone().into();

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32, S>(&device, &stream_config, source, player)?,
            cpal::SampleFormat::I16 => build_stream::<i16, S>(&device, &stream_config, source, player)?,
            cpal::SampleFormat::U16 => build_stream::<u16, S>(&device, &stream_config, source, player)?,
            format => {
                return Err(Error::UnsupportedFormat(format!(
                    "Unsupported output sample format: {format:?}"
                )));
            }
        };
        stream.play()?;

        let stream_rate = stream_config.sample_rate.0;
        if stream_rate != sample_rate {
            tracing::warn!(
                device = %device_name,
                buffer_rate = sample_rate,
                device_rate = stream_rate,
                "device does not support the buffer sample rate"
            );
        }
        tracing::info!(
            device = %device_name,
            sample_rate = stream_rate,
            channels = stream_config.channels,
            "output stream started"
        );

        Ok(Self {
            _stream: StreamHandle(stream),
            sample_rate: stream_rate,
            channels: stream_config.channels as usize,
            device_name,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

/// Output device names, prefixed with their index.
pub fn list_devices() -> Result<Vec<String>> {
    cpal::default_host()
        .output_devices()?
        .enumerate()
        .map(|(i, d)| Ok(format!("{i}: {}", d.name()?)))
        .collect()
}

fn get_device(index: Option<usize>) -> Result<cpal::Device> {
    let host = cpal::default_host();

    match index {
        Some(i) => {
            let devices: Vec<_> = host.output_devices()?.collect();
            let count = devices.len();
            devices.into_iter().nth(i).ok_or_else(|| {
                Error::DeviceNotFound(format!("Device index {i} out of range ({count} available)"))
            })
        }
        None => host
            .default_output_device()
            .ok_or_else(|| Error::DeviceNotFound("No output device available".into())),
    }
}

fn choose_config(device: &cpal::Device, sample_rate: u32) -> Result<cpal::SupportedStreamConfig> {
    let wanted = cpal::SampleRate(sample_rate);
    let matching = device.supported_output_configs().ok().and_then(|mut configs| {
        configs.find(|c| c.min_sample_rate() <= wanted && wanted <= c.max_sample_rate())
    });

    match matching {
        Some(range) => Ok(range.with_sample_rate(wanted)),
        None => Ok(device.default_output_config()?),
    }
}

fn build_stream<T, S>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut source: S,
    player: &Player,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
    S: SampleSource + 'static,
{
    let channels = config.channels as usize;
    let errors = player.clone();

    // Pre-allocated mono buffer (grows on first callback, then stable)
    let mut mono = Vec::<f32>::new();

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let frames = data.len() / channels;
                if mono.len() < frames {
                    mono.resize(frames, 0.0);
                }
                source.render(&mut mono[..frames]);
                write_output(data, channels, &mono[..frames]);
            }));

            if result.is_err() {
                output_silence(data);
            }
        },
        move |_err| errors.note_stream_error(),
        None,
    )?;

    Ok(stream)
}

/// Copy mono frames to every channel in the device's format.
#[inline]
fn write_output<T: cpal::SizedSample + cpal::FromSample<f32>>(
    data: &mut [T],
    channels: usize,
    mono: &[f32],
) {
    for (frame, &value) in data.chunks_exact_mut(channels).zip(mono) {
        let value = T::from_sample(value);
        for sample in frame {
            *sample = value;
        }
    }
}

/// Output silence (panic recovery).
#[inline]
fn output_silence<T: cpal::SizedSample + cpal::FromSample<f32>>(data: &mut [T]) {
    for sample in data.iter_mut() {
        *sample = T::from_sample(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_output_fans_out_mono() {
        let mut data = [0.0f32; 6];
        write_output(&mut data, 2, &[0.1, 0.2, 0.3]);
        assert_eq!(data, [0.1, 0.1, 0.2, 0.2, 0.3, 0.3]);
    }

    #[test]
    fn test_write_output_converts_format() {
        let mut data = [0i16; 2];
        write_output(&mut data, 1, &[0.5, -0.5]);
        assert!(data[0] > 16000);
        assert!(data[1] < -16000);
    }

    #[test]
    fn test_output_silence() {
        let mut data = [0.7f32; 4];
        output_silence(&mut data);
        assert_eq!(data, [0.0; 4]);
    }
}
