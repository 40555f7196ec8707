//! Error types.

use thiserror::Error;

/// Error type.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// WAV decoding error.
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// Sample layout the loader cannot decode.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The real-time voice was already handed to another backend.
    #[error("Playback voice already taken")]
    VoiceTaken,

    /// Failed to enumerate devices.
    #[error("Failed to enumerate audio devices")]
    DevicesError(#[from] cpal::DevicesError),

    /// Failed to get device config.
    #[error("Failed to get audio device config")]
    DeviceConfigError(#[from] cpal::DefaultStreamConfigError),

    /// Failed to build stream.
    #[error("Failed to build audio stream")]
    BuildStreamError(#[from] cpal::BuildStreamError),

    /// Failed to play stream.
    #[error("Failed to play audio stream")]
    PlayStreamError(#[from] cpal::PlayStreamError),

    /// Failed to read a device name.
    #[error("Failed to read device name")]
    DeviceNameError(#[from] cpal::DeviceNameError),

    /// Device not found.
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),
}

/// Result type.
pub type Result<T> = std::result::Result<T, Error>;
