//! Centralized error type for the reslice umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] reslice_core::Error),

    #[error("Playback: {0}")]
    Playback(#[from] reslice_playback::Error),

    /// `reload` called on a session that was not loaded from a file.
    #[error("Session has no source file to reload")]
    NoSource,

    #[error("Detection thread panicked")]
    DetectionPanicked,

    #[error("Detection result already taken")]
    DetectionConsumed,

    #[error("Config: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
