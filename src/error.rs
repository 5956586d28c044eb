//! Error types for stagemix
//!
//! Defines the crate error type using thiserror, plus the error-slot kinds
//! reported to hosts that poll `AudioEngine::last_error` instead of handling
//! `Result`s.

use thiserror::Error;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    /// Audio device enumeration, open, or stream errors
    #[error("Audio device error: {0}")]
    Device(String),

    /// Media open or decode errors
    #[error("Sound error: {0}")]
    Sound(String),

    /// Channel index out of range
    #[error("Range error: {0}")]
    Range(String),
}

/// Convenience Result type using the stagemix Error
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of the most recent engine operation outcome.
///
/// Hosts that drive the engine through a polling FFI layer read this
/// instead of `Result`; every control operation overwrites it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorKind {
    /// Last operation succeeded
    #[default]
    Ok,

    /// Audio device failure
    Device,

    /// Codec or media-open failure
    Sound,

    /// Channel index out of range
    Range,
}

/// All codec failures report the same message; the detail goes to the log.
pub(crate) const SOUND_ERROR_MESSAGE: &str = "codec error while opening or decoding media";

/// Snapshot of the engine's last-error slot.
#[derive(Debug, Clone, Default)]
pub struct ErrorReport {
    kind: ErrorKind,
    message: String,
}

impl ErrorReport {
    pub(crate) fn ok() -> Self {
        Self::default()
    }

    pub(crate) fn from_error(err: &Error) -> Self {
        match err {
            Error::Device(msg) => Self {
                kind: ErrorKind::Device,
                message: msg.clone(),
            },
            Error::Sound(_) => Self {
                kind: ErrorKind::Sound,
                message: String::new(),
            },
            Error::Range(msg) => Self {
                kind: ErrorKind::Range,
                message: msg.clone(),
            },
        }
    }

    /// The kind recorded by the last operation.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The message for the last operation: empty when OK, the device-supplied
    /// string for Device, a fixed codec string for Sound, and the recorded
    /// message for Range.
    pub fn message(&self) -> &str {
        match self.kind {
            ErrorKind::Ok => "",
            ErrorKind::Sound => SOUND_ERROR_MESSAGE,
            _ => &self.message,
        }
    }
}
