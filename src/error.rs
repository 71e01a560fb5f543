//! Error types for radiomon operations.

use thiserror::Error;

/// Result type for radiomon operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the tuner facade, the RDS loop and the audio path.
#[derive(Debug, Error)]
pub enum Error {
    /// A radio-device ioctl failed. Carries the operation name and the
    /// underlying errno.
    #[error("ioctl {op}: {source}")]
    Device {
        op: &'static str,
        #[source]
        source: nix::Error,
    },

    /// A frequency outside the tuner's band was requested.
    #[error("{frequency:.2} is not in range ({min:.2} - {max:.2})")]
    OutOfRange { frequency: f32, min: f32, max: f32 },

    /// A partial RDS record was read from the device.
    #[error("incomplete RDS block, count was {0}")]
    ShortRead(usize),

    /// Sound-card error (open, parameter negotiation, read, recovery).
    #[error("audio device: {0}")]
    Audio(#[from] alsa::Error),

    /// Audio-server or device setup failure.
    #[error("configuration: {0}")]
    Config(String),

    /// I/O error on the radio device or standard input.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a device error for a failed ioctl.
    pub fn device(op: &'static str, source: nix::Error) -> Self {
        Error::Device { op, source }
    }

    /// Create a configuration error with a custom message.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }
}
