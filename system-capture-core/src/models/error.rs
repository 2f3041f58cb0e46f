use thiserror::Error;

use super::audio_buffer::SampleFormat;

/// Errors that can occur while starting or stopping a capture session.
///
/// None of these escape the session as a `Result`: start failures unwind the
/// session to idle and surface as `false`, stop failures are logged and
/// swallowed, and an interrupted stream is torn down. They reach the host
/// through `CaptureDelegate::on_error`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("screen capture permission denied")]
    PermissionDenied,

    #[error("no capture target available")]
    NoCaptureTargetAvailable,

    #[error("stream creation failed: {0}")]
    StreamCreationFailed(String),

    #[error("stream start failed: {0}")]
    StreamStartFailed(String),

    #[error("stream stop failed: {0}")]
    StreamStopFailed(String),

    /// The OS stream died while capturing (device removed, service restarted).
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),
}

/// Per-buffer conversion failure. The buffer is dropped; the session carries on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("unsupported sample format {format:?} ({bits_per_channel} bits per channel)")]
    UnsupportedFormat {
        format: SampleFormat,
        bits_per_channel: u16,
    },
}
