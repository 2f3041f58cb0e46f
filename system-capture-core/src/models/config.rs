use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default capture sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: f64 = 16000.0;

/// Default number of captured channels.
pub const DEFAULT_CHANNEL_COUNT: u16 = 1;

/// Configuration for a capture session.
///
/// Deserializes from the argument map the application passes to
/// `startCapture`. Every key is optional:
///
/// ```json
/// { "sampleRate": 48000, "channels": 2 }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureConfiguration {
    /// Requested sample rate in Hz (default: 16000).
    pub sample_rate: f64,

    /// Requested channel count (default: 1).
    #[serde(rename = "channels", alias = "channelCount")]
    pub channel_count: u16,
}

impl CaptureConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(format!("sample rate must be positive, got {}", self.sample_rate));
        }
        if self.channel_count == 0 {
            return Err("channel count must be at least 1".into());
        }
        Ok(())
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channel_count: DEFAULT_CHANNEL_COUNT,
        }
    }
}

/// Fixed waits applied around OS-confirmed state changes.
///
/// A session is not declared Active (or Idle) until the OS has confirmed the
/// change *and* the matching settle interval has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    /// Wait after the OS confirms capture has begun.
    pub start_settle: Duration,

    /// Wait after the OS confirms capture has ended.
    pub stop_settle: Duration,

    /// Extra wait between an implicit teardown and the restart that caused it.
    pub restart_gap: Duration,
}

impl SessionTiming {
    /// No waits at all. Useful for tests and for backends whose confirmations
    /// are already synchronous.
    pub const fn immediate() -> Self {
        Self {
            start_settle: Duration::ZERO,
            stop_settle: Duration::ZERO,
            restart_gap: Duration::ZERO,
        }
    }
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            start_settle: Duration::from_millis(50),
            stop_settle: Duration::from_millis(50),
            restart_gap: Duration::from_millis(100),
        }
    }
}
