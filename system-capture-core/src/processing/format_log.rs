use std::fmt;
use std::sync::OnceLock;

use crate::models::audio_buffer::{AudioBuffer, SampleFormat};

/// Native format parameters of a captured buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormatDescription {
    pub format: SampleFormat,
    pub sample_rate: f64,
    pub channel_count: u16,
    pub bits_per_channel: u16,
    pub format_id: u32,
    pub format_flags: u32,
}

impl FormatDescription {
    pub fn of(buffer: &AudioBuffer) -> Self {
        Self {
            format: buffer.format,
            sample_rate: buffer.sample_rate,
            channel_count: buffer.channel_count,
            bits_per_channel: buffer.bits_per_channel,
            format_id: buffer.format_id,
            format_flags: buffer.format_flags,
        }
    }
}

impl fmt::Display for FormatDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}, {} Hz, {} ch, {} bits/channel, format id {:#x}, flags {:#x}",
            self.format,
            self.sample_rate,
            self.channel_count,
            self.bits_per_channel,
            self.format_id,
            self.format_flags
        )
    }
}

/// Records the first native format seen and logs it exactly once.
///
/// The process-wide instance lives for the whole process, so the format is
/// logged once no matter how many sessions run. Tests build their own
/// instances.
#[derive(Debug, Default)]
pub struct FormatLog {
    first: OnceLock<FormatDescription>,
}

static PROCESS_FORMAT_LOG: FormatLog = FormatLog::new();

impl FormatLog {
    pub const fn new() -> Self {
        Self {
            first: OnceLock::new(),
        }
    }

    /// The instance shared by every session in this process.
    pub fn process() -> &'static FormatLog {
        &PROCESS_FORMAT_LOG
    }

    /// Note the format of `buffer`. Returns `true` only for the call that
    /// actually logged.
    pub fn record(&self, buffer: &AudioBuffer) -> bool {
        let mut logged = false;
        self.first.get_or_init(|| {
            let description = FormatDescription::of(buffer);
            log::info!("Captured audio format: {}", description);
            logged = true;
            description
        });
        logged
    }

    /// The first format recorded, if any.
    pub fn first_format(&self) -> Option<&FormatDescription> {
        self.first.get()
    }
}
