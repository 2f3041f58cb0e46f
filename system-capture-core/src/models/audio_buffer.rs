/// Sample representation of a captured buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Linear PCM with IEEE float samples.
    FloatPcm,
    /// Linear PCM with signed integer samples.
    Int16Pcm,
    /// Anything else; carries the backend's raw format identifier.
    Unknown(u32),
}

/// Which output of an OS capture stream produced a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    Audio,
    Screen,
}

/// One captured frame in the backend's native format.
///
/// Transient: built by the backend per delivery, consumed by conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub format: SampleFormat,
    pub sample_rate: f64,
    pub channel_count: u16,
    pub bits_per_channel: u16,
    /// Backend-specific format identifier (e.g. a FourCC or WAVE format tag).
    pub format_id: u32,
    /// Backend-specific format flags.
    pub format_flags: u32,
    /// Interleaved sample bytes in native endianness.
    pub data: Vec<u8>,
}

impl AudioBuffer {
    /// Interleaved 32-bit float buffer.
    pub fn from_f32(samples: &[f32], sample_rate: f64, channel_count: u16) -> Self {
        let mut data = Vec::with_capacity(samples.len() * 4);
        for sample in samples {
            data.extend_from_slice(&sample.to_ne_bytes());
        }
        Self {
            format: SampleFormat::FloatPcm,
            sample_rate,
            channel_count,
            bits_per_channel: 32,
            format_id: 0,
            format_flags: 0,
            data,
        }
    }

    /// Interleaved 16-bit integer buffer.
    pub fn from_i16(samples: &[i16], sample_rate: f64, channel_count: u16) -> Self {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            data.extend_from_slice(&sample.to_ne_bytes());
        }
        Self {
            format: SampleFormat::Int16Pcm,
            sample_rate,
            channel_count,
            bits_per_channel: 16,
            format_id: 0,
            format_flags: 0,
            data,
        }
    }

    /// Number of whole samples (across all channels) in `data`.
    pub fn sample_count(&self) -> usize {
        let bytes_per_sample = usize::from(self.bits_per_channel / 8);
        if bytes_per_sample == 0 {
            return 0;
        }
        self.data.len() / bytes_per_sample
    }
}
