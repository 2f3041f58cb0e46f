//! Planar-to-interleaved conversion for ScreenCaptureKit audio.
//!
//! ScreenCaptureKit usually hands out one buffer per channel. The core expects
//! interleaved frames, so the channel buffers are woven together before a
//! buffer leaves the backend. Sample encoding is taken from the sample
//! buffer's format description and passed through untouched; the core's
//! converter decides whether it can use it.

use system_capture_core::models::audio_buffer::{AudioBuffer, SampleFormat};

/// `kAudioFormatLinearPCM` ('lpcm').
pub const FORMAT_LINEAR_PCM: u32 = 0x6C70_636D;
pub const FLAG_IS_FLOAT: u32 = 0x1;
pub const FLAG_IS_BIG_ENDIAN: u32 = 0x2;
pub const FLAG_IS_SIGNED_INTEGER: u32 = 0x4;
pub const FLAG_IS_PACKED: u32 = 0x8;
pub const FLAG_IS_NON_INTERLEAVED: u32 = 0x20;

/// Stream description of the planes in one sample buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneFormat {
    pub format_id: u32,
    pub format_flags: u32,
    pub bits_per_channel: u32,
    /// Channels per frame. Zero means one channel per plane.
    pub channels: u32,
}

impl Default for PlaneFormat {
    /// Packed non-interleaved float32, what ScreenCaptureKit delivers unless
    /// told otherwise.
    fn default() -> Self {
        Self {
            format_id: FORMAT_LINEAR_PCM,
            format_flags: FLAG_IS_FLOAT | FLAG_IS_PACKED | FLAG_IS_NON_INTERLEAVED,
            bits_per_channel: 32,
            channels: 0,
        }
    }
}

impl PlaneFormat {
    pub fn is_interleaved(&self) -> bool {
        self.format_flags & FLAG_IS_NON_INTERLEAVED == 0
    }

    /// Sample representation as the core names it.
    pub fn sample_format(&self) -> SampleFormat {
        let native_endian = (self.format_flags & FLAG_IS_BIG_ENDIAN != 0) == cfg!(target_endian = "big");
        if self.format_id != FORMAT_LINEAR_PCM || !native_endian {
            return SampleFormat::Unknown(self.format_id);
        }
        if self.format_flags & FLAG_IS_FLOAT != 0 {
            SampleFormat::FloatPcm
        } else if self.format_flags & FLAG_IS_SIGNED_INTEGER != 0 {
            SampleFormat::Int16Pcm
        } else {
            SampleFormat::Unknown(self.format_id)
        }
    }

    fn bytes_per_sample(&self) -> usize {
        (self.bits_per_channel / 8) as usize
    }
}

/// Interleave per-channel sample runs of `width`-byte samples. Frames past
/// the shortest channel are discarded so every output frame is complete.
pub fn interleave<T: AsRef<[u8]>>(planes: &[T], width: usize) -> Vec<u8> {
    if width == 0 {
        return Vec::new();
    }
    let frames = planes.iter().map(|p| p.as_ref().len() / width).min().unwrap_or(0);
    let mut interleaved = Vec::with_capacity(frames * width * planes.len());
    for frame in 0..frames {
        let offset = frame * width;
        for plane in planes {
            interleaved.extend_from_slice(&plane.as_ref()[offset..offset + width]);
        }
    }
    interleaved
}

/// Build an interleaved `AudioBuffer` from the planes of one sample buffer.
///
/// Returns `None` when there is nothing to deliver.
pub fn planar_to_buffer<'a, I>(planes: I, format: &PlaneFormat, sample_rate: f64) -> Option<AudioBuffer>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let planes: Vec<&[u8]> = planes.into_iter().collect();
    let width = format.bytes_per_sample();
    if width == 0 || planes.is_empty() {
        return None;
    }

    let (data, channel_count) = if format.is_interleaved() && planes.len() == 1 {
        let channels = format.channels.max(1) as usize;
        let frame_bytes = width * channels;
        let whole = planes[0].len() / frame_bytes * frame_bytes;
        (planes[0][..whole].to_vec(), channels)
    } else {
        (interleave(&planes, width), planes.len())
    };
    if data.is_empty() {
        return None;
    }

    Some(AudioBuffer {
        format: format.sample_format(),
        sample_rate,
        channel_count: u16::try_from(channel_count).ok()?,
        bits_per_channel: u16::try_from(format.bits_per_channel).ok()?,
        format_id: format.format_id,
        format_flags: format.format_flags & !FLAG_IS_NON_INTERLEAVED,
        data,
    })
}
