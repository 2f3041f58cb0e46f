use crate::models::audio_buffer::{AudioBuffer, SampleFormat};
use crate::models::error::ConversionError;
use crate::processing::format_log::FormatLog;

/// Normalizes captured buffers to canonical 16-bit little-endian PCM.
///
/// Float samples are clamped to [-1.0, 1.0], scaled by `i16::MAX` and
/// truncated toward zero, so full scale is symmetric: 1.0 → 32767 and
/// -1.0 → -32767. Integer 16-bit buffers pass through unchanged.
#[derive(Debug, Clone, Copy)]
pub struct SampleConverter {
    format_log: &'static FormatLog,
}

impl SampleConverter {
    /// Converter that reports formats to the process-wide log.
    pub fn new() -> Self {
        Self::with_format_log(FormatLog::process())
    }

    pub fn with_format_log(format_log: &'static FormatLog) -> Self {
        Self { format_log }
    }

    pub fn convert(&self, buffer: &AudioBuffer) -> Result<Vec<u8>, ConversionError> {
        self.format_log.record(buffer);

        match (buffer.format, buffer.bits_per_channel) {
            (SampleFormat::FloatPcm, 32) => Ok(convert_f32(&buffer.data)),
            (SampleFormat::FloatPcm, 64) => Ok(convert_f64(&buffer.data)),
            (SampleFormat::Int16Pcm, 16) => Ok(buffer.data.clone()),
            (format, bits_per_channel) => Err(ConversionError::UnsupportedFormat {
                format,
                bits_per_channel,
            }),
        }
    }
}

impl Default for SampleConverter {
    fn default() -> Self {
        Self::new()
    }
}

/// Clamp, scale and truncate one float sample.
pub fn float_to_i16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    (clamped * i16::MAX as f32) as i16
}

fn convert_f32(data: &[u8]) -> Vec<u8> {
    let mut pcm = Vec::with_capacity(data.len() / 2);
    for chunk in data.chunks_exact(4) {
        let sample = f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        pcm.extend_from_slice(&float_to_i16(sample).to_le_bytes());
    }
    pcm
}

fn convert_f64(data: &[u8]) -> Vec<u8> {
    let mut pcm = Vec::with_capacity(data.len() / 4);
    for chunk in data.chunks_exact(8) {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(chunk);
        let sample = f64::from_ne_bytes(bytes) as f32;
        pcm.extend_from_slice(&float_to_i16(sample).to_le_bytes());
    }
    pcm
}
