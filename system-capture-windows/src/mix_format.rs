//! Decoding of the WASAPI shared-mode mix format (`WAVEFORMATEX` /
//! `WAVEFORMATEXTENSIBLE`).

pub const WAVE_FORMAT_PCM: u16 = 0x0001;
pub const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
pub const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Sample layouts the loopback path can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEncoding {
    Float32,
    Int16,
    Int24,
    Int32,
}

impl SampleEncoding {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::Int16 => 2,
            Self::Int24 => 3,
            Self::Float32 | Self::Int32 => 4,
        }
    }
}

/// The fields of a shared-mode mix format the capture loop needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixFormat {
    pub format_tag: u16,
    /// `Data1` of the `SubFormat` GUID for extensible formats. The KSDATAFORMAT
    /// subtype GUIDs carry the plain format tag there.
    pub sub_format: Option<u32>,
    pub sample_rate: f64,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub block_align: u16,
}

impl MixFormat {
    /// Effective format tag with the extensible wrapper resolved.
    pub fn effective_tag(&self) -> u32 {
        match (self.format_tag, self.sub_format) {
            (WAVE_FORMAT_EXTENSIBLE, Some(sub)) => sub,
            (tag, _) => u32::from(tag),
        }
    }

    /// `None` for formats the loopback path cannot decode.
    pub fn encoding(&self) -> Option<SampleEncoding> {
        let tag = self.effective_tag();
        if tag == u32::from(WAVE_FORMAT_IEEE_FLOAT) {
            return (self.bits_per_sample == 32).then_some(SampleEncoding::Float32);
        }
        if tag != u32::from(WAVE_FORMAT_PCM) {
            return None;
        }
        match self.bits_per_sample {
            16 => Some(SampleEncoding::Int16),
            24 => Some(SampleEncoding::Int24),
            32 => Some(SampleEncoding::Int32),
            _ => None,
        }
    }

    /// Byte length of `frames` frames in this format.
    pub fn frames_to_bytes(&self, frames: u32) -> usize {
        frames as usize * usize::from(self.block_align)
    }

    /// Decode interleaved packet bytes into normalized f32 samples.
    pub fn decode(&self, data: &[u8]) -> Option<Vec<f32>> {
        let encoding = self.encoding()?;
        let width = encoding.bytes_per_sample();
        let samples = data.chunks_exact(width).map(|b| match encoding {
            SampleEncoding::Float32 => f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            SampleEncoding::Int16 => f32::from(i16::from_le_bytes([b[0], b[1]])) / 32768.0,
            // Shift into the top of an i32 so the sign bit extends.
            SampleEncoding::Int24 => (i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8) as f32 / 8_388_608.0,
            SampleEncoding::Int32 => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32 / 2_147_483_648.0,
        });
        Some(samples.collect())
    }
}
