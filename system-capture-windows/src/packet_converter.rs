//! Conversion of loopback packets from the device mix format to the
//! requested stream format.
//!
//! Pure math over `&[f32]`, so it builds and tests on every platform.

use system_capture_core::models::audio_buffer::AudioBuffer;
use system_capture_core::models::error::CaptureError;

use crate::mix_format::MixFormat;

/// Change the channel count of interleaved samples.
///
/// Downmixing to mono averages every channel of a frame. Otherwise output
/// channel `c` takes input channel `c % from`, so mono is duplicated and
/// surround layouts keep their front pair.
pub fn remix(samples: &[f32], from: usize, to: usize) -> Vec<f32> {
    if from == to || from == 0 || to == 0 {
        return samples.to_vec();
    }

    let frames = samples.chunks_exact(from);
    if to == 1 {
        return frames.map(|frame| frame.iter().sum::<f32>() / from as f32).collect();
    }
    frames
        .flat_map(|frame| (0..to).map(move |c| frame[c % from]))
        .collect()
}

/// Streaming linear-interpolation resampler for interleaved audio.
///
/// Keeps the last frame of the previous packet so interpolation runs across
/// packet boundaries without clicks.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    /// Input frames advanced per output frame.
    step: f64,
    channels: usize,
    /// Read position relative to the first frame of the next packet. Lies in
    /// `[-1, 0)` once a previous frame is held.
    position: f64,
    previous: Option<Vec<f32>>,
}

impl LinearResampler {
    pub fn new(source_rate: f64, target_rate: f64, channels: u16) -> Self {
        Self {
            step: source_rate / target_rate,
            channels: usize::from(channels.max(1)),
            position: 0.0,
            previous: None,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        (self.step - 1.0).abs() < f64::EPSILON
    }

    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if self.is_passthrough() {
            return input.to_vec();
        }

        let channels = self.channels;
        let frames = input.len() / channels;
        if frames == 0 {
            return Vec::new();
        }

        let previous = self.previous.as_deref();
        let sample = |frame: isize, c: usize| -> f32 {
            if frame < 0 {
                previous.map_or(0.0, |p| p[c])
            } else {
                input[frame as usize * channels + c]
            }
        };

        let last = (frames - 1) as f64;
        let mut position = self.position;
        let mut output = Vec::with_capacity(((frames as f64 / self.step).ceil() as usize + 1) * channels);
        while position < last {
            let base = position.floor();
            let fraction = (position - base) as f32;
            let index = base as isize;
            for c in 0..channels {
                let a = sample(index, c);
                let b = sample(index + 1, c);
                output.push(a + (b - a) * fraction);
            }
            position += self.step;
        }

        self.position = position - frames as f64;
        self.previous = Some(input[(frames - 1) * channels..frames * channels].to_vec());
        output
    }
}

/// Turns raw packets in the device mix format into buffers at the requested
/// sample rate and channel count.
#[derive(Debug, Clone)]
pub struct PacketConverter {
    mix: MixFormat,
    target_rate: f64,
    target_channels: u16,
    resampler: LinearResampler,
}

impl PacketConverter {
    pub fn new(mix: MixFormat, target_rate: f64, target_channels: u16) -> Result<Self, CaptureError> {
        if mix.encoding().is_none() {
            return Err(CaptureError::StreamStartFailed(format!(
                "unsupported mix format: tag {:#06x}, {} bits",
                mix.effective_tag(),
                mix.bits_per_sample
            )));
        }
        if mix.channels == 0 || target_channels == 0 || target_rate <= 0.0 || mix.sample_rate <= 0.0 {
            return Err(CaptureError::StreamStartFailed(format!(
                "invalid conversion {} Hz/{} ch -> {} Hz/{} ch",
                mix.sample_rate, mix.channels, target_rate, target_channels
            )));
        }

        Ok(Self {
            mix,
            target_rate,
            target_channels,
            resampler: LinearResampler::new(mix.sample_rate, target_rate, target_channels),
        })
    }

    pub fn is_passthrough(&self) -> bool {
        self.mix.channels == self.target_channels && self.resampler.is_passthrough()
    }

    /// Convert one packet. `None` when the packet yields no whole output frame.
    pub fn convert(&mut self, packet: &[u8]) -> Option<AudioBuffer> {
        let decoded = self.mix.decode(packet)?;
        let remixed = remix(
            &decoded,
            usize::from(self.mix.channels),
            usize::from(self.target_channels),
        );
        let samples = self.resampler.process(&remixed);
        if samples.is_empty() {
            return None;
        }
        Some(AudioBuffer::from_f32(&samples, self.target_rate, self.target_channels))
    }
}
