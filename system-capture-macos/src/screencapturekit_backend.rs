//! ScreenCaptureKit capture backend.
//!
//! System audio on macOS is only available as a side channel of a screen
//! capture stream. The stream is pointed at a display with a minimal video
//! surface and the audio output is forwarded to the core as interleaved PCM
//! in whatever encoding the sample buffer describes.

use std::sync::Arc;

use parking_lot::Mutex;
use screencapturekit::cm::{CMFormatDescription, CMSampleBuffer, CMTime};
use screencapturekit::shareable_content::SCShareableContent;
use screencapturekit::stream::configuration::SCStreamConfiguration;
use screencapturekit::stream::content_filter::SCContentFilter;
use screencapturekit::stream::output_trait::SCStreamOutputTrait;
use screencapturekit::stream::output_type::SCStreamOutputType;
use screencapturekit::stream::SCStream;

use system_capture_core::models::audio_buffer::OutputKind;
use system_capture_core::models::error::CaptureError;
use system_capture_core::models::stream_settings::StreamSettings;
use system_capture_core::traits::capture_backend::{BufferCallback, CaptureBackend, CaptureStream, CaptureTarget};

use crate::permissions;
use crate::planar::{self, PlaneFormat};

/// macOS system audio capture through ScreenCaptureKit.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScreenCaptureKitBackend;

impl ScreenCaptureKitBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureBackend for ScreenCaptureKitBackend {
    type Stream = ScreenCaptureKitStream;

    fn is_supported(&self) -> bool {
        true
    }

    fn has_permission(&self) -> bool {
        permissions::has_screen_capture_access()
    }

    fn request_permission(&self) -> bool {
        permissions::request_screen_capture_access()
    }

    fn capture_targets(&self) -> Result<Vec<CaptureTarget>, CaptureError> {
        let content = shareable_content()?;
        Ok(content
            .displays()
            .iter()
            .map(|display| {
                let id = display.display_id();
                CaptureTarget {
                    id: id.to_string(),
                    name: format!("Display {}", id),
                }
            })
            .collect())
    }

    fn create_stream(
        &self,
        target: &CaptureTarget,
        settings: &StreamSettings,
    ) -> Result<Self::Stream, CaptureError> {
        let content = shareable_content()?;
        let displays = content.displays();
        let display = displays
            .iter()
            .find(|display| display.display_id().to_string() == target.id)
            .ok_or(CaptureError::NoCaptureTargetAvailable)?;

        let filter = SCContentFilter::builder().display(display).build();

        let frame_interval = CMTime::new(settings.minimum_frame_interval.as_secs() as i64, 1);
        let mut config = SCStreamConfiguration::new();
        config
            .set_captures_audio(settings.captures_audio)
            .set_sample_rate(settings.sample_rate as i32)
            .set_channel_count(i32::from(settings.channel_count))
            .set_excludes_current_process_audio(settings.excludes_current_process_audio)
            .set_width(settings.width)
            .set_height(settings.height)
            .set_minimum_frame_interval(&frame_interval)
            .set_queue_depth(settings.queue_depth)
            .set_shows_cursor(settings.shows_cursor);

        log::debug!(
            "Creating SCStream for display {} ({} Hz, {} ch)",
            target.id,
            settings.sample_rate,
            settings.channel_count
        );

        Ok(ScreenCaptureKitStream {
            stream: SCStream::new(&filter, &config),
            callback: Arc::new(Mutex::new(None)),
            handlers_registered: false,
            sample_rate: settings.sample_rate,
        })
    }
}

fn shareable_content() -> Result<SCShareableContent, CaptureError> {
    SCShareableContent::get().map_err(|e| {
        log::error!("Failed to get shareable content: {:?}", e);
        CaptureError::NoCaptureTargetAvailable
    })
}

/// One ScreenCaptureKit stream plus the slot its output handlers forward to.
///
/// The OS keeps the handlers for the lifetime of the stream; removing the
/// output empties the slot so late buffers are dropped here.
pub struct ScreenCaptureKitStream {
    stream: SCStream,
    callback: Arc<Mutex<Option<BufferCallback>>>,
    handlers_registered: bool,
    sample_rate: f64,
}

// SAFETY: SCStream is only driven from the session worker thread; the OS
// invokes output handlers on its own queue and they touch only the slot.
unsafe impl Send for ScreenCaptureKitStream {}

impl CaptureStream for ScreenCaptureKitStream {
    fn add_output(&mut self, callback: BufferCallback) -> Result<(), CaptureError> {
        *self.callback.lock() = Some(callback);

        if !self.handlers_registered {
            for (of_type, kind) in [
                (SCStreamOutputType::Audio, OutputKind::Audio),
                (SCStreamOutputType::Screen, OutputKind::Screen),
            ] {
                let handler = OutputHandler {
                    callback: Arc::clone(&self.callback),
                    kind,
                    sample_rate: self.sample_rate,
                };
                self.stream.add_output_handler(handler, of_type);
            }
            self.handlers_registered = true;
        }
        Ok(())
    }

    fn remove_output(&mut self) -> Result<(), CaptureError> {
        self.callback.lock().take();
        Ok(())
    }

    fn start_capture(&mut self) -> Result<(), CaptureError> {
        self.stream
            .start_capture()
            .map_err(|e| CaptureError::StreamStartFailed(format!("{:?}", e)))
    }

    fn stop_capture(&mut self) -> Result<(), CaptureError> {
        self.stream
            .stop_capture()
            .map_err(|e| CaptureError::StreamStopFailed(format!("{:?}", e)))
    }
}

struct OutputHandler {
    callback: Arc<Mutex<Option<BufferCallback>>>,
    kind: OutputKind,
    sample_rate: f64,
}

impl SCStreamOutputTrait for OutputHandler {
    fn did_output_sample_buffer(&self, sample_buffer: CMSampleBuffer, _of_type: SCStreamOutputType) {
        // Video frames only keep the stream alive.
        if self.kind == OutputKind::Screen {
            return;
        }

        let Some(callback) = self.callback.lock().clone() else {
            return;
        };

        let Some(audio_buffers) = sample_buffer.audio_buffer_list() else {
            return;
        };
        if audio_buffers.num_buffers() == 0 {
            return;
        }

        let description = sample_buffer.format_description();
        let sample_rate = description
            .as_ref()
            .and_then(|fd| fd.audio_sample_rate())
            .map(f64::from)
            .unwrap_or(self.sample_rate);
        let format = description.as_ref().map(plane_format).unwrap_or_default();

        if let Some(buffer) = planar::planar_to_buffer(audio_buffers.iter().map(|b| b.data()), &format, sample_rate) {
            callback(buffer, OutputKind::Audio);
        }
    }
}

/// Read the stream description, falling back to ScreenCaptureKit's float32
/// default for any field the description leaves out.
fn plane_format(description: &CMFormatDescription) -> PlaneFormat {
    let fallback = PlaneFormat::default();
    PlaneFormat {
        format_id: fallback.format_id,
        format_flags: description.audio_format_flags().unwrap_or(fallback.format_flags),
        bits_per_channel: description
            .audio_bits_per_channel()
            .filter(|bits| *bits > 0)
            .unwrap_or(fallback.bits_per_channel),
        channels: description.audio_channel_count().unwrap_or(fallback.channels),
    }
}
