use std::sync::Arc;

use crate::models::audio_buffer::{AudioBuffer, OutputKind};
use crate::models::error::CaptureError;
use crate::models::stream_settings::StreamSettings;

/// Callback invoked by the OS capture layer for every delivered buffer.
///
/// Runs on a backend-owned thread, independently of the session. It may fire
/// at any time while a stream exists, including shortly after a stop has
/// been requested.
pub type BufferCallback = Arc<dyn Fn(AudioBuffer, OutputKind) + Send + Sync + 'static>;

/// Callback a stream fires once when it dies while capturing.
pub type InterruptCallback = Arc<dyn Fn(CaptureError) + Send + Sync + 'static>;

/// A source the OS can capture from (a display, a render endpoint).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureTarget {
    pub id: String,
    pub name: String,
}

/// Platform screen/audio capture capability.
///
/// Implemented by:
/// - `ScreenCaptureKitBackend` (macOS)
/// - `WasapiLoopbackBackend` (Windows)
pub trait CaptureBackend: Send + Sync + 'static {
    type Stream: CaptureStream;

    /// Static capability flag: whether this platform can capture system audio at all.
    fn is_supported(&self) -> bool;

    /// Whether capture permission is currently granted. Never prompts.
    fn has_permission(&self) -> bool;

    /// One-shot OS permission prompt. Once denied, the OS will not prompt
    /// again and the user has to grant access in system settings.
    fn request_permission(&self) -> bool;

    /// Available capture targets, in the OS's preferred order.
    fn capture_targets(&self) -> Result<Vec<CaptureTarget>, CaptureError>;

    /// Build (but do not start) a stream for `target`.
    fn create_stream(
        &self,
        target: &CaptureTarget,
        settings: &StreamSettings,
    ) -> Result<Self::Stream, CaptureError>;
}

/// An exclusively owned OS capture stream. Dropping it releases the handle.
pub trait CaptureStream: Send {
    /// Register the per-frame buffer callback.
    fn add_output(&mut self, callback: BufferCallback) -> Result<(), CaptureError>;

    /// Register the handler for runtime failures. Streams that cannot fail
    /// after a successful start may ignore it.
    fn set_interrupt_handler(&mut self, _handler: InterruptCallback) {}

    /// Unregister the buffer callback. Buffers already in flight may still
    /// arrive on the old callback.
    fn remove_output(&mut self) -> Result<(), CaptureError>;

    /// Begin capture. Blocks until the OS confirms.
    fn start_capture(&mut self) -> Result<(), CaptureError>;

    /// End capture. Blocks until the OS confirms.
    fn stop_capture(&mut self) -> Result<(), CaptureError>;
}
