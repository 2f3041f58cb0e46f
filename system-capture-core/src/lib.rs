//! # system-capture-core
//!
//! Platform-agnostic system audio capture core.
//!
//! Provides the capture session state machine, request serialization, PCM
//! normalization and the delivery channels a UI plugin exposes. Platform
//! backends (macOS ScreenCaptureKit, Windows WASAPI loopback) implement the
//! `CaptureBackend` trait and plug into the generic `SystemCapture`.
//!
//! ## Architecture
//!
//! ```text
//! system-capture-core (this crate)
//! ├── traits/       ← CaptureBackend, CaptureStream, CaptureDelegate, AudioSink, StatusSink
//! ├── models/       ← CaptureConfiguration, StreamSettings, SessionState, AudioBuffer, errors
//! ├── processing/   ← SampleConverter, FormatLog
//! ├── delivery/     ← Dispatcher, AudioChannel, StatusChannel
//! ├── session/      ← CaptureSession (state machine), SessionGuard (serialization)
//! ├── plugin        ← SystemCapture (application-facing surface)
//! └── method        ← JSON method-call adapter
//! ```

pub mod delivery;
pub mod method;
pub mod models;
pub mod plugin;
pub mod processing;
pub mod session;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types at crate root for convenience.
pub use delivery::audio_channel::AudioChannel;
pub use delivery::dispatcher::Dispatcher;
pub use delivery::status_channel::StatusChannel;
pub use method::{MethodCall, MethodResult};
pub use models::audio_buffer::{AudioBuffer, OutputKind, SampleFormat};
pub use models::config::{CaptureConfiguration, SessionTiming};
pub use models::error::{CaptureError, ConversionError};
pub use models::state::{SessionState, StatusEvent};
pub use models::stream_settings::StreamSettings;
pub use plugin::{CaptureOptions, SystemCapture};
pub use processing::format_log::{FormatDescription, FormatLog};
pub use processing::sample_converter::SampleConverter;
pub use session::capture_session::CaptureSession;
pub use session::guard::{PendingResult, SessionGuard};
pub use traits::capture_backend::{BufferCallback, CaptureBackend, CaptureStream, CaptureTarget, InterruptCallback};
pub use traits::capture_delegate::CaptureDelegate;
pub use traits::sinks::{AudioSink, StatusSink};
