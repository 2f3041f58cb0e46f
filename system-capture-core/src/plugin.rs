use std::io;
use std::sync::Arc;

use crate::delivery::audio_channel::{AudioChannel, DEFAULT_MAX_PENDING_CHUNKS};
use crate::delivery::dispatcher::Dispatcher;
use crate::delivery::status_channel::StatusChannel;
use crate::models::config::{CaptureConfiguration, SessionTiming};
use crate::models::state::SessionState;
use crate::processing::sample_converter::SampleConverter;
use crate::session::capture_session::CaptureSession;
use crate::session::guard::{PendingResult, SessionGuard};
use crate::traits::capture_backend::CaptureBackend;
use crate::traits::capture_delegate::CaptureDelegate;

/// Options for building a [`SystemCapture`].
#[derive(Clone, Default)]
pub struct CaptureOptions {
    pub timing: SessionTiming,
    pub delegate: Option<Arc<dyn CaptureDelegate>>,
    pub converter: Option<SampleConverter>,
    /// Audio chunks held for a slow listener; `None` uses the default.
    pub audio_backlog: Option<usize>,
}

/// Application-facing surface of the plugin.
///
/// Owns the delivery thread, the two subscriptions and the serialized
/// session. All start/stop calls go through the session guard.
pub struct SystemCapture<B: CaptureBackend> {
    backend: Arc<B>,
    guard: SessionGuard,
    audio: AudioChannel,
    status: StatusChannel,
    delegate: Option<Arc<dyn CaptureDelegate>>,
    dispatcher: Arc<Dispatcher>,
}

impl<B: CaptureBackend> SystemCapture<B> {
    pub fn new(backend: B) -> io::Result<Self> {
        Self::with_options(backend, CaptureOptions::default())
    }

    pub fn with_options(backend: B, options: CaptureOptions) -> io::Result<Self> {
        let backend = Arc::new(backend);
        let dispatcher = Arc::new(Dispatcher::spawn("capture-delivery")?);
        let audio = AudioChannel::with_capacity(
            Arc::clone(&dispatcher),
            options.audio_backlog.unwrap_or(DEFAULT_MAX_PENDING_CHUNKS),
        );
        let status = StatusChannel::new(Arc::clone(&dispatcher));

        let mut session = CaptureSession::new(Arc::clone(&backend), audio.clone(), status.clone())
            .with_timing(options.timing);
        if let Some(converter) = options.converter {
            session = session.with_converter(converter);
        }
        if let Some(delegate) = &options.delegate {
            session.set_delegate(Arc::clone(delegate));
        }

        Ok(Self {
            backend,
            guard: SessionGuard::spawn(session)?,
            audio,
            status,
            delegate: options.delegate,
            dispatcher,
        })
    }

    /// Start capturing system audio; `None` uses the default configuration.
    pub fn start_capture(&self, config: Option<CaptureConfiguration>) -> bool {
        self.guard.start(config.unwrap_or_default())
    }

    /// Queue a start without waiting for it.
    pub fn start_capture_async(&self, config: Option<CaptureConfiguration>) -> PendingResult {
        self.guard.submit_start(config.unwrap_or_default())
    }

    /// Stop capturing. Always `true`.
    pub fn stop_capture(&self) -> bool {
        self.guard.stop()
    }

    /// Queue a stop without waiting for it.
    pub fn stop_capture_async(&self) -> PendingResult {
        self.guard.submit_stop()
    }

    pub fn is_supported(&self) -> bool {
        self.backend.is_supported()
    }

    /// Ask the OS for capture permission.
    ///
    /// The OS prompts at most once. When access is still missing afterwards
    /// the delegate is asked to guide the user to the system settings.
    pub fn request_permission(&self) -> bool {
        if self.backend.has_permission() {
            return true;
        }

        if self.backend.request_permission() {
            log::info!("Screen capture permission granted");
            return true;
        }

        log::warn!("Screen capture permission not granted; user must enable it in system settings");
        if let Some(delegate) = &self.delegate {
            delegate.on_permission_required();
        }
        false
    }

    /// Byte-stream subscription of canonical PCM chunks.
    pub fn audio_stream(&self) -> &AudioChannel {
        &self.audio
    }

    /// Status subscription; replays the current value on listen.
    pub fn status_stream(&self) -> &StatusChannel {
        &self.status
    }

    pub fn is_active(&self) -> bool {
        self.status.current().is_active
    }

    pub fn state(&self) -> SessionState {
        self.guard.state()
    }

    /// Block until every delivery queued so far has reached its listener.
    pub fn flush_deliveries(&self) {
        self.dispatcher.flush();
    }
}
