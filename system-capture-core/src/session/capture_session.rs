use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::delivery::audio_channel::AudioChannel;
use crate::delivery::status_channel::StatusChannel;
use crate::models::audio_buffer::{AudioBuffer, OutputKind};
use crate::models::config::{CaptureConfiguration, SessionTiming};
use crate::models::error::CaptureError;
use crate::models::state::SessionState;
use crate::models::stream_settings::StreamSettings;
use crate::processing::sample_converter::SampleConverter;
use crate::traits::capture_backend::{BufferCallback, CaptureBackend, CaptureStream, CaptureTarget};
use crate::traits::capture_delegate::CaptureDelegate;

/// Receives `(stream generation, error)` when a running stream dies.
pub type InterruptNotifier = Arc<dyn Fn(u64, CaptureError) + Send + Sync + 'static>;

/// Lifecycle of one system-audio capture.
///
/// Not thread-safe on its own: every `start`/`stop` must come from a single
/// serialized context, which `SessionGuard` provides. The buffer callback it
/// hands to the OS is independent of the session and only touches the
/// converter and the audio channel.
///
/// ```text
/// [OS stream] → callback → [SampleConverter] → [AudioChannel] → dispatcher → listener
///      ↑
/// start/stop (serialized) → state → [StatusChannel] → dispatcher → listener
/// ```
pub struct CaptureSession<B: CaptureBackend> {
    backend: Arc<B>,
    state: Arc<Mutex<SessionState>>,
    config: Option<CaptureConfiguration>,
    stream: Option<B::Stream>,
    /// Bumped for every stream opened; tags interruption reports.
    stream_generation: u64,
    interrupts: Option<InterruptNotifier>,
    timing: SessionTiming,
    converter: SampleConverter,
    audio: AudioChannel,
    status: StatusChannel,
    delegate: Option<Arc<dyn CaptureDelegate>>,
}

impl<B: CaptureBackend> CaptureSession<B> {
    pub fn new(backend: Arc<B>, audio: AudioChannel, status: StatusChannel) -> Self {
        Self {
            backend,
            state: Arc::new(Mutex::new(SessionState::Idle)),
            config: None,
            stream: None,
            stream_generation: 0,
            interrupts: None,
            timing: SessionTiming::default(),
            converter: SampleConverter::new(),
            audio,
            status,
            delegate: None,
        }
    }

    pub fn with_timing(mut self, timing: SessionTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_converter(mut self, converter: SampleConverter) -> Self {
        self.converter = converter;
        self
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn CaptureDelegate>) {
        self.delegate = Some(delegate);
    }

    /// Route runtime stream failures back into the serialized context.
    /// Installed by `SessionGuard`.
    pub fn set_interrupt_notifier(&mut self, notifier: InterruptNotifier) {
        self.interrupts = Some(notifier);
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Shared read-only view of the state for observers on other threads.
    pub fn state_handle(&self) -> Arc<Mutex<SessionState>> {
        Arc::clone(&self.state)
    }

    /// Configuration of the running capture, if any.
    pub fn configuration(&self) -> Option<CaptureConfiguration> {
        self.config
    }

    pub fn has_stream(&self) -> bool {
        self.stream.is_some()
    }

    /// Start capturing. Transitions: idle → starting → active.
    ///
    /// An active capture is torn down first (active → stopping → idle) so
    /// that no two OS streams ever coexist. Any failure unwinds to idle and
    /// returns `false`; nothing is retried.
    pub fn start(&mut self, config: CaptureConfiguration) -> bool {
        if !self.state().is_idle() || self.stream.is_some() {
            log::info!("Capture already active, stopping before restart");
            self.teardown();
            pause(self.timing.restart_gap);
        }

        self.set_state(SessionState::Starting);
        self.stream_generation += 1;

        match self.open_stream(&config, self.stream_generation) {
            Ok((stream, target)) => {
                self.stream = Some(stream);
                self.config = Some(config);
                self.set_state(SessionState::Active);
                self.status.publish(true, Some(target.name));
                log::info!(
                    "System audio capture started ({} Hz, {} ch)",
                    config.sample_rate,
                    config.channel_count
                );
                true
            }
            Err(error) => {
                log::error!("Failed to start system audio capture: {}", error);
                self.set_state(SessionState::Idle);
                self.status.publish(false, None);
                if let Some(delegate) = &self.delegate {
                    if error == CaptureError::PermissionDenied {
                        delegate.on_permission_required();
                    }
                    delegate.on_error(&error);
                }
                false
            }
        }
    }

    /// Stop capturing. Transitions: active → stopping → idle.
    ///
    /// Best-effort and idempotent: always returns `true`, and stopping an
    /// idle session changes nothing.
    pub fn stop(&mut self) -> bool {
        if self.state().is_idle() && self.stream.is_none() {
            log::debug!("Stop requested while idle");
            return true;
        }
        self.teardown();
        true
    }

    /// A stream reported a runtime failure. Tears the capture down if the
    /// report belongs to the current stream; stale reports are ignored.
    pub fn handle_interruption(&mut self, generation: u64, error: CaptureError) {
        if generation != self.stream_generation || self.stream.is_none() {
            log::debug!("Ignoring interruption from a released stream: {}", error);
            return;
        }

        log::error!("System audio capture interrupted: {}", error);
        self.teardown();
        if let Some(delegate) = &self.delegate {
            delegate.on_error(&error);
        }
    }

    /// Handle one buffer from the OS capture layer.
    pub fn on_buffer(&self, buffer: AudioBuffer, kind: OutputKind) {
        forward_buffer(&self.converter, &self.audio, buffer, kind);
    }

    // --- Internal helpers ---

    fn set_state(&self, next: SessionState) {
        {
            let mut state = self.state.lock();
            debug_assert!(
                state.can_transition_to(next),
                "illegal transition {:?} -> {:?}",
                *state,
                next
            );
            log::debug!("Capture session {:?} -> {:?}", *state, next);
            *state = next;
        }
        if let Some(delegate) = &self.delegate {
            delegate.on_state_changed(next);
        }
    }

    /// Every step of bringing up a stream. Dropping the stream on an error
    /// path releases it.
    fn open_stream(
        &self,
        config: &CaptureConfiguration,
        generation: u64,
    ) -> Result<(B::Stream, CaptureTarget), CaptureError> {
        config.validate().map_err(CaptureError::ConfigurationFailed)?;

        if !self.backend.has_permission() {
            return Err(CaptureError::PermissionDenied);
        }

        let target = self
            .backend
            .capture_targets()?
            .into_iter()
            .next()
            .ok_or(CaptureError::NoCaptureTargetAvailable)?;
        log::info!("Capturing from target {} ({})", target.name, target.id);

        let settings = StreamSettings::for_audio(config);
        let mut stream = self.backend.create_stream(&target, &settings)?;

        stream.add_output(self.output_callback())?;
        if let Some(notifier) = &self.interrupts {
            let notifier = Arc::clone(notifier);
            stream.set_interrupt_handler(Arc::new(move |error| notifier(generation, error)));
        }

        if let Err(error) = stream.start_capture() {
            if let Err(remove_error) = stream.remove_output() {
                log::warn!("Failed to remove output after start failure: {}", remove_error);
            }
            return Err(error);
        }

        pause(self.timing.start_settle);
        Ok((stream, target))
    }

    fn output_callback(&self) -> BufferCallback {
        let converter = self.converter;
        let audio = self.audio.clone();
        Arc::new(move |buffer: AudioBuffer, kind: OutputKind| {
            forward_buffer(&converter, &audio, buffer, kind);
        })
    }

    /// Forced teardown. Runs in the caller's serialized context.
    fn teardown(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            if !self.state().is_idle() {
                self.set_state(SessionState::Idle);
                self.status.publish(false, None);
            }
            return;
        };

        self.set_state(SessionState::Stopping);

        // Unregister first so no buffer is handed to a stream being torn down.
        if let Err(error) = stream.remove_output() {
            log::warn!("Failed to remove stream output: {}", error);
        }

        match stream.stop_capture() {
            Ok(()) => pause(self.timing.stop_settle),
            Err(error) => {
                log::warn!("Error during stop: {}", error);
                if let Some(delegate) = &self.delegate {
                    delegate.on_error(&error);
                }
            }
        }

        drop(stream);
        self.config = None;
        self.set_state(SessionState::Idle);
        self.status.publish(false, None);
        log::info!("System audio capture stopped");
    }
}

impl<B: CaptureBackend> Drop for CaptureSession<B> {
    fn drop(&mut self) {
        if self.stream.is_some() {
            self.teardown();
        }
    }
}

/// Convert one delivery and hand it to the audio channel. Non-audio outputs
/// and unsupported formats are dropped.
fn forward_buffer(converter: &SampleConverter, audio: &AudioChannel, buffer: AudioBuffer, kind: OutputKind) {
    if kind != OutputKind::Audio {
        return;
    }
    match converter.convert(&buffer) {
        Ok(pcm) => audio.deliver(pcm),
        Err(error) => log::debug!("Dropping audio buffer: {}", error),
    }
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::dispatcher::Dispatcher;
    use crate::models::audio_buffer::SampleFormat;
    use crate::processing::format_log::FormatLog;
    use crate::testing::{MockBackend, Recorder};

    struct Fixture {
        backend: MockBackend,
        session: CaptureSession<MockBackend>,
        recorder: Arc<Recorder>,
        dispatcher: Arc<Dispatcher>,
    }

    impl Fixture {
        fn new() -> Self {
            let backend = MockBackend::new();
            let dispatcher = Arc::new(Dispatcher::spawn("test-delivery").unwrap());
            let audio = AudioChannel::new(Arc::clone(&dispatcher));
            let status = StatusChannel::new(Arc::clone(&dispatcher));
            let recorder = Arc::new(Recorder::default());
            audio.listen(recorder.clone());
            status.listen(recorder.clone());

            let converter = SampleConverter::with_format_log(Box::leak(Box::new(FormatLog::new())));
            let mut session = CaptureSession::new(Arc::new(backend.clone()), audio, status)
                .with_timing(SessionTiming::immediate())
                .with_converter(converter);
            session.set_delegate(recorder.clone());

            Self {
                backend,
                session,
                recorder,
                dispatcher,
            }
        }

        fn statuses(&self) -> Vec<bool> {
            self.dispatcher.flush();
            self.recorder.statuses.lock().clone()
        }

        fn audio(&self) -> Vec<Vec<u8>> {
            self.dispatcher.flush();
            self.recorder.audio.lock().clone()
        }
    }

    #[test]
    fn start_then_stop_returns_to_idle_without_handle() {
        let mut f = Fixture::new();

        assert!(f.session.start(CaptureConfiguration::default()));
        assert_eq!(f.session.state(), SessionState::Active);
        assert_eq!(f.backend.open_streams(), 1);

        assert!(f.session.stop());
        assert_eq!(f.session.state(), SessionState::Idle);
        assert!(!f.session.has_stream());
        assert_eq!(f.backend.open_streams(), 0);
        assert!(f.session.configuration().is_none());
        assert_eq!(f.statuses(), vec![false, true, false]);
    }

    #[test]
    fn walks_every_state_in_order() {
        let mut f = Fixture::new();
        f.session.start(CaptureConfiguration::default());
        f.session.stop();

        assert_eq!(
            *f.recorder.states.lock(),
            vec![
                SessionState::Starting,
                SessionState::Active,
                SessionState::Stopping,
                SessionState::Idle,
            ]
        );
    }

    #[test]
    fn registers_output_before_start_and_removes_it_before_stop() {
        let mut f = Fixture::new();
        f.session.start(CaptureConfiguration::default());
        f.session.stop();

        assert_eq!(
            f.backend.calls(),
            vec!["create", "add_output", "start", "remove_output", "stop", "release"]
        );
    }

    #[test]
    fn builds_stream_from_configuration() {
        let mut f = Fixture::new();
        let config = CaptureConfiguration {
            sample_rate: 48000.0,
            channel_count: 2,
        };
        f.session.start(config);

        let settings = f.backend.state.lock().last_settings.unwrap();
        assert_eq!(settings, StreamSettings::for_audio(&config));
        assert_eq!(f.session.configuration(), Some(config));
    }

    #[test]
    fn restart_while_active_stops_first() {
        let mut f = Fixture::new();
        f.session.start(CaptureConfiguration::default());

        assert!(f.session.start(CaptureConfiguration {
            sample_rate: 48000.0,
            channel_count: 2,
        }));

        assert_eq!(f.session.state(), SessionState::Active);
        assert_eq!(f.backend.open_streams(), 1);
        let state = f.backend.state.lock();
        assert_eq!(state.max_open_streams, 1);
        assert_eq!(state.streams_created, 2);
        drop(state);
        assert_eq!(f.statuses(), vec![false, true, false, true]);
    }

    #[test]
    fn stop_while_idle_is_silent_success() {
        let mut f = Fixture::new();

        assert!(f.session.stop());
        assert!(f.session.stop());

        assert!(f.backend.calls().is_empty());
        assert!(f.recorder.states.lock().is_empty());
        assert_eq!(f.statuses(), vec![false]);
    }

    #[test]
    fn missing_permission_fails_fast_with_guidance() {
        let mut f = Fixture::new();
        f.backend.state.lock().permission = false;

        assert!(!f.session.start(CaptureConfiguration::default()));

        assert_eq!(f.session.state(), SessionState::Idle);
        assert!(f.backend.calls().is_empty());
        assert_eq!(*f.recorder.permission_prompts.lock(), 1);
        assert_eq!(*f.recorder.errors.lock(), vec![CaptureError::PermissionDenied]);
        assert_eq!(f.backend.state.lock().permission_requests, 0);
    }

    #[test]
    fn no_target_unwinds_to_idle() {
        let mut f = Fixture::new();
        f.backend.state.lock().targets.clear();

        assert!(!f.session.start(CaptureConfiguration::default()));

        assert_eq!(f.session.state(), SessionState::Idle);
        assert_eq!(
            *f.recorder.errors.lock(),
            vec![CaptureError::NoCaptureTargetAvailable]
        );
        assert_eq!(f.statuses(), vec![false]);
    }

    #[test]
    fn creation_failure_unwinds_to_idle() {
        let mut f = Fixture::new();
        f.backend.state.lock().fail_create = true;

        assert!(!f.session.start(CaptureConfiguration::default()));
        assert_eq!(f.session.state(), SessionState::Idle);
        assert_eq!(f.backend.open_streams(), 0);
    }

    #[test]
    fn output_registration_failure_releases_stream() {
        let mut f = Fixture::new();
        f.backend.state.lock().fail_add_output = true;

        assert!(!f.session.start(CaptureConfiguration::default()));
        assert_eq!(f.backend.open_streams(), 0);
        assert!(!f.session.has_stream());
    }

    #[test]
    fn start_failure_releases_stream_and_callback() {
        let mut f = Fixture::new();
        f.backend.state.lock().fail_start = true;

        assert!(!f.session.start(CaptureConfiguration::default()));

        assert_eq!(f.session.state(), SessionState::Idle);
        assert_eq!(f.backend.open_streams(), 0);
        assert!(f.backend.state.lock().callback.is_none());
        assert_eq!(
            f.backend.calls(),
            vec!["create", "add_output", "start", "remove_output", "release"]
        );
        assert_eq!(f.statuses(), vec![false]);
    }

    #[test]
    fn failed_start_can_be_retried_by_caller() {
        let mut f = Fixture::new();
        f.backend.state.lock().fail_start = true;
        assert!(!f.session.start(CaptureConfiguration::default()));

        f.backend.state.lock().fail_start = false;
        assert!(f.session.start(CaptureConfiguration::default()));
        assert_eq!(f.session.state(), SessionState::Active);
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let mut f = Fixture::new();
        let config = CaptureConfiguration {
            sample_rate: -1.0,
            channel_count: 1,
        };

        assert!(!f.session.start(config));
        assert!(matches!(
            f.recorder.errors.lock().as_slice(),
            [CaptureError::ConfigurationFailed(_)]
        ));
    }

    #[test]
    fn stop_failure_is_swallowed() {
        let mut f = Fixture::new();
        f.session.start(CaptureConfiguration::default());
        f.backend.state.lock().fail_stop = true;

        assert!(f.session.stop());

        assert_eq!(f.session.state(), SessionState::Idle);
        assert_eq!(f.backend.open_streams(), 0);
        assert_eq!(f.statuses(), vec![false, true, false]);
        assert!(matches!(
            f.recorder.errors.lock().as_slice(),
            [CaptureError::StreamStopFailed(_)]
        ));
    }

    #[test]
    fn audio_buffers_are_converted_and_forwarded() {
        let mut f = Fixture::new();
        f.session.start(CaptureConfiguration::default());

        assert!(f.backend.emit(AudioBuffer::from_f32(&[1.0, 0.0], 48000.0, 1), OutputKind::Audio));
        assert!(f.backend.emit(AudioBuffer::from_i16(&[5], 16000.0, 1), OutputKind::Audio));

        assert_eq!(f.audio(), vec![vec![0xFF, 0x7F, 0x00, 0x00], vec![0x05, 0x00]]);
    }

    #[test]
    fn screen_buffers_are_ignored() {
        let mut f = Fixture::new();
        f.session.start(CaptureConfiguration::default());

        f.backend.emit(AudioBuffer::from_f32(&[0.5], 48000.0, 1), OutputKind::Screen);
        assert!(f.audio().is_empty());
    }

    #[test]
    fn unsupported_buffers_are_dropped_without_side_effects() {
        let mut f = Fixture::new();
        f.session.start(CaptureConfiguration::default());

        let unsupported = AudioBuffer {
            format: SampleFormat::Unknown(0x756c_6177),
            bits_per_channel: 8,
            ..AudioBuffer::from_i16(&[1, 2], 8000.0, 1)
        };
        f.backend.emit(unsupported, OutputKind::Audio);
        f.backend.emit(AudioBuffer::from_i16(&[7], 16000.0, 1), OutputKind::Audio);

        assert_eq!(f.session.state(), SessionState::Active);
        assert_eq!(f.audio(), vec![vec![0x07, 0x00]]);
        assert!(f.recorder.errors.lock().is_empty());
    }

    #[test]
    fn buffers_from_a_retained_callback_are_harmless_after_stop() {
        let mut f = Fixture::new();
        f.session.start(CaptureConfiguration::default());
        let late_callback = f.backend.state.lock().callback.clone().unwrap();
        f.session.stop();

        late_callback(AudioBuffer::from_i16(&[3], 16000.0, 1), OutputKind::Audio);

        assert_eq!(f.session.state(), SessionState::Idle);
        assert_eq!(f.audio(), vec![vec![0x03, 0x00]]);
    }

    #[test]
    fn on_buffer_uses_the_same_pipeline() {
        let f = Fixture::new();
        f.session.on_buffer(AudioBuffer::from_i16(&[9], 16000.0, 1), OutputKind::Audio);
        f.session.on_buffer(AudioBuffer::from_i16(&[9], 16000.0, 1), OutputKind::Screen);

        assert_eq!(f.audio(), vec![vec![0x09, 0x00]]);
    }

    #[test]
    fn status_names_the_capture_target_while_active() {
        let mut f = Fixture::new();
        f.session.start(CaptureConfiguration::default());
        f.session.stop();
        f.dispatcher.flush();

        assert_eq!(
            *f.recorder.devices.lock(),
            vec![None, Some("Built-in Display".to_string()), None]
        );
    }

    fn collect_interruptions(session: &mut CaptureSession<MockBackend>) -> Arc<Mutex<Vec<(u64, CaptureError)>>> {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        session.set_interrupt_notifier(Arc::new(move |generation, error| {
            sink.lock().push((generation, error));
        }));
        reports
    }

    #[test]
    fn interruption_tears_down_the_running_stream() {
        let mut f = Fixture::new();
        let reports = collect_interruptions(&mut f.session);
        f.session.start(CaptureConfiguration::default());

        let error = CaptureError::StreamInterrupted("device removed".into());
        assert!(f.backend.interrupt(error.clone()));
        let (generation, reported) = reports.lock().pop().unwrap();
        assert_eq!(reported, error);

        f.session.handle_interruption(generation, reported);

        assert_eq!(f.session.state(), SessionState::Idle);
        assert_eq!(f.backend.open_streams(), 0);
        assert_eq!(f.statuses(), vec![false, true, false]);
        assert_eq!(*f.recorder.errors.lock(), vec![error]);
    }

    #[test]
    fn interruption_from_a_replaced_stream_is_ignored() {
        let mut f = Fixture::new();
        let reports = collect_interruptions(&mut f.session);
        f.session.start(CaptureConfiguration::default());
        let old_handler = f.backend.state.lock().interrupt.clone().unwrap();

        f.session.start(CaptureConfiguration::default());
        old_handler(CaptureError::StreamInterrupted("late".into()));
        let (generation, error) = reports.lock().pop().unwrap();
        f.session.handle_interruption(generation, error);

        assert_eq!(f.session.state(), SessionState::Active);
        assert_eq!(f.backend.open_streams(), 1);
        assert!(f.recorder.errors.lock().is_empty());
    }

    #[test]
    fn interruption_after_stop_is_ignored() {
        let mut f = Fixture::new();
        let reports = collect_interruptions(&mut f.session);
        f.session.start(CaptureConfiguration::default());
        f.session.stop();

        f.backend.interrupt(CaptureError::StreamInterrupted("late".into()));
        let (generation, error) = reports.lock().pop().unwrap();
        f.session.handle_interruption(generation, error);

        assert_eq!(f.session.state(), SessionState::Idle);
        assert!(f.recorder.errors.lock().is_empty());
        assert_eq!(f.statuses(), vec![false, true, false]);
    }

    #[test]
    fn dropping_an_active_session_releases_the_stream() {
        let mut f = Fixture::new();
        f.session.start(CaptureConfiguration::default());
        let backend = f.backend.clone();

        drop(f.session);

        assert_eq!(backend.open_streams(), 0);
        assert!(backend.calls().ends_with(&["remove_output", "stop", "release"]));
    }
}
