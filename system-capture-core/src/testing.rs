//! Scripted backend and recording sinks for session tests.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::audio_buffer::{AudioBuffer, OutputKind};
use crate::models::error::CaptureError;
use crate::models::state::{SessionState, StatusEvent};
use crate::models::stream_settings::StreamSettings;
use crate::traits::capture_backend::{
    BufferCallback, CaptureBackend, CaptureStream, CaptureTarget, InterruptCallback,
};
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::sinks::{AudioSink, StatusSink};

#[derive(Default)]
pub(crate) struct MockState {
    pub permission: bool,
    pub grant_on_request: bool,
    pub permission_requests: usize,
    pub targets: Vec<CaptureTarget>,
    pub fail_create: bool,
    pub fail_add_output: bool,
    pub fail_start: bool,
    pub fail_stop: bool,
    pub start_delay: Duration,
    pub open_streams: usize,
    pub max_open_streams: usize,
    pub streams_created: usize,
    pub last_settings: Option<StreamSettings>,
    pub callback: Option<BufferCallback>,
    pub interrupt: Option<InterruptCallback>,
    pub calls: Vec<&'static str>,
}

/// Backend whose behaviour is scripted by the test. Clones share state.
#[derive(Clone)]
pub(crate) struct MockBackend {
    pub state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// Permission granted, one display.
    pub fn new() -> Self {
        let state = MockState {
            permission: true,
            targets: vec![CaptureTarget {
                id: "display-1".into(),
                name: "Built-in Display".into(),
            }],
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Deliver a buffer through the registered callback, as the OS would.
    pub fn emit(&self, buffer: AudioBuffer, kind: OutputKind) -> bool {
        let callback = self.state.lock().callback.clone();
        match callback {
            Some(callback) => {
                callback(buffer, kind);
                true
            }
            None => false,
        }
    }

    /// Report a runtime failure through the registered handler, as the OS would.
    pub fn interrupt(&self, error: CaptureError) -> bool {
        let handler = self.state.lock().interrupt.clone();
        match handler {
            Some(handler) => {
                handler(error);
                true
            }
            None => false,
        }
    }

    pub fn open_streams(&self) -> usize {
        self.state.lock().open_streams
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().calls.clone()
    }
}

impl CaptureBackend for MockBackend {
    type Stream = MockStream;

    fn is_supported(&self) -> bool {
        true
    }

    fn has_permission(&self) -> bool {
        self.state.lock().permission
    }

    fn request_permission(&self) -> bool {
        let mut state = self.state.lock();
        state.permission_requests += 1;
        if state.grant_on_request {
            state.permission = true;
        }
        state.permission
    }

    fn capture_targets(&self) -> Result<Vec<CaptureTarget>, CaptureError> {
        Ok(self.state.lock().targets.clone())
    }

    fn create_stream(
        &self,
        _target: &CaptureTarget,
        settings: &StreamSettings,
    ) -> Result<MockStream, CaptureError> {
        let mut state = self.state.lock();
        state.calls.push("create");
        if state.fail_create {
            return Err(CaptureError::StreamCreationFailed("scripted".into()));
        }
        state.last_settings = Some(*settings);
        state.streams_created += 1;
        state.open_streams += 1;
        state.max_open_streams = state.max_open_streams.max(state.open_streams);
        Ok(MockStream {
            state: Arc::clone(&self.state),
        })
    }
}

pub(crate) struct MockStream {
    state: Arc<Mutex<MockState>>,
}

impl CaptureStream for MockStream {
    fn add_output(&mut self, callback: BufferCallback) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        state.calls.push("add_output");
        if state.fail_add_output {
            return Err(CaptureError::StreamCreationFailed("scripted output failure".into()));
        }
        state.callback = Some(callback);
        Ok(())
    }

    fn set_interrupt_handler(&mut self, handler: InterruptCallback) {
        self.state.lock().interrupt = Some(handler);
    }

    fn remove_output(&mut self) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        state.calls.push("remove_output");
        state.callback = None;
        Ok(())
    }

    fn start_capture(&mut self) -> Result<(), CaptureError> {
        let delay = {
            let mut state = self.state.lock();
            state.calls.push("start");
            if state.fail_start {
                return Err(CaptureError::StreamStartFailed("scripted".into()));
            }
            state.start_delay
        };
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        Ok(())
    }

    fn stop_capture(&mut self) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        state.calls.push("stop");
        if state.fail_stop {
            return Err(CaptureError::StreamStopFailed("scripted".into()));
        }
        Ok(())
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.calls.push("release");
        state.open_streams -= 1;
    }
}

/// Records everything delivered to it.
#[derive(Default)]
pub(crate) struct Recorder {
    pub audio: Mutex<Vec<Vec<u8>>>,
    pub statuses: Mutex<Vec<bool>>,
    pub devices: Mutex<Vec<Option<String>>>,
    pub states: Mutex<Vec<SessionState>>,
    pub errors: Mutex<Vec<CaptureError>>,
    pub permission_prompts: Mutex<usize>,
}

impl AudioSink for Recorder {
    fn on_audio(&self, pcm: &[u8]) {
        self.audio.lock().push(pcm.to_vec());
    }
}

impl StatusSink for Recorder {
    fn on_status(&self, status: &StatusEvent) {
        self.statuses.lock().push(status.is_active);
        self.devices.lock().push(status.device_name.clone());
    }
}

impl CaptureDelegate for Recorder {
    fn on_state_changed(&self, state: SessionState) {
        self.states.lock().push(state);
    }

    fn on_permission_required(&self) {
        *self.permission_prompts.lock() += 1;
    }

    fn on_error(&self, error: &CaptureError) {
        self.errors.lock().push(error.clone());
    }
}
