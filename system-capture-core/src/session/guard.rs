use std::io;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::models::config::CaptureConfiguration;
use crate::models::error::CaptureError;
use crate::models::state::SessionState;
use crate::session::capture_session::CaptureSession;
use crate::traits::capture_backend::CaptureBackend;

enum Request {
    Start {
        config: CaptureConfiguration,
        reply: mpsc::Sender<bool>,
    },
    Stop {
        reply: mpsc::Sender<bool>,
    },
    Interrupted {
        generation: u64,
        error: CaptureError,
    },
}

/// Result of a queued request. Resolves once the session has finished it.
#[must_use = "a pending result does nothing unless waited on"]
pub struct PendingResult {
    reply: mpsc::Receiver<bool>,
    fallback: bool,
}

impl PendingResult {
    /// Block until the request completes.
    ///
    /// If the worker is gone, starts report `false` and stops report `true`.
    pub fn wait(self) -> bool {
        self.reply.recv().unwrap_or(self.fallback)
    }
}

/// Serializes every start/stop for one `CaptureSession`.
///
/// The session is moved onto a single worker thread that drains an ordered
/// queue, so overlapping callers can never interleave partial transitions
/// and a forced teardown always runs inside the request that needed it.
/// Runtime stream failures are queued the same way, behind any pending
/// requests. Dropping the guard finishes queued requests, tears the session down and
/// joins the worker.
pub struct SessionGuard {
    requests: Arc<Mutex<Option<mpsc::Sender<Request>>>>,
    worker: Option<thread::JoinHandle<()>>,
    state: Arc<Mutex<SessionState>>,
}

impl SessionGuard {
    pub fn spawn<B: CaptureBackend>(mut session: CaptureSession<B>) -> io::Result<Self> {
        let state = session.state_handle();
        let (tx, rx) = mpsc::channel::<Request>();
        let requests = Arc::new(Mutex::new(Some(tx)));

        // Holds the shared slot, not a sender, so dropping the guard still
        // disconnects the worker.
        let interrupts = Arc::clone(&requests);
        session.set_interrupt_notifier(Arc::new(move |generation, error| {
            if let Some(tx) = interrupts.lock().as_ref() {
                let _ = tx.send(Request::Interrupted { generation, error });
            }
        }));

        let worker = thread::Builder::new()
            .name("capture-session".into())
            .spawn(move || run_worker(session, rx))?;

        Ok(Self {
            requests,
            worker: Some(worker),
            state,
        })
    }

    /// Queue a start and return immediately.
    pub fn submit_start(&self, config: CaptureConfiguration) -> PendingResult {
        let (reply, rx) = mpsc::channel();
        self.submit(Request::Start { config, reply });
        PendingResult {
            reply: rx,
            fallback: false,
        }
    }

    /// Queue a stop and return immediately.
    pub fn submit_stop(&self) -> PendingResult {
        let (reply, rx) = mpsc::channel();
        self.submit(Request::Stop { reply });
        PendingResult {
            reply: rx,
            fallback: true,
        }
    }

    /// Start and wait for the outcome.
    pub fn start(&self, config: CaptureConfiguration) -> bool {
        self.submit_start(config).wait()
    }

    /// Stop and wait for the outcome. Always `true`.
    pub fn stop(&self) -> bool {
        self.submit_stop().wait()
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    fn submit(&self, request: Request) {
        let sent = match self.requests.lock().as_ref() {
            Some(tx) => tx.send(request).is_ok(),
            None => false,
        };
        if !sent {
            log::warn!("Capture session worker is not running; request dropped");
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.requests.lock().take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Capture session worker panicked");
            }
        }
    }
}

fn run_worker<B: CaptureBackend>(mut session: CaptureSession<B>, requests: mpsc::Receiver<Request>) {
    for request in requests {
        match request {
            Request::Start { config, reply } => {
                log::debug!("Processing start request");
                let _ = reply.send(session.start(config));
            }
            Request::Stop { reply } => {
                log::debug!("Processing stop request");
                let _ = reply.send(session.stop());
            }
            Request::Interrupted { generation, error } => {
                session.handle_interruption(generation, error);
            }
        }
    }
    log::debug!("Capture session worker exiting");
}
