use std::io;
use std::sync::mpsc;
use std::thread;

use parking_lot::Mutex;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Single consumer-visible delivery context.
///
/// Every audio chunk and status event is posted here and run on one named
/// thread in post order, so subscribers never see deliveries from two
/// threads at once.
pub struct Dispatcher {
    jobs: Mutex<Option<mpsc::Sender<Job>>>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn spawn(name: &str) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel::<Job>();

        let handle = thread::Builder::new().name(name.into()).spawn(move || {
            for job in rx {
                job();
            }
        })?;

        Ok(Self {
            jobs: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Queue `job` for delivery. Returns `false` once the dispatcher is shut down.
    pub fn post<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        match self.jobs.lock().as_ref() {
            Some(tx) => tx.send(Box::new(job)).is_ok(),
            None => false,
        }
    }

    /// Block until every job posted before this call has run.
    pub fn flush(&self) {
        let (done_tx, done_rx) = mpsc::channel();
        if self.post(move || {
            let _ = done_tx.send(());
        }) {
            let _ = done_rx.recv();
        }
    }

    /// Stop accepting jobs, run the ones already queued, and join the thread.
    pub fn shutdown(&self) {
        self.jobs.lock().take();

        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        // A job that drops the last owner would otherwise join its own thread.
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            log::error!("Delivery thread panicked");
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
