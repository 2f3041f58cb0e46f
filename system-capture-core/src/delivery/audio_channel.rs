use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::delivery::dispatcher::Dispatcher;
use crate::traits::sinks::AudioSink;

/// Chunks held for a slow listener before the oldest are dropped.
pub const DEFAULT_MAX_PENDING_CHUNKS: usize = 64;

#[derive(Default)]
struct Backlog {
    chunks: VecDeque<Vec<u8>>,
    /// A drain job is queued on the dispatcher.
    draining: bool,
    dropped: u64,
}

/// Byte-stream subscription carrying canonical PCM chunks.
///
/// Holds only a weak reference to the listener: the channel never keeps a
/// consumer alive, so the caller must hold its `Arc` for as long as it wants
/// audio. The listener is looked up when a chunk is delivered, not when it is
/// captured, so a cancelled listener receives nothing further.
///
/// Chunks wait in a bounded backlog; when the listener falls behind, the
/// oldest chunk is dropped. At most one drain job sits on the dispatcher, so
/// status events queued behind audio are never held back for long.
#[derive(Clone)]
pub struct AudioChannel {
    listener: Arc<Mutex<Option<Weak<dyn AudioSink>>>>,
    backlog: Arc<Mutex<Backlog>>,
    capacity: usize,
    dispatcher: Arc<Dispatcher>,
}

impl AudioChannel {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self::with_capacity(dispatcher, DEFAULT_MAX_PENDING_CHUNKS)
    }

    pub fn with_capacity(dispatcher: Arc<Dispatcher>, capacity: usize) -> Self {
        Self {
            listener: Arc::new(Mutex::new(None)),
            backlog: Arc::new(Mutex::new(Backlog::default())),
            capacity: capacity.max(1),
            dispatcher,
        }
    }

    /// Subscribe `sink`, replacing any previous listener.
    pub fn listen(&self, sink: Arc<dyn AudioSink>) {
        *self.listener.lock() = Some(Arc::downgrade(&sink));
    }

    pub fn cancel(&self) {
        self.listener.lock().take();
        self.backlog.lock().chunks.clear();
    }

    /// Whether a live listener is subscribed.
    pub fn is_listening(&self) -> bool {
        self.listener
            .lock()
            .as_ref()
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Chunks waiting for the listener.
    pub fn pending(&self) -> usize {
        self.backlog.lock().chunks.len()
    }

    /// Chunks dropped because the listener fell behind.
    pub fn dropped(&self) -> u64 {
        self.backlog.lock().dropped
    }

    /// Forward one chunk to the listener on the delivery thread.
    pub fn deliver(&self, pcm: Vec<u8>) {
        if pcm.is_empty() || !self.is_listening() {
            return;
        }

        {
            let mut backlog = self.backlog.lock();
            if backlog.chunks.len() >= self.capacity {
                backlog.chunks.pop_front();
                backlog.dropped += 1;
                log::debug!("Audio listener is behind, dropped oldest chunk");
            }
            backlog.chunks.push_back(pcm);
            if backlog.draining {
                return;
            }
            backlog.draining = true;
        }
        self.schedule_drain();
    }

    fn schedule_drain(&self) {
        let channel = self.clone();
        if !self.dispatcher.post(move || channel.drain()) {
            self.backlog.lock().draining = false;
        }
    }

    /// Deliver what was pending when the job started, then yield the
    /// dispatcher to whatever was queued meanwhile.
    fn drain(&self) {
        let batch = self.backlog.lock().chunks.len();
        for _ in 0..batch {
            let Some(chunk) = self.backlog.lock().chunks.pop_front() else {
                break;
            };
            let sink = self.listener.lock().as_ref().and_then(Weak::upgrade);
            if let Some(sink) = sink {
                sink.on_audio(&chunk);
            }
        }

        let more = {
            let mut backlog = self.backlog.lock();
            backlog.draining = !backlog.chunks.is_empty();
            backlog.draining
        };
        if more {
            self.schedule_drain();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[derive(Default)]
    struct Collector {
        chunks: Mutex<Vec<Vec<u8>>>,
    }

    impl AudioSink for Collector {
        fn on_audio(&self, pcm: &[u8]) {
            self.chunks.lock().push(pcm.to_vec());
        }
    }

    fn channel() -> (AudioChannel, Arc<Dispatcher>) {
        let dispatcher = Arc::new(Dispatcher::spawn("test-delivery").unwrap());
        (AudioChannel::new(Arc::clone(&dispatcher)), dispatcher)
    }

    #[test]
    fn delivers_chunks_to_listener() {
        let (channel, dispatcher) = channel();
        let collector = Arc::new(Collector::default());
        channel.listen(collector.clone());

        channel.deliver(vec![1, 2]);
        channel.deliver(vec![3, 4]);
        dispatcher.flush();

        assert_eq!(*collector.chunks.lock(), vec![vec![1, 2], vec![3, 4]]);
        assert_eq!(channel.pending(), 0);
    }

    #[test]
    fn stalled_listener_keeps_backlog_bounded() {
        let dispatcher = Arc::new(Dispatcher::spawn("test-delivery").unwrap());
        let channel = AudioChannel::with_capacity(Arc::clone(&dispatcher), 4);
        let collector = Arc::new(Collector::default());
        channel.listen(collector.clone());

        let (release_tx, release_rx) = mpsc::channel::<()>();
        dispatcher.post(move || {
            let _ = release_rx.recv();
        });

        for i in 0..100u8 {
            channel.deliver(vec![i]);
            assert!(channel.pending() <= 4);
        }
        assert_eq!(channel.pending(), 4);
        assert_eq!(channel.dropped(), 96);

        let status_seen = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&status_seen);
        dispatcher.post(move || *flag.lock() = true);

        drop(release_tx);
        dispatcher.flush();

        assert_eq!(
            *collector.chunks.lock(),
            vec![vec![96], vec![97], vec![98], vec![99]]
        );
        assert!(*status_seen.lock());
        assert_eq!(channel.pending(), 0);
    }

    #[test]
    fn cancelled_listener_receives_nothing() {
        let (channel, dispatcher) = channel();
        let collector = Arc::new(Collector::default());
        channel.listen(collector.clone());
        channel.cancel();

        channel.deliver(vec![1, 2]);
        dispatcher.flush();

        assert!(collector.chunks.lock().is_empty());
        assert!(!channel.is_listening());
    }

    #[test]
    fn does_not_keep_listener_alive() {
        let (channel, _dispatcher) = channel();
        let collector = Arc::new(Collector::default());
        channel.listen(collector.clone());
        assert!(channel.is_listening());

        drop(collector);
        assert!(!channel.is_listening());
        channel.deliver(vec![1, 2]);
        assert_eq!(channel.pending(), 0);
    }

    #[test]
    fn closures_can_listen() {
        let (channel, dispatcher) = channel();
        let total = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&total);
        let sink: Arc<dyn AudioSink> = Arc::new(move |pcm: &[u8]| *counter.lock() += pcm.len());
        channel.listen(Arc::clone(&sink));

        channel.deliver(vec![0; 6]);
        dispatcher.flush();

        assert_eq!(*total.lock(), 6);
    }
}
