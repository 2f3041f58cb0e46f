use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::delivery::dispatcher::Dispatcher;
use crate::models::state::StatusEvent;
use crate::traits::sinks::StatusSink;

struct StatusSlot {
    current: StatusEvent,
    listener: Option<Weak<dyn StatusSink>>,
    /// Bumped on every `listen`/`cancel`.
    generation: u64,
}

impl StatusSlot {
    /// The listener if it is still the one subscribed at `generation`.
    fn listener_at(&self, generation: u64) -> Option<Arc<dyn StatusSink>> {
        if self.generation != generation {
            return None;
        }
        self.listener.as_ref().and_then(Weak::upgrade)
    }
}

/// Status subscription with replay-last-value semantics.
///
/// A new listener immediately receives the current status; afterwards it
/// receives one event per change of `is_active`. Every queued delivery is
/// tagged with the subscription generation it was posted under. An event
/// queued before a `listen` is skipped, since the replay already carries it.
#[derive(Clone)]
pub struct StatusChannel {
    slot: Arc<Mutex<StatusSlot>>,
    dispatcher: Arc<Dispatcher>,
}

impl StatusChannel {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(StatusSlot {
                current: StatusEvent::now(false, None),
                listener: None,
                generation: 0,
            })),
            dispatcher,
        }
    }

    /// Subscribe `sink` and replay the current status to it.
    pub fn listen(&self, sink: Arc<dyn StatusSink>) {
        let mut slot = self.slot.lock();
        slot.generation += 1;
        slot.listener = Some(Arc::downgrade(&sink));
        let current = slot.current.clone();
        self.post(current, slot.generation);
    }

    pub fn cancel(&self) {
        let mut slot = self.slot.lock();
        slot.generation += 1;
        slot.listener = None;
    }

    pub fn current(&self) -> StatusEvent {
        self.slot.lock().current.clone()
    }

    /// Record a new status. Emits only when `is_active` actually changes;
    /// returns whether an event was emitted.
    pub fn publish(&self, is_active: bool, device_name: Option<String>) -> bool {
        let mut slot = self.slot.lock();
        if slot.current.is_active == is_active {
            return false;
        }

        let event = StatusEvent::now(is_active, device_name);
        slot.current = event.clone();
        self.post(event, slot.generation);
        true
    }

    fn post(&self, event: StatusEvent, generation: u64) {
        let slot = Arc::clone(&self.slot);
        self.dispatcher.post(move || {
            let sink = slot.lock().listener_at(generation);
            if let Some(sink) = sink {
                sink.on_status(&event);
            }
        });
    }
}
