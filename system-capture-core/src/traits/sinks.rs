use crate::models::state::StatusEvent;

/// Consumer of canonical PCM chunks (16-bit signed little-endian).
pub trait AudioSink: Send + Sync {
    fn on_audio(&self, pcm: &[u8]);
}

/// Consumer of capture status updates.
pub trait StatusSink: Send + Sync {
    fn on_status(&self, status: &StatusEvent);
}

impl<F> AudioSink for F
where
    F: Fn(&[u8]) + Send + Sync,
{
    fn on_audio(&self, pcm: &[u8]) {
        self(pcm)
    }
}

impl<F> StatusSink for F
where
    F: Fn(&StatusEvent) + Send + Sync,
{
    fn on_status(&self, status: &StatusEvent) {
        self(status)
    }
}
