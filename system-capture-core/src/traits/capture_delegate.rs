use crate::models::error::CaptureError;
use crate::models::state::SessionState;

/// Event delegate for capture session notifications.
///
/// All methods are called from the session's serialized worker thread, not
/// the UI thread. Implementations should marshal to the UI thread if needed.
pub trait CaptureDelegate: Send + Sync {
    /// Called on every session state transition.
    fn on_state_changed(&self, _state: SessionState) {}

    /// Called when capture needs a permission the user has not granted.
    /// Hosts typically point the user at the system privacy settings.
    fn on_permission_required(&self) {}

    /// Called when a start fails or a stop reports an error.
    fn on_error(&self, _error: &CaptureError) {}
}
