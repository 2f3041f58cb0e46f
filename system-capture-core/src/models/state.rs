use serde::Serialize;

/// Capture session state machine.
///
/// State transitions:
/// ```text
/// idle → starting → active → stopping → idle
///           ↓
///          idle   (any start failure)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Starting,
    Active,
    Stopping,
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Whether moving to `next` is a single legal step.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Starting)
                | (Self::Starting, Self::Active)
                | (Self::Starting, Self::Idle)
                | (Self::Active, Self::Stopping)
                | (Self::Stopping, Self::Idle)
        )
    }
}

/// Status broadcast to the status subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub is_active: bool,
    /// Milliseconds since the Unix epoch when the status was published.
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
    /// Name of the capture target while active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
}

impl StatusEvent {
    pub fn now(is_active: bool, device_name: Option<String>) -> Self {
        Self {
            is_active,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            device_name,
        }
    }
}
