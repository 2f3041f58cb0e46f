//! Screen recording permission (TCC) for ScreenCaptureKit.
//!
//! System audio is only delivered through a screen capture stream, so the
//! app needs the Screen Recording privacy grant. The OS shows its consent
//! dialog at most once; after a denial the user has to flip the switch in
//! System Settings > Privacy & Security > Screen Recording.

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGPreflightScreenCaptureAccess() -> bool;
    fn CGRequestScreenCaptureAccess() -> bool;
}

/// Whether screen capture access is granted. Never prompts.
pub fn has_screen_capture_access() -> bool {
    // SAFETY: no arguments, no preconditions.
    unsafe { CGPreflightScreenCaptureAccess() }
}

/// Trigger the OS consent dialog if it has not been shown yet.
///
/// Returns the access state after the request. A grant made from the dialog
/// usually only takes effect after the app restarts.
pub fn request_screen_capture_access() -> bool {
    // SAFETY: no arguments, no preconditions.
    let granted = unsafe { CGRequestScreenCaptureAccess() };
    log::debug!("CGRequestScreenCaptureAccess returned {}", granted);
    granted
}
