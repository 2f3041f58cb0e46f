//! # system-capture-macos
//!
//! macOS ScreenCaptureKit backend for system-capture-kit.
//!
//! Provides:
//! - `ScreenCaptureKitBackend`: system audio through a display capture stream
//! - `permissions`: Screen Recording (TCC) preflight and prompt
//!
//! ## Platform Requirements
//! - macOS 13+ for ScreenCaptureKit audio
//! - Screen Recording permission for the host app
//!
//! ## Usage
//! ```ignore
//! use system_capture_core::SystemCapture;
//! use system_capture_macos::ScreenCaptureKitBackend;
//!
//! let capture = SystemCapture::new(ScreenCaptureKitBackend::new())?;
//! capture.request_permission();
//! capture.start_capture(None);
//! ```

pub mod planar;

#[cfg(target_os = "macos")]
pub mod permissions;
#[cfg(target_os = "macos")]
pub mod screencapturekit_backend;

#[cfg(target_os = "macos")]
pub use screencapturekit_backend::{ScreenCaptureKitBackend, ScreenCaptureKitStream};

/// Deep link to the Screen Recording pane of System Settings.
pub const PRIVACY_SETTINGS_URL: &str = "x-apple.systempreferences:com.apple.preference.security?Privacy_ScreenCapture";
