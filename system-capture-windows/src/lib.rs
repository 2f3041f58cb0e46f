//! # system-capture-windows
//!
//! Windows WASAPI backend for system-capture-kit.
//!
//! Provides:
//! - `WasapiLoopbackBackend`: system audio via WASAPI loopback on a render endpoint
//! - `DeviceEnumerator`: render endpoints as capture targets via the MMDevice API
//! - `mix_format`: decoding of the device mix format
//! - `packet_converter`: resampling and channel remixing to the requested format
//!
//! ## Platform Requirements
//! - Windows 10 1703+ (build 15063)
//! - Visual Studio Build Tools 2022 + Windows SDK for linking
//!
//! ## Usage
//! ```ignore
//! use system_capture_core::SystemCapture;
//! use system_capture_windows::WasapiLoopbackBackend;
//!
//! let capture = SystemCapture::new(WasapiLoopbackBackend::new())?;
//! capture.start_capture(None);
//! ```

pub mod mix_format;
pub mod packet_converter;

#[cfg(target_os = "windows")]
pub mod device_enumerator;
#[cfg(target_os = "windows")]
pub mod wasapi_loopback;

#[cfg(target_os = "windows")]
pub use device_enumerator::DeviceEnumerator;
#[cfg(target_os = "windows")]
pub use wasapi_loopback::{WasapiLoopbackBackend, WasapiLoopbackStream};
