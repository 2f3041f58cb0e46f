//! Render endpoint enumeration via the MMDevice API.
//!
//! Loopback capture reads from render (speaker/headphone) endpoints, so
//! those are the capture targets on Windows. The default endpoint is listed
//! first.

use windows::core::*;
use windows::Win32::Devices::FunctionDiscovery::*;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::StructuredStorage::PropVariantClear;
use windows::Win32::System::Com::*;
use windows::Win32::System::Variant::*;

use system_capture_core::models::error::CaptureError;
use system_capture_core::traits::capture_backend::CaptureTarget;

/// Render endpoint enumerator.
pub struct DeviceEnumerator {
    enumerator: IMMDeviceEnumerator,
}

impl DeviceEnumerator {
    /// Requires COM to be initialized on the calling thread.
    pub fn new() -> Result<Self, CaptureError> {
        unsafe {
            let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                .map_err(|e| CaptureError::ConfigurationFailed(format!("failed to create enumerator: {}", e)))?;
            Ok(Self { enumerator })
        }
    }

    /// Active render endpoints, default first.
    pub fn render_targets(&self) -> Result<Vec<CaptureTarget>, CaptureError> {
        unsafe {
            let collection = self
                .enumerator
                .EnumAudioEndpoints(eRender, DEVICE_STATE_ACTIVE)
                .map_err(|e| CaptureError::ConfigurationFailed(format!("EnumAudioEndpoints failed: {}", e)))?;

            let count = collection
                .GetCount()
                .map_err(|e| CaptureError::ConfigurationFailed(format!("GetCount failed: {}", e)))?;

            let default_id = self
                .enumerator
                .GetDefaultAudioEndpoint(eRender, eConsole)
                .ok()
                .and_then(|d| d.GetId().ok())
                .and_then(|id| id.to_string().ok());

            let mut targets = Vec::new();
            for i in 0..count {
                let Ok(device) = collection.Item(i) else {
                    continue;
                };
                let Some(id) = device.GetId().ok().and_then(|id| id.to_string().ok()) else {
                    continue;
                };
                let name = friendly_name(&device).unwrap_or_else(|| format!("Output {}", i));

                let target = CaptureTarget { id, name };
                if default_id.as_deref() == Some(target.id.as_str()) {
                    targets.insert(0, target);
                } else {
                    targets.push(target);
                }
            }

            Ok(targets)
        }
    }

    /// Open an endpoint by its MMDevice id.
    pub fn device(&self, id: &str) -> Result<IMMDevice, CaptureError> {
        let wide: Vec<u16> = id.encode_utf16().chain(std::iter::once(0)).collect();
        unsafe {
            self.enumerator
                .GetDevice(PCWSTR(wide.as_ptr()))
                .map_err(|_| CaptureError::NoCaptureTargetAvailable)
        }
    }
}

/// PKEY_Device_FriendlyName of a device.
fn friendly_name(device: &IMMDevice) -> Option<String> {
    unsafe {
        let store = device.OpenPropertyStore(STGM_READ).ok()?;

        let mut prop_variant = std::mem::zeroed::<PROPVARIANT>();
        store.GetValue(&PKEY_Device_FriendlyName, &mut prop_variant).ok()?;

        let name = if prop_variant.Anonymous.Anonymous.vt == VT_LPWSTR {
            let pwsz = prop_variant.Anonymous.Anonymous.Anonymous.pwszVal;
            if pwsz.is_null() {
                None
            } else {
                pwsz.to_string().ok()
            }
        } else {
            None
        };

        PropVariantClear(&mut prop_variant).ok();
        name
    }
}
