//! WASAPI loopback capture backend for system audio.
//!
//! Captures the mix going to a render endpoint using
//! `AUDCLNT_STREAMFLAGS_LOOPBACK`. No special permissions are needed on
//! Windows.
//!
//! ## Key Differences from macOS
//! - No entitlements, code signing, or TCC permissions required
//! - Captures audio for a specific render device (not all devices)
//! - Packets arrive in the device mix format and are resampled and remixed
//!   to the requested sample rate/channels before delivery
//! - A device removed mid-capture ends the stream and is reported through
//!   the interrupt handler
//! - DRM-protected audio is silenced in loopback

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use windows::core::PCWSTR;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;
use windows::Win32::System::Threading::*;

use system_capture_core::models::audio_buffer::OutputKind;
use system_capture_core::models::error::CaptureError;
use system_capture_core::models::stream_settings::StreamSettings;
use system_capture_core::traits::capture_backend::{
    BufferCallback, CaptureBackend, CaptureStream, CaptureTarget, InterruptCallback,
};

use crate::device_enumerator::DeviceEnumerator;
use crate::mix_format::{MixFormat, WAVE_FORMAT_EXTENSIBLE};
use crate::packet_converter::PacketConverter;

/// Shared-mode buffer length in 100ns units (100ms).
const BUFFER_DURATION: i64 = 1_000_000;
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Windows system audio capture through WASAPI loopback.
#[derive(Debug, Default, Clone, Copy)]
pub struct WasapiLoopbackBackend;

impl WasapiLoopbackBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureBackend for WasapiLoopbackBackend {
    type Stream = WasapiLoopbackStream;

    fn is_supported(&self) -> bool {
        true
    }

    /// Loopback capture is unrestricted.
    fn has_permission(&self) -> bool {
        true
    }

    fn request_permission(&self) -> bool {
        true
    }

    fn capture_targets(&self) -> Result<Vec<CaptureTarget>, CaptureError> {
        let _com = ComGuard::initialize()?;
        DeviceEnumerator::new()?.render_targets()
    }

    fn create_stream(
        &self,
        target: &CaptureTarget,
        settings: &StreamSettings,
    ) -> Result<Self::Stream, CaptureError> {
        log::debug!(
            "Creating loopback stream on '{}' (requested {} Hz, {} ch)",
            target.name,
            settings.sample_rate,
            settings.channel_count
        );
        Ok(WasapiLoopbackStream {
            device_id: target.id.clone(),
            target_rate: settings.sample_rate,
            target_channels: settings.channel_count,
            callback: Arc::new(Mutex::new(None)),
            interrupt: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            capture_handle: None,
        })
    }
}

/// A loopback stream. COM objects live on the capture thread only.
pub struct WasapiLoopbackStream {
    device_id: String,
    target_rate: f64,
    target_channels: u16,
    callback: Arc<Mutex<Option<BufferCallback>>>,
    interrupt: Arc<Mutex<Option<InterruptCallback>>>,
    running: Arc<AtomicBool>,
    capture_handle: Option<thread::JoinHandle<()>>,
}

impl CaptureStream for WasapiLoopbackStream {
    fn add_output(&mut self, callback: BufferCallback) -> Result<(), CaptureError> {
        *self.callback.lock() = Some(callback);
        Ok(())
    }

    fn set_interrupt_handler(&mut self, handler: InterruptCallback) {
        *self.interrupt.lock() = Some(handler);
    }

    fn remove_output(&mut self) -> Result<(), CaptureError> {
        self.callback.lock().take();
        Ok(())
    }

    fn start_capture(&mut self) -> Result<(), CaptureError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CaptureError::StreamStartFailed("loopback capture already running".into()));
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let callback = Arc::clone(&self.callback);
        let interrupt = Arc::clone(&self.interrupt);
        let device_id = self.device_id.clone();
        let target = (self.target_rate, self.target_channels);
        let (started_tx, started_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("wasapi-loopback-capture".into())
            .spawn(move || {
                let result = loopback_capture_loop(&device_id, target, &running, &callback, started_tx);
                running.store(false, Ordering::SeqCst);
                match result {
                    Ok(()) => {}
                    Err(e @ CaptureError::StreamInterrupted(_)) => {
                        log::error!("Loopback capture failed while running: {}", e);
                        let handler = interrupt.lock().take();
                        if let Some(notify) = handler {
                            notify(e);
                        }
                    }
                    Err(e) => log::error!("Loopback capture setup failed: {}", e),
                }
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                CaptureError::StreamStartFailed(format!("failed to spawn loopback thread: {}", e))
            })?;
        self.capture_handle = Some(handle);

        // The thread reports once the client is started or setup failed.
        match started_rx.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.join();
                Err(e)
            }
            Err(_) => {
                self.join();
                Err(CaptureError::StreamStartFailed("loopback thread exited during setup".into()))
            }
        }
    }

    fn stop_capture(&mut self) -> Result<(), CaptureError> {
        self.running.store(false, Ordering::SeqCst);
        self.join();
        Ok(())
    }
}

impl WasapiLoopbackStream {
    fn join(&mut self) {
        if let Some(handle) = self.capture_handle.take() {
            if handle.join().is_err() {
                log::error!("Loopback capture thread panicked");
            }
        }
    }
}

impl Drop for WasapiLoopbackStream {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.join();
    }
}

/// Capture loop running on the dedicated thread.
///
/// Sequence:
/// 1. CoInitializeEx (MTA)
/// 2. Open the target render endpoint
/// 3. Activate IAudioClient, read the mix format
/// 4. Initialize with LOOPBACK flag in shared mode
/// 5. Get IAudioCaptureClient, build the packet converter, register with MMCSS
/// 6. Start, confirm to the caller, poll for buffers
///
/// Failures after the confirmation are `StreamInterrupted`.
fn loopback_capture_loop(
    device_id: &str,
    (target_rate, target_channels): (f64, u16),
    running: &AtomicBool,
    callback: &Mutex<Option<BufferCallback>>,
    started: mpsc::Sender<Result<(), CaptureError>>,
) -> Result<(), CaptureError> {
    let setup = unsafe { open_loopback_client(device_id) };
    let (_com, audio_client, capture_client, mix) = match setup {
        Ok(client) => client,
        Err(e) => {
            let _ = started.send(Err(e.clone()));
            return Err(e);
        }
    };

    let mut converter = match PacketConverter::new(mix, target_rate, target_channels) {
        Ok(converter) => converter,
        Err(e) => {
            let _ = started.send(Err(e.clone()));
            return Err(e);
        }
    };

    unsafe {
        let mut task_index: u32 = 0;
        let task_name: Vec<u16> = "Pro Audio\0".encode_utf16().collect();
        let _mmcss_handle = AvSetMmThreadCharacteristicsW(PCWSTR(task_name.as_ptr()), &mut task_index);

        if let Err(e) = audio_client.Start() {
            let error = CaptureError::StreamStartFailed(format!("IAudioClient::Start failed: {}", e));
            let _ = started.send(Err(error.clone()));
            return Err(error);
        }
    }
    let _ = started.send(Ok(()));
    log::info!(
        "Loopback capture started: {} Hz, {} ch, {} bits -> {} Hz, {} ch",
        mix.sample_rate,
        mix.channels,
        mix.bits_per_sample,
        target_rate,
        target_channels
    );

    let result = unsafe { drain_packets(&capture_client, &mix, &mut converter, running, callback) };

    unsafe {
        let _ = audio_client.Stop();
    }
    result
}

unsafe fn open_loopback_client(
    device_id: &str,
) -> Result<(ComGuard, IAudioClient, IAudioCaptureClient, MixFormat), CaptureError> {
    let com = ComGuard::initialize()?;

    let device = DeviceEnumerator::new()?.device(device_id)?;

    let audio_client: IAudioClient = device
        .Activate(CLSCTX_ALL, None)
        .map_err(|e| CaptureError::StreamCreationFailed(format!("Activate failed: {}", e)))?;

    let mix_format_ptr = audio_client
        .GetMixFormat()
        .map_err(|e| CaptureError::StreamCreationFailed(format!("GetMixFormat failed: {}", e)))?;

    let mix = read_mix_format(mix_format_ptr);

    let initialized = audio_client.Initialize(
        AUDCLNT_SHAREMODE_SHARED,
        AUDCLNT_STREAMFLAGS_LOOPBACK | AUDCLNT_STREAMFLAGS_NOPERSIST,
        BUFFER_DURATION,
        0,
        mix_format_ptr,
        None,
    );
    CoTaskMemFree(Some(mix_format_ptr as *const _));
    initialized.map_err(|e| {
        CaptureError::StreamStartFailed(format!("IAudioClient::Initialize (loopback) failed: {}", e))
    })?;

    let capture_client: IAudioCaptureClient = audio_client
        .GetService()
        .map_err(|e| CaptureError::StreamStartFailed(format!("GetService failed: {}", e)))?;

    Ok((com, audio_client, capture_client, mix))
}

unsafe fn read_mix_format(ptr: *const WAVEFORMATEX) -> MixFormat {
    let format = std::ptr::read_unaligned(ptr);
    let sub_format = if format.wFormatTag == WAVE_FORMAT_EXTENSIBLE {
        let extensible = std::ptr::read_unaligned(ptr as *const WAVEFORMATEXTENSIBLE);
        Some(extensible.SubFormat.data1)
    } else {
        None
    };

    MixFormat {
        format_tag: format.wFormatTag,
        sub_format,
        sample_rate: f64::from(format.nSamplesPerSec),
        channels: format.nChannels,
        bits_per_sample: format.wBitsPerSample,
        block_align: format.nBlockAlign,
    }
}

unsafe fn drain_packets(
    capture_client: &IAudioCaptureClient,
    mix: &MixFormat,
    converter: &mut PacketConverter,
    running: &AtomicBool,
    callback: &Mutex<Option<BufferCallback>>,
) -> Result<(), CaptureError> {
    while running.load(Ordering::SeqCst) {
        thread::sleep(POLL_INTERVAL);

        let mut packet_length = capture_client
            .GetNextPacketSize()
            .map_err(|e| CaptureError::StreamInterrupted(format!("GetNextPacketSize failed: {}", e)))?;

        while packet_length > 0 {
            let mut buffer_ptr: *mut u8 = std::ptr::null_mut();
            let mut num_frames: u32 = 0;
            let mut flags: u32 = 0;

            capture_client
                .GetBuffer(&mut buffer_ptr, &mut num_frames, &mut flags, None, None)
                .map_err(|e| CaptureError::StreamInterrupted(format!("GetBuffer failed: {}", e)))?;

            if num_frames > 0 && !buffer_ptr.is_null() {
                let len = mix.frames_to_bytes(num_frames);
                let data = if flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0 {
                    vec![0u8; len]
                } else {
                    std::slice::from_raw_parts(buffer_ptr, len).to_vec()
                };

                let current = callback.lock().clone();
                if let Some(deliver) = current {
                    if let Some(buffer) = converter.convert(&data) {
                        deliver(buffer, OutputKind::Audio);
                    }
                }
            }

            capture_client
                .ReleaseBuffer(num_frames)
                .map_err(|e| CaptureError::StreamInterrupted(format!("ReleaseBuffer failed: {}", e)))?;

            packet_length = capture_client
                .GetNextPacketSize()
                .map_err(|e| CaptureError::StreamInterrupted(format!("GetNextPacketSize failed: {}", e)))?;
        }
    }
    Ok(())
}

/// Per-thread COM initialization, undone on drop.
struct ComGuard;

impl ComGuard {
    fn initialize() -> Result<Self, CaptureError> {
        unsafe {
            CoInitializeEx(None, COINIT_MULTITHREADED)
                .ok()
                .map_err(|e| CaptureError::ConfigurationFailed(format!("CoInitializeEx failed: {}", e)))?;
        }
        Ok(Self)
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        unsafe {
            CoUninitialize();
        }
    }
}
