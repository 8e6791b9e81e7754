//! CoreAudio capture backend.
//!
//! CoreAudio delivers buffers on its own I/O thread. `cpal::Stream` is not
//! `Send`, so a holder thread builds the stream, reports readiness back to
//! `start` and keeps the stream alive until `stop`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, FromSample, Sample, SampleFormat, SizedSample, StreamConfig, SupportedBufferSize};
use parking_lot::Mutex;

use vu_capture_core::{
    mark_default_device, AudioBlockHandler, CaptureBackend, CaptureDelegate, CaptureError,
    DeviceDescriptor, DeviceKind, ResolvedDevice, StreamRequest,
};

use crate::device_naming::{self, OutputEntry};

const HOLD_INTERVAL: Duration = Duration::from_millis(10);
const READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Capture from a CoreAudio input device. System output requires a loopback
/// driver exposed as an input device.
pub struct CoreAudioCapture {
    running: Arc<AtomicBool>,
    capture_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl CoreAudioCapture {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            capture_handle: Mutex::new(None),
        }
    }
}

impl Default for CoreAudioCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for CoreAudioCapture {
    fn start(
        &mut self,
        request: StreamRequest,
        handler: AudioBlockHandler,
        events: Arc<dyn CaptureDelegate>,
    ) -> Result<(), CaptureError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CaptureError::AlreadyRunning);
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let handle = thread::Builder::new()
            .name("coreaudio-capture".into())
            .spawn(move || stream_holder(request, handler, events, running, ready_tx))
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                CaptureError::SetupFailure(format!("failed to spawn capture thread: {}", e))
            })?;

        match ready_rx.recv_timeout(READY_TIMEOUT) {
            Ok(Ok(())) => {
                *self.capture_handle.lock() = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                log::error!("[CoreAudio] Capture thread did not report readiness");
                self.running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(CaptureError::ConnectionTimeout(READY_TIMEOUT))
            }
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.capture_handle.lock().take() {
            if handle.join().is_err() {
                log::error!("[CoreAudio] Capture thread panicked");
            }
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn enumerate_input_devices(&self) -> Result<Vec<DeviceDescriptor>, CaptureError> {
        let host = cpal::default_host();
        let devices = input_devices(&host)?;
        log::info!("[CoreAudio] Enumerated {} input devices", devices.len());
        Ok(devices)
    }

    fn device_report(&self) -> Result<String, CaptureError> {
        let host = cpal::default_host();
        let inputs = input_devices(&host)?;

        let default_output = host.default_output_device().and_then(|d| d.name().ok());
        let outputs = host
            .output_devices()
            .map_err(|e| CaptureError::Enumeration(format!("failed to list output devices: {}", e)))?
            .filter_map(|device| {
                let name = device.name().ok()?;
                let channels = device.default_output_config().ok()?.channels();
                Some(OutputEntry {
                    is_default: default_output.as_deref() == Some(name.as_str()),
                    name,
                    channels,
                })
            })
            .collect::<Vec<_>>();

        Ok(device_naming::format_report(&inputs, &outputs))
    }

    fn classify_identifier(&self, device_uid: &str) -> DeviceKind {
        device_naming::classify(device_uid)
    }
}

impl Drop for CoreAudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn input_devices(host: &cpal::Host) -> Result<Vec<DeviceDescriptor>, CaptureError> {
    let default_input = host.default_input_device().and_then(|d| d.name().ok());
    let mut devices = host
        .input_devices()
        .map_err(|e| CaptureError::Enumeration(format!("failed to list input devices: {}", e)))?
        .filter_map(|device| {
            let name = device.name().ok()?;
            let channels = device.default_input_config().ok()?.channels();
            (channels > 0).then(|| DeviceDescriptor {
                kind: device_naming::classify(&name),
                uid: name.clone(),
                name,
                channel_count: channels,
                is_input_capable: true,
                is_default: false,
            })
        })
        .collect::<Vec<_>>();

    let loopback = device_naming::default_loopback(&devices);
    mark_default_device(&mut devices, loopback.as_deref(), default_input.as_deref());
    Ok(devices)
}

/// Picks the device to open.
///
/// No identifier: the first loopback driver for system output, otherwise the
/// default input.
fn resolve_device(host: &cpal::Host, request: &StreamRequest) -> Result<(cpal::Device, ResolvedDevice), CaptureError> {
    let named = |device: &cpal::Device| device.name().ok();
    let inputs = || {
        host.input_devices()
            .map_err(|e| CaptureError::DeviceResolutionFailure(format!("failed to list input devices: {}", e)))
    };

    let device = match request.device_uid.as_deref() {
        Some(uid) => inputs()?
            .find(|d| named(d).as_deref() == Some(uid))
            .ok_or_else(|| CaptureError::DeviceResolutionFailure(uid.to_string()))?,
        None => {
            // Same choice as `device_naming::default_loopback` during enumeration.
            let loopback = match request.fallback_kind {
                DeviceKind::SystemOutput => inputs()?.find(|d| {
                    named(d).is_some_and(|n| device_naming::classify(&n) == DeviceKind::SystemOutput)
                }),
                DeviceKind::Microphone => None,
            };
            if loopback.is_none() && request.fallback_kind == DeviceKind::SystemOutput {
                log::warn!("[CoreAudio] No loopback driver found, using the default input");
            }
            loopback
                .or_else(|| host.default_input_device())
                .ok_or_else(|| CaptureError::DeviceResolutionFailure("no default input device".into()))?
        }
    };

    let uid = named(&device).unwrap_or_default();
    let kind = request
        .device_kind
        .filter(|_| request.device_uid.is_some())
        .unwrap_or_else(|| device_naming::classify(&uid));
    Ok((device, ResolvedDevice { uid, kind }))
}

fn stream_config(device: &cpal::Device, request: &StreamRequest) -> Result<(StreamConfig, SampleFormat), CaptureError> {
    let supported = device
        .default_input_config()
        .map_err(|e| CaptureError::SetupFailure(format!("no usable input config: {}", e)))?;

    let buffer_size = match supported.buffer_size() {
        SupportedBufferSize::Range { min, max } if (*min..=*max).contains(&request.frames_per_buffer) => {
            BufferSize::Fixed(request.frames_per_buffer)
        }
        _ => BufferSize::Default,
    };

    let config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size,
    };
    Ok((config, supported.sample_format()))
}

/// Body of the holder thread.
///
/// Sequence:
/// 1. Resolve the device (failure is reported through the delegate)
/// 2. Build and play the input stream, report readiness to `start`
/// 3. Hold the stream until `running` clears
fn stream_holder(
    request: StreamRequest,
    handler: AudioBlockHandler,
    events: Arc<dyn CaptureDelegate>,
    running: Arc<AtomicBool>,
    ready_tx: SyncSender<Result<(), CaptureError>>,
) {
    let host = cpal::default_host();

    let (device, resolved) = match resolve_device(&host, &request) {
        Ok(found) => found,
        Err(e) => {
            let _ = ready_tx.send(Ok(()));
            log::error!("[CoreAudio] {}", e);
            events.on_error(&e);
            hold(&running);
            return;
        }
    };

    let stream = match open_stream(&device, &request, handler, Arc::clone(&events)) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let _ = ready_tx.send(Ok(()));
    log::info!("[CoreAudio] Capturing from {} ({})", resolved.uid, resolved.kind.label());
    events.on_device_resolved(&resolved.uid, resolved.kind);

    hold(&running);

    if let Err(e) = stream.pause() {
        log::debug!("[CoreAudio] pause on shutdown failed: {}", e);
    }
    drop(stream);
    log::info!("[CoreAudio] Capture thread exiting");
}

fn open_stream(
    device: &cpal::Device,
    request: &StreamRequest,
    handler: AudioBlockHandler,
    events: Arc<dyn CaptureDelegate>,
) -> Result<cpal::Stream, CaptureError> {
    let (config, format) = stream_config(device, request)?;
    log::info!(
        "[CoreAudio] Stream config: {} ch, {} Hz, {:?}, {:?}",
        config.channels,
        config.sample_rate.0,
        format,
        config.buffer_size
    );

    let stream = match format {
        SampleFormat::F32 => build_stream::<f32>(device, &config, handler, events),
        SampleFormat::I16 => build_stream::<i16>(device, &config, handler, events),
        SampleFormat::I32 => build_stream::<i32>(device, &config, handler, events),
        SampleFormat::U16 => build_stream::<u16>(device, &config, handler, events),
        other => Err(CaptureError::SetupFailure(format!("unsupported sample format: {:?}", other))),
    }?;

    stream
        .play()
        .map_err(|e| CaptureError::SetupFailure(format!("failed to start input stream: {}", e)))?;
    Ok(stream)
}

/// Builds an input stream that converts to interleaved f32 for `handler`.
fn build_stream<T: Sample + SizedSample + Send + 'static>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut handler: AudioBlockHandler,
    events: Arc<dyn CaptureDelegate>,
) -> Result<cpal::Stream, CaptureError>
where
    f32: FromSample<T>,
{
    let sample_rate = f64::from(config.sample_rate.0);
    let channels = config.channels;
    let mut scratch: Vec<f32> = Vec::with_capacity(4096);
    let mut faulted = false;

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                scratch.clear();
                scratch.extend(data.iter().map(|s| f32::from_sample(*s)));
                handler(scratch.as_slice(), sample_rate, channels);
            },
            move |err| {
                log::error!("[CoreAudio] Stream error: {}", err);
                if !faulted {
                    faulted = true;
                    events.on_error(&CaptureError::RuntimeFault(err.to_string()));
                }
            },
            None,
        )
        .map_err(|e| CaptureError::SetupFailure(format!("failed to build input stream: {}", e)))
}

fn hold(running: &AtomicBool) {
    while running.load(Ordering::SeqCst) {
        thread::sleep(HOLD_INTERVAL);
    }
}
