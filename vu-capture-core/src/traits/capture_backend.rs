use std::sync::Arc;

use crate::models::device::{DeviceDescriptor, DeviceKind};
use crate::models::error::CaptureError;
use crate::traits::capture_delegate::CaptureDelegate;

/// Handler invoked for every captured block.
///
/// Parameters:
/// - `samples`: Interleaved f32 samples.
/// - `sample_rate`: The actual sample rate of the delivered audio.
/// - `channels`: Number of interleaved channels.
///
/// The handler runs on the backend's capture thread and is the only code
/// that ever advances DSP or ballistics state.
pub type AudioBlockHandler = Box<dyn FnMut(&[f32], f64, u16) + Send + 'static>;

/// What the facade asks a backend to open.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    /// Native identifier, or `None` for the default output's loopback path
    /// (or the default input when `fallback_kind` is `Microphone`).
    pub device_uid: Option<String>,
    /// Explicit classification from enumeration. When `None` the backend
    /// infers it from the identifier.
    pub device_kind: Option<DeviceKind>,
    /// Classification used when no device is given.
    pub fallback_kind: DeviceKind,
    pub sample_rate: u32,
    pub frames_per_buffer: u32,
}

/// Interface for platform-specific capture backends.
///
/// Implemented by:
/// - `PulseCapture` (Linux, PulseAudio)
/// - `CoreAudioCapture` (macOS)
pub trait CaptureBackend: Send {
    /// Opens the native session and starts delivering blocks to `handler`.
    ///
    /// Blocks only while waiting for the native session to become ready.
    /// Device resolution and stream faults are reported through `events`.
    fn start(
        &mut self,
        request: StreamRequest,
        handler: AudioBlockHandler,
        events: Arc<dyn CaptureDelegate>,
    ) -> Result<(), CaptureError>;

    /// Stops capturing and joins the capture thread. Safe to call repeatedly.
    fn stop(&mut self);

    fn is_running(&self) -> bool;

    /// Lists capturable inputs using a private, temporary session.
    fn enumerate_input_devices(&self) -> Result<Vec<DeviceDescriptor>, CaptureError>;

    /// Human-readable listing of outputs and inputs with usage hints.
    fn device_report(&self) -> Result<String, CaptureError>;

    /// Classification inferred from an identifier's shape.
    fn classify_identifier(&self, _device_uid: &str) -> DeviceKind {
        DeviceKind::Microphone
    }
}
