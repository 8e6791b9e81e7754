use crate::models::device::DeviceKind;
use crate::models::error::CaptureError;
use crate::models::state::CaptureState;

/// Event delegate for capture session notifications.
///
/// `on_error` and `on_device_resolved` are called from the capture thread;
/// everything else fires on the thread that drove the facade call.
/// Implementations should marshal to the UI thread if needed.
pub trait CaptureDelegate: Send + Sync {
    /// Called when an asynchronous fault occurs during capture.
    fn on_error(&self, error: &CaptureError);

    /// Called once the backend knows which native device it opened.
    fn on_device_resolved(&self, _device_uid: &str, _kind: DeviceKind) {}

    /// Called after a successful `switch_device`.
    fn on_device_changed(&self, _device_uid: &str) {}

    /// Called whenever a reference level changes, so it can be persisted.
    fn on_reference_changed(&self, _kind: DeviceKind, _dbfs: f32) {}

    fn on_state_changed(&self, _state: &CaptureState) {}
}

/// Delegate that only logs. Used when the caller did not install one.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDelegate;

impl CaptureDelegate for LoggingDelegate {
    fn on_error(&self, error: &CaptureError) {
        log::error!("capture error: {}", error);
    }

    fn on_device_resolved(&self, device_uid: &str, kind: DeviceKind) {
        log::info!("capturing from {} ({})", device_uid, kind.label());
    }
}
