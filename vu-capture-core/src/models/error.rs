use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while acquiring audio for the meter.
///
/// `SetupFailure`, `ConnectionTimeout` and `InvalidOptions` are returned
/// synchronously from `start`/`switch_device`. `RuntimeFault` and
/// `DeviceResolutionFailure` originate on the capture thread and are delivered
/// through [`CaptureDelegate::on_error`](crate::CaptureDelegate::on_error).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CaptureError {
    #[error("setup failed: {0}")]
    SetupFailure(String),

    #[error("connection timed out after {0:?}")]
    ConnectionTimeout(Duration),

    #[error("runtime fault: {0}")]
    RuntimeFault(String),

    #[error("device not found: {0}")]
    DeviceResolutionFailure(String),

    #[error("device enumeration failed: {0}")]
    Enumeration(String),

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("capture already running")]
    AlreadyRunning,
}

impl CaptureError {
    /// Whether the error was raised asynchronously by the native backend.
    pub fn is_async(&self) -> bool {
        matches!(self, Self::RuntimeFault(_) | Self::DeviceResolutionFailure(_))
    }
}
