//! Compile-time backend selection.

use vu_capture_core::MeterScale;

#[cfg(target_os = "linux")]
pub type PlatformBackend = vu_capture_linux::PulseCapture;

#[cfg(target_os = "macos")]
pub type PlatformBackend = vu_capture_macos::CoreAudioCapture;

#[cfg(target_os = "linux")]
pub const PLATFORM_NAME: &str = "PulseAudio";

#[cfg(target_os = "macos")]
pub const PLATFORM_NAME: &str = "CoreAudio";

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub const PLATFORM_NAME: &str = "unsupported";

/// Scale of the meter face drawn on this platform.
pub fn default_scale() -> MeterScale {
    if cfg!(target_os = "macos") {
        MeterScale::classic()
    } else {
        MeterScale::default()
    }
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
pub fn new_backend() -> PlatformBackend {
    PlatformBackend::new()
}
