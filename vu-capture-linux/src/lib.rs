//! # vu-capture-linux
//!
//! PulseAudio backend for the VU meter core.
//!
//! Provides:
//! - `PulseCapture`: capture from a sink monitor (system output) or a source
//!   (microphone), driven by a dedicated mainloop thread
//! - `device_enumerator`: source listing and the device report over a
//!   temporary connection
//!
//! Works on native PulseAudio and on PipeWire through pipewire-pulse.
//!
//! ## Usage
//! ```ignore
//! use vu_capture_core::{CaptureOptions, MeterSession};
//! use vu_capture_linux::PulseCapture;
//!
//! let mut session = MeterSession::new(PulseCapture::new(), CaptureOptions::default())?;
//! session.start()?;
//! println!("{:.1} VU", session.left_vu_db());
//! ```

pub mod inventory;
pub mod source_names;

#[cfg(target_os = "linux")]
pub mod device_enumerator;
#[cfg(target_os = "linux")]
pub mod pulse_capture;
#[cfg(target_os = "linux")]
pub mod pulse_connection;

#[cfg(target_os = "linux")]
pub use pulse_capture::PulseCapture;
