//! # vu-capture-macos
//!
//! CoreAudio backend for the VU meter core.
//!
//! Provides:
//! - `CoreAudioCapture`: capture from an input device; CoreAudio invokes
//!   the block handler on its own I/O thread
//! - `device_naming`: loopback-driver detection and the device report
//!
//! ## Platform Requirements
//! - Microphone permission for the hosting application
//! - A loopback driver (BlackHole, Loopback) to meter system output
//!
//! ## Usage
//! ```ignore
//! use vu_capture_core::{CaptureOptions, MeterScale, MeterSession};
//! use vu_capture_macos::CoreAudioCapture;
//!
//! let options = CaptureOptions { scale: MeterScale::classic(), ..Default::default() };
//! let mut session = MeterSession::new(CoreAudioCapture::new(), options)?;
//! session.start()?;
//! ```

pub mod device_naming;

#[cfg(target_os = "macos")]
pub mod coreaudio_capture;

#[cfg(target_os = "macos")]
pub use coreaudio_capture::CoreAudioCapture;
