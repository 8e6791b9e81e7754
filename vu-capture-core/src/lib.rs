//! # vu-capture-core
//!
//! Platform-agnostic VU meter core library.
//!
//! Provides the needle ballistics, the per-block DSP chain, lock-free
//! published readings and the capture session facade. Platform-specific
//! backends (PulseAudio on Linux, CoreAudio on macOS) implement the
//! `CaptureBackend` trait and plug into the generic `MeterSession`.
//!
//! ## Architecture
//!
//! ```text
//! vu-capture-core (this crate)
//! ├── traits/       ← CaptureBackend, CaptureDelegate
//! ├── models/       ← CaptureError, CaptureState, CaptureOptions, DeviceDescriptor, readings
//! ├── processing/   ← BallisticsFilter, DSP stage, ReferenceControl, MeterProcessor
//! └── session/      ← MeterSession (generic facade)
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::config::{CaptureOptions, MeterScale};
pub use models::device::{mark_default_device, DeviceDescriptor, DeviceKind, ResolvedDevice};
pub use models::error::CaptureError;
pub use models::readings::{PublishedReadings, VuReading};
pub use models::state::CaptureState;
pub use processing::ballistics::{BallisticsConfig, BallisticsFilter};
pub use processing::vu_dsp::{DspState, ReferenceOptions};
pub use session::meter_session::{MeterSession, DEFAULT_MONITOR_LABEL, DEFAULT_SOURCE_LABEL};
pub use traits::capture_backend::{AudioBlockHandler, CaptureBackend, StreamRequest};
pub use traits::capture_delegate::{CaptureDelegate, LoggingDelegate};
