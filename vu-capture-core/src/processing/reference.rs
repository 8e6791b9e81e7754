use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::models::config::CaptureOptions;
use crate::models::device::DeviceKind;
use crate::models::readings::AtomicF32;
use crate::processing::vu_dsp::ReferenceOptions;

/// Calibration values written from the control thread and read by the
/// capture thread once per block.
///
/// Every field is an independent atomic scalar; the capture thread copies
/// them into a [`ReferenceOptions`] before touching any samples, so a write
/// never lands mid-block.
#[derive(Debug)]
pub struct ReferenceControl {
    microphone_dbfs: AtomicF32,
    monitor_dbfs: AtomicF32,
    override_dbfs: AtomicF32,
    override_enabled: AtomicBool,
    device_kind: AtomicU8,
}

impl ReferenceControl {
    pub fn new(options: &CaptureOptions) -> Self {
        let control = Self {
            microphone_dbfs: AtomicF32::new(options.microphone_reference_dbfs),
            monitor_dbfs: AtomicF32::new(options.monitor_reference_dbfs),
            override_dbfs: AtomicF32::new(0.0),
            override_enabled: AtomicBool::new(false),
            device_kind: AtomicU8::new(options.device_type.to_u8()),
        };
        control.set_override(options.reference_dbfs_override);
        control
    }

    pub fn snapshot(&self) -> ReferenceOptions {
        let override_dbfs = if self.override_enabled.load(Ordering::Acquire) {
            Some(self.override_dbfs.load(Ordering::Relaxed))
        } else {
            None
        };
        ReferenceOptions {
            override_dbfs,
            microphone_dbfs: self.microphone_dbfs.load(Ordering::Relaxed),
            monitor_dbfs: self.monitor_dbfs.load(Ordering::Relaxed),
            device_kind: self.device_kind(),
        }
    }

    pub fn device_kind(&self) -> DeviceKind {
        DeviceKind::from_u8(self.device_kind.load(Ordering::Relaxed))
    }

    pub fn set_device_kind(&self, kind: DeviceKind) {
        self.device_kind.store(kind.to_u8(), Ordering::Relaxed);
    }

    pub fn set_reference(&self, kind: DeviceKind, dbfs: f32) {
        match kind {
            DeviceKind::Microphone => self.microphone_dbfs.store(dbfs, Ordering::Relaxed),
            DeviceKind::SystemOutput => self.monitor_dbfs.store(dbfs, Ordering::Relaxed),
        }
    }

    pub fn set_override(&self, dbfs: Option<f32>) {
        match dbfs {
            Some(value) => {
                self.override_dbfs.store(value, Ordering::Relaxed);
                self.override_enabled.store(true, Ordering::Release);
            }
            None => self.override_enabled.store(false, Ordering::Release),
        }
    }

    /// Effective 0 VU reference for the current classification.
    pub fn effective_dbfs(&self) -> f32 {
        self.snapshot().effective_dbfs()
    }
}
