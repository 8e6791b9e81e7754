use super::device::DeviceKind;

/// Default 0 VU reference for microphone / line inputs.
pub const DEFAULT_MICROPHONE_REFERENCE_DBFS: f32 = 0.0;

/// Default 0 VU reference for loopback of system output.
pub const DEFAULT_MONITOR_REFERENCE_DBFS: f32 = -14.0;

/// Meter scale limits supplied by the renderer's calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterScale {
    /// Floor value; also the resting position of the needle.
    pub min_vu: f32,
    pub max_vu: f32,
}

impl MeterScale {
    pub fn new(min_vu: f32, max_vu: f32) -> Self {
        Self { min_vu, max_vu }
    }

    /// Printed dial range of a classic VU movement (-20..+3 plus pin margin).
    pub fn classic() -> Self {
        Self {
            min_vu: -22.0,
            max_vu: 3.0,
        }
    }

    pub fn clamp(&self, vu: f32) -> f32 {
        vu.clamp(self.min_vu, self.max_vu)
    }
}

impl Default for MeterScale {
    fn default() -> Self {
        Self {
            min_vu: -96.0,
            max_vu: 6.0,
        }
    }
}

/// Options for a capture session.
///
/// Owned by [`MeterSession`](crate::MeterSession); reference values are
/// mutated only through its setters.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOptions {
    /// Specific device identifier, or None for the platform default.
    pub device_uid: Option<String>,

    /// Classification used to pick the reference level (default: system output).
    pub device_type: DeviceKind,

    /// Requested sample rate in Hz (default: 48000).
    pub sample_rate: u32,

    /// Requested frames per delivered block (default: 480, 10 ms at 48 kHz).
    pub frames_per_buffer: u32,

    /// Explicit reference that wins over the per-device-type values.
    pub reference_dbfs_override: Option<f32>,

    pub microphone_reference_dbfs: f32,

    pub monitor_reference_dbfs: f32,

    pub scale: MeterScale,
}

impl CaptureOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        if self.frames_per_buffer == 0 {
            return Err("frames per buffer must be positive".into());
        }
        if !self.microphone_reference_dbfs.is_finite() || !self.monitor_reference_dbfs.is_finite() {
            return Err("reference levels must be finite".into());
        }
        if let Some(value) = self.reference_dbfs_override {
            if !value.is_finite() {
                return Err(format!("reference override must be finite, got {}", value));
            }
        }
        if !self.scale.min_vu.is_finite() || !self.scale.max_vu.is_finite() {
            return Err(format!(
                "meter scale limits must be finite, got {}..{}",
                self.scale.min_vu, self.scale.max_vu
            ));
        }
        if self.scale.min_vu >= self.scale.max_vu {
            return Err(format!(
                "meter scale floor {} must be below ceiling {}",
                self.scale.min_vu, self.scale.max_vu
            ));
        }
        Ok(())
    }

    /// Per-device-type reference for `kind`, ignoring the override.
    pub fn reference_for(&self, kind: DeviceKind) -> f32 {
        match kind {
            DeviceKind::Microphone => self.microphone_reference_dbfs,
            DeviceKind::SystemOutput => self.monitor_reference_dbfs,
        }
    }
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            device_uid: None,
            device_type: DeviceKind::SystemOutput,
            sample_rate: 48000,
            frames_per_buffer: 480,
            reference_dbfs_override: None,
            microphone_reference_dbfs: DEFAULT_MICROPHONE_REFERENCE_DBFS,
            monitor_reference_dbfs: DEFAULT_MONITOR_REFERENCE_DBFS,
            scale: MeterScale::default(),
        }
    }
}
