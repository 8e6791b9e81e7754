use serde::{Deserialize, Serialize};

/// Device-type classification driving the default reference level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Loopback / monitor of an output device (-14 dBFS = 0 VU by default).
    SystemOutput,
    /// Direct input such as a microphone or line-in (0 dBFS = 0 VU by default).
    Microphone,
}

impl DeviceKind {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            Self::SystemOutput => 0,
            Self::Microphone => 1,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Microphone,
            _ => Self::SystemOutput,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::SystemOutput => "system output",
            Self::Microphone => "microphone",
        }
    }
}

/// A capturable input path reported by backend enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Human-readable name (description on PulseAudio, device name on CoreAudio).
    pub name: String,
    /// Stable identifier accepted by `switch_device`.
    pub uid: String,
    pub channel_count: u16,
    pub is_input_capable: bool,
    pub is_default: bool,
    /// Explicit classification carried from enumeration.
    pub kind: DeviceKind,
}

/// Device that a backend resolved for an open stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDevice {
    pub uid: String,
    pub kind: DeviceKind,
}

/// Marks the default entry in an enumerated list.
///
/// The monitor of the default output wins over the default input source when
/// both are present; otherwise the default input source is marked.
pub fn mark_default_device(
    devices: &mut [DeviceDescriptor],
    default_monitor_uid: Option<&str>,
    default_input_uid: Option<&str>,
) {
    let monitor_present = default_monitor_uid
        .map(|uid| devices.iter().any(|d| d.uid == uid))
        .unwrap_or(false);

    for device in devices.iter_mut() {
        device.is_default = if monitor_present {
            Some(device.uid.as_str()) == default_monitor_uid
        } else {
            Some(device.uid.as_str()) == default_input_uid
        };
    }
}
