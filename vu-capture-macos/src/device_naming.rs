//! CoreAudio device naming and the device report.
//!
//! CoreAudio has no built-in loopback of the output mix. System output is
//! captured through a virtual loopback driver, recognised by name.

use std::fmt::Write;

use vu_capture_core::{DeviceDescriptor, DeviceKind};

const LOOPBACK_DRIVERS: [&str; 3] = ["blackhole", "loopback", "soundflower"];

/// Classifies a device name: known loopback drivers carry system output.
pub fn classify(device_name: &str) -> DeviceKind {
    let lower = device_name.to_lowercase();
    if LOOPBACK_DRIVERS.iter().any(|driver| lower.contains(driver)) {
        DeviceKind::SystemOutput
    } else {
        DeviceKind::Microphone
    }
}

/// The loopback device opened for system output when no device is named.
pub fn default_loopback(inputs: &[DeviceDescriptor]) -> Option<String> {
    inputs
        .iter()
        .find(|d| d.kind == DeviceKind::SystemOutput)
        .map(|d| d.uid.clone())
}

/// An output device as listed in the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEntry {
    pub name: String,
    pub channels: u16,
    pub is_default: bool,
}

pub fn format_report(inputs: &[DeviceDescriptor], outputs: &[OutputEntry]) -> String {
    let marker = |is_default: bool| if is_default { "   [DEFAULT]" } else { "" };
    let mut out = String::from("CoreAudio devices:\n\n");

    out.push_str("=== Input Devices ===\n");
    for input in inputs {
        let _ = writeln!(out, "Input: {}{}", input.name, marker(input.is_default));
        let _ = writeln!(out, "  UID: {}", input.uid);
        let _ = writeln!(out, "  Channels: {}", input.channel_count);
        let _ = writeln!(out, "  Kind: {}\n", input.kind.label());
    }

    out.push_str("=== Output Devices ===\n");
    for output in outputs {
        let _ = writeln!(out, "Output: {}{}", output.name, marker(output.is_default));
        let _ = writeln!(out, "  Channels: {}\n", output.channels);
    }

    out.push_str("\nUsage:\n");
    out.push_str("  --device-type microphone      Use the default input device\n");
    out.push_str("  --device <uid>                Use a specific input device\n");
    out.push_str("  System output needs a loopback driver such as BlackHole.\n");
    out
}
