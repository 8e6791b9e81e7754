//! Server-side device inventory and the listings built from it.

use std::fmt::Write;

use vu_capture_core::{mark_default_device, DeviceDescriptor, DeviceKind};

use crate::source_names::MONITOR_SUFFIX;

/// Defaults reported by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerDefaults {
    pub sink: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkEntry {
    pub name: String,
    pub description: String,
    pub monitor_source: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub name: String,
    pub description: String,
    pub channels: u8,
    pub rate: u32,
    /// Set when the source is the loopback of a sink.
    pub is_monitor: bool,
}

/// Monitor source of the default sink.
pub fn default_monitor(sinks: &[SinkEntry], defaults: &ServerDefaults) -> Option<String> {
    let sink = defaults.sink.as_deref()?;
    let monitor = sinks
        .iter()
        .find(|s| s.name == sink)
        .map(|s| s.monitor_source.clone())
        .filter(|m| !m.is_empty());
    Some(monitor.unwrap_or_else(|| format!("{}{}", sink, MONITOR_SUFFIX)))
}

/// Capturable sources as descriptors, with the default marked.
pub fn input_devices(
    sources: &[SourceEntry],
    sinks: &[SinkEntry],
    defaults: &ServerDefaults,
) -> Vec<DeviceDescriptor> {
    let mut devices: Vec<DeviceDescriptor> = sources
        .iter()
        .filter(|s| s.channels > 0)
        .map(|s| DeviceDescriptor {
            name: s.description.clone(),
            uid: s.name.clone(),
            channel_count: u16::from(s.channels),
            is_input_capable: true,
            is_default: false,
            kind: if s.is_monitor {
                DeviceKind::SystemOutput
            } else {
                DeviceKind::Microphone
            },
        })
        .collect();

    let monitor = default_monitor(sinks, defaults);
    mark_default_device(&mut devices, monitor.as_deref(), defaults.source.as_deref());
    devices
}

/// Plain-text listing: sinks with their monitors, then sources, then usage.
pub fn format_report(sinks: &[SinkEntry], sources: &[SourceEntry], defaults: &ServerDefaults) -> String {
    let mut out = String::from("PulseAudio devices:\n\n");

    let marker = |name: &str, default: &Option<String>| {
        if default.as_deref() == Some(name) {
            "   [DEFAULT]"
        } else {
            ""
        }
    };

    out.push_str("=== Output Sinks ===\n");
    for sink in sinks {
        let _ = writeln!(out, "Sink: {}{}", sink.name, marker(&sink.name, &defaults.sink));
        let _ = writeln!(out, "  Description: {}", sink.description);
        let _ = writeln!(out, "  Monitor source: {}\n", sink.monitor_source);
    }

    out.push_str("=== Input Sources ===\n");
    for source in sources {
        let _ = writeln!(out, "Source: {}{}", source.name, marker(&source.name, &defaults.source));
        let _ = writeln!(out, "  Description: {}\n", source.description);
    }

    out.push_str("\nUsage:\n");
    out.push_str("  --device-type system-output   Use system output (sink monitor)\n");
    out.push_str("  --device-type microphone      Use microphone input (source)\n");
    out.push_str("  --device <name>               Use a specific sink monitor or source\n");
    out
}
