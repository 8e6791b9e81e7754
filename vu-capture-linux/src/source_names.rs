//! PulseAudio naming conventions and sample decoding.
//!
//! A sink `foo` exposes its loopback as the source `foo.monitor`; anything
//! else is treated as a direct input.

use vu_capture_core::DeviceKind;

pub const MONITOR_SUFFIX: &str = ".monitor";

/// Classifies a source name by its shape.
pub fn classify(source_name: &str) -> DeviceKind {
    if source_name.ends_with(MONITOR_SUFFIX) {
        DeviceKind::SystemOutput
    } else {
        DeviceKind::Microphone
    }
}

/// Sink name behind a `<sink>.monitor` source name.
pub fn sink_of_monitor(source_name: &str) -> Option<&str> {
    source_name
        .strip_suffix(MONITOR_SUFFIX)
        .filter(|sink| !sink.is_empty())
}

/// Decodes little-endian f32 bytes into `out`, reusing its allocation.
///
/// A trailing partial sample is dropped.
pub fn decode_f32le(bytes: &[u8], out: &mut Vec<f32>) {
    out.clear();
    out.extend(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])),
    );
}
