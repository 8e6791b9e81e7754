//! Device listing over a temporary PulseAudio connection.
//!
//! Every call opens its own mainloop and context on the calling thread and
//! tears them down before returning, so an active capture stream is never
//! touched.

use std::time::Duration;

use vu_capture_core::{CaptureError, DeviceDescriptor};

use crate::inventory::{self, ServerDefaults, SinkEntry, SourceEntry};
use crate::pulse_connection::PulseConnection;

const CLIENT_NAME: &str = "VU Meter (enumeration)";

struct Snapshot {
    defaults: ServerDefaults,
    sinks: Vec<SinkEntry>,
    sources: Vec<SourceEntry>,
}

fn snapshot(timeout: Duration) -> Result<Snapshot, CaptureError> {
    let mut conn = PulseConnection::connect(CLIENT_NAME, timeout).map_err(as_enumeration)?;
    let defaults = conn.server_defaults().map_err(as_enumeration)?;
    let sinks = conn.sinks().map_err(as_enumeration)?;
    let sources = conn.sources().map_err(as_enumeration)?;
    Ok(Snapshot {
        defaults,
        sinks,
        sources,
    })
}

fn as_enumeration(error: CaptureError) -> CaptureError {
    match error {
        CaptureError::Enumeration(_) => error,
        other => CaptureError::Enumeration(other.to_string()),
    }
}

/// Sources advertising at least one channel, monitors tagged as system output.
pub fn enumerate_input_devices(timeout: Duration) -> Result<Vec<DeviceDescriptor>, CaptureError> {
    log::debug!("[PulseEnum] enumerate_input_devices() starting");
    let snap = snapshot(timeout)?;
    let devices = inventory::input_devices(&snap.sources, &snap.sinks, &snap.defaults);

    log::info!("[PulseEnum] Enumerated {} capturable sources", devices.len());
    for d in &devices {
        log::debug!(
            "[PulseEnum]   {} ({}ch, {}) default={}",
            d.uid,
            d.channel_count,
            d.kind.label(),
            d.is_default
        );
    }
    Ok(devices)
}

/// Human-readable sink/source listing for the device-listing mode.
pub fn device_report(timeout: Duration) -> Result<String, CaptureError> {
    let snap = snapshot(timeout)?;
    Ok(inventory::format_report(&snap.sinks, &snap.sources, &snap.defaults))
}
