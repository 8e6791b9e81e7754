//! PulseAudio capture backend.
//!
//! A dedicated thread owns the mainloop, context and record stream. The
//! thread connects, reports readiness back to `start`, resolves the device
//! through introspection, opens a float32 record stream and then pumps the
//! mainloop, handing every fragment to the block handler.
//!
//! Faults after `start` has returned are reported through the delegate; the
//! thread then idles until `stop` so the session stays "running" but silent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use libpulse_binding as pulse;
use parking_lot::Mutex;
use pulse::context::State as CtxState;
use pulse::def::BufferAttr;
use pulse::proplist::Proplist;
use pulse::sample::{Format, Spec};
use pulse::stream::{FlagSet as StreamFlags, PeekResult, State as StreamState, Stream};
use pulse::time::MicroSeconds;

use vu_capture_core::{
    AudioBlockHandler, CaptureBackend, CaptureDelegate, CaptureError, DeviceDescriptor, DeviceKind,
    ResolvedDevice, StreamRequest,
};

use crate::device_enumerator;
use crate::inventory::SourceEntry;
use crate::pulse_connection::{PulseConnection, CONNECT_TIMEOUT};
use crate::source_names;

const CLIENT_NAME: &str = "VU Meter";
const STREAM_NAME: &str = "VU Meter capture";

/// Turns off the echo-cancel/AGC filter chain some setups insert on capture.
const FILTER_APPLY: &str = "echo-cancel noise-suppression=0 aec=0 agc=0";

const POLL_INTERVAL: Duration = Duration::from_millis(5);
const STREAM_READY_TIMEOUT: Duration = Duration::from_secs(5);
/// Slack on top of the connect timeout before `start` gives up on the thread.
const READY_GRACE: Duration = Duration::from_millis(500);

/// Blocks between periodic status lines (about 5 s of 10 ms fragments).
const STATUS_EVERY_BLOCKS: u64 = 500;

/// Capture from a PulseAudio source: the monitor of an output sink for system
/// output, or a regular source for microphones.
pub struct PulseCapture {
    connect_timeout: Duration,
    running: Arc<AtomicBool>,
    capture_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl PulseCapture {
    pub fn new() -> Self {
        Self::with_connect_timeout(CONNECT_TIMEOUT)
    }

    pub fn with_connect_timeout(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            running: Arc::new(AtomicBool::new(false)),
            capture_handle: Mutex::new(None),
        }
    }
}

impl Default for PulseCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for PulseCapture {
    fn start(
        &mut self,
        request: StreamRequest,
        handler: AudioBlockHandler,
        events: Arc<dyn CaptureDelegate>,
    ) -> Result<(), CaptureError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CaptureError::AlreadyRunning);
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let timeout = self.connect_timeout;
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let handle = thread::Builder::new()
            .name("pulse-capture".into())
            .spawn(move || capture_thread(request, handler, events, running, ready_tx, timeout))
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                CaptureError::SetupFailure(format!("failed to spawn capture thread: {}", e))
            })?;

        match ready_rx.recv_timeout(timeout + READY_GRACE) {
            Ok(Ok(())) => {
                *self.capture_handle.lock() = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                log::error!("[PulseCapture] Capture thread did not report readiness");
                self.running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(CaptureError::ConnectionTimeout(timeout))
            }
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.capture_handle.lock().take() {
            if handle.join().is_err() {
                log::error!("[PulseCapture] Capture thread panicked");
            }
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn enumerate_input_devices(&self) -> Result<Vec<DeviceDescriptor>, CaptureError> {
        device_enumerator::enumerate_input_devices(self.connect_timeout)
    }

    fn device_report(&self) -> Result<String, CaptureError> {
        device_enumerator::device_report(self.connect_timeout)
    }

    fn classify_identifier(&self, device_uid: &str) -> DeviceKind {
        source_names::classify(device_uid)
    }
}

impl Drop for PulseCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Source the stream is opened on, with its native format.
struct ResolvedSource {
    device: ResolvedDevice,
    rate: u32,
    channels: u8,
}

impl ResolvedSource {
    fn new(entry: SourceEntry, kind: DeviceKind) -> Self {
        Self {
            device: ResolvedDevice {
                uid: entry.name,
                kind,
            },
            rate: entry.rate,
            channels: entry.channels,
        }
    }
}

/// Body of the capture thread.
///
/// Sequence:
/// 1. Connect mainloop + context, report readiness to `start`
/// 2. Resolve the source (default sink monitor, default source or by name)
/// 3. Open a float32 record stream with a fragment of one block
/// 4. Pump the mainloop until `running` clears
fn capture_thread(
    request: StreamRequest,
    mut handler: AudioBlockHandler,
    events: Arc<dyn CaptureDelegate>,
    running: Arc<AtomicBool>,
    ready_tx: SyncSender<Result<(), CaptureError>>,
    timeout: Duration,
) {
    let mut conn = match PulseConnection::connect(CLIENT_NAME, timeout) {
        Ok(conn) => {
            let _ = ready_tx.send(Ok(()));
            conn
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let source = match resolve_source(&mut conn, &request) {
        Ok(source) => source,
        Err(e) => {
            report(&events, e);
            idle_until_stopped(&running);
            return;
        }
    };
    log::info!(
        "[PulseCapture] Resolved {} ({}, {} Hz, {} ch)",
        source.device.uid,
        source.device.kind.label(),
        source.rate,
        source.channels
    );
    events.on_device_resolved(&source.device.uid, source.device.kind);

    let (mut stream, spec) = match open_stream(&mut conn, &source, &request) {
        Ok(opened) => opened,
        Err(e) => {
            report(&events, e);
            idle_until_stopped(&running);
            return;
        }
    };

    let blocks = pump(&mut conn, &mut stream, spec, &mut handler, &events, &running);

    if matches!(stream.get_state(), StreamState::Creating | StreamState::Ready) {
        let _ = stream.disconnect();
    }
    log::info!("[PulseCapture] Capture thread exiting after {} blocks", blocks);
}

fn resolve_source(conn: &mut PulseConnection, request: &StreamRequest) -> Result<ResolvedSource, CaptureError> {
    let not_found = |what: &str| CaptureError::DeviceResolutionFailure(what.to_string());

    let Some(uid) = request.device_uid.as_deref() else {
        let defaults = conn.server_defaults()?;
        return match request.fallback_kind {
            DeviceKind::SystemOutput => {
                let sink_name = defaults.sink.ok_or_else(|| not_found("no default sink"))?;
                monitor_of_sink(conn, &sink_name, DeviceKind::SystemOutput)
            }
            DeviceKind::Microphone => {
                let source_name = defaults.source.ok_or_else(|| not_found("no default source"))?;
                let entry = conn
                    .source_by_name(&source_name)?
                    .ok_or_else(|| not_found(&source_name))?;
                Ok(ResolvedSource::new(entry, DeviceKind::Microphone))
            }
        };
    };

    let kind = request.device_kind.unwrap_or_else(|| source_names::classify(uid));
    if let Some(entry) = conn.source_by_name(uid)? {
        return Ok(ResolvedSource::new(entry, kind));
    }

    // `<sink>.monitor` for a sink whose monitor is named differently, or a bare sink name.
    let sink_name = source_names::sink_of_monitor(uid).unwrap_or(uid);
    monitor_of_sink(conn, sink_name, request.device_kind.unwrap_or(DeviceKind::SystemOutput))
        .map_err(|_| not_found(uid))
}

fn monitor_of_sink(
    conn: &mut PulseConnection,
    sink_name: &str,
    kind: DeviceKind,
) -> Result<ResolvedSource, CaptureError> {
    let sink = conn
        .sink_by_name(sink_name)?
        .ok_or_else(|| CaptureError::DeviceResolutionFailure(sink_name.to_string()))?;
    if sink.monitor_source.is_empty() {
        return Err(CaptureError::DeviceResolutionFailure(format!(
            "sink {} has no monitor source",
            sink_name
        )));
    }
    let entry = conn
        .source_by_name(&sink.monitor_source)?
        .ok_or_else(|| CaptureError::DeviceResolutionFailure(sink.monitor_source.clone()))?;
    Ok(ResolvedSource::new(entry, kind))
}

fn open_stream(
    conn: &mut PulseConnection,
    source: &ResolvedSource,
    request: &StreamRequest,
) -> Result<(Stream, Spec), CaptureError> {
    let spec = Spec {
        format: Format::F32le,
        rate: if source.rate > 0 { source.rate } else { request.sample_rate },
        channels: source.channels.max(1),
    };
    if !spec.is_valid() {
        return Err(CaptureError::RuntimeFault(format!("invalid sample spec {:?}", spec)));
    }

    let mut proplist = Proplist::new()
        .ok_or_else(|| CaptureError::RuntimeFault("failed to create stream proplist".into()))?;
    let _ = proplist.set_str("filter.apply", FILTER_APPLY);

    let mut stream = Stream::new_with_proplist(conn.context_mut(), STREAM_NAME, &spec, None, &mut proplist)
        .ok_or_else(|| CaptureError::RuntimeFault("failed to create record stream".into()))?;

    let fragment_usecs =
        u64::from(request.frames_per_buffer) * 1_000_000 / u64::from(request.sample_rate.max(1));
    let attr = BufferAttr {
        maxlength: u32::MAX,
        tlength: u32::MAX,
        prebuf: u32::MAX,
        minreq: u32::MAX,
        fragsize: spec.usec_to_bytes(MicroSeconds(fragment_usecs)) as u32,
    };

    stream
        .connect_record(Some(&source.device.uid), Some(&attr), StreamFlags::ADJUST_LATENCY)
        .map_err(|e| CaptureError::RuntimeFault(format!("connect_record failed: {}", e)))?;

    let started = Instant::now();
    loop {
        conn.iterate(false)?;
        match stream.get_state() {
            StreamState::Ready => break,
            StreamState::Failed | StreamState::Terminated => {
                return Err(CaptureError::RuntimeFault("record stream failed to start".into()));
            }
            _ => {}
        }
        if started.elapsed() >= STREAM_READY_TIMEOUT {
            let _ = stream.disconnect();
            return Err(CaptureError::RuntimeFault("record stream not ready in time".into()));
        }
        thread::sleep(POLL_INTERVAL);
    }

    log::info!(
        "[PulseCapture] Stream ready: {} Hz, {} ch, fragment {} us",
        spec.rate,
        spec.channels,
        fragment_usecs
    );
    Ok((stream, spec))
}

/// Pumps the mainloop and delivers fragments until `running` clears.
fn pump(
    conn: &mut PulseConnection,
    stream: &mut Stream,
    spec: Spec,
    handler: &mut AudioBlockHandler,
    events: &Arc<dyn CaptureDelegate>,
    running: &AtomicBool,
) -> u64 {
    let sample_rate = f64::from(spec.rate);
    let channels = u16::from(spec.channels);
    let mut scratch: Vec<f32> = Vec::with_capacity(spec.rate as usize / 50 * usize::from(spec.channels));
    let mut blocks = 0u64;
    let mut faulted = false;

    while running.load(Ordering::SeqCst) {
        if faulted {
            thread::sleep(POLL_INTERVAL);
            continue;
        }

        let delivered = conn
            .iterate(false)
            .and_then(|_| drain(stream, &mut scratch, handler, sample_rate, channels));

        match delivered {
            Ok(0) => match stream_fault(conn.context_state(), stream.get_state()) {
                Some(reason) => {
                    faulted = true;
                    report(events, CaptureError::RuntimeFault(reason));
                }
                None => thread::sleep(POLL_INTERVAL),
            },
            Ok(n) => {
                if blocks == 0 {
                    log::debug!("[PulseCapture] First fragment: {} samples", scratch.len());
                }
                let before = blocks / STATUS_EVERY_BLOCKS;
                blocks += n;
                if blocks / STATUS_EVERY_BLOCKS != before {
                    log::debug!("[PulseCapture] Status: {} blocks delivered", blocks);
                }
            }
            Err(e) => {
                faulted = true;
                report(events, e);
            }
        }
    }
    blocks
}

/// Hands every readable fragment to `handler`. Returns how many were delivered.
fn drain(
    stream: &mut Stream,
    scratch: &mut Vec<f32>,
    handler: &mut AudioBlockHandler,
    sample_rate: f64,
    channels: u16,
) -> Result<u64, CaptureError> {
    let mut delivered = 0;
    loop {
        let peeked = stream
            .peek()
            .map_err(|e| CaptureError::RuntimeFault(format!("stream peek failed: {}", e)))?;
        match peeked {
            PeekResult::Empty => return Ok(delivered),
            PeekResult::Hole(_) => {}
            PeekResult::Data(bytes) => {
                source_names::decode_f32le(bytes, scratch);
                handler(scratch.as_slice(), sample_rate, channels);
                delivered += 1;
            }
        }
        stream
            .discard()
            .map_err(|e| CaptureError::RuntimeFault(format!("stream discard failed: {}", e)))?;
    }
}

fn stream_fault(context: CtxState, stream: StreamState) -> Option<String> {
    match (context, stream) {
        (CtxState::Failed | CtxState::Terminated, _) => Some("PulseAudio connection lost".into()),
        (_, StreamState::Failed | StreamState::Terminated) => Some("capture stream failed".into()),
        _ => None,
    }
}

fn report(events: &Arc<dyn CaptureDelegate>, error: CaptureError) {
    log::error!("[PulseCapture] {}", error);
    events.on_error(&error);
}

fn idle_until_stopped(running: &AtomicBool) {
    while running.load(Ordering::SeqCst) {
        thread::sleep(POLL_INTERVAL);
    }
}
