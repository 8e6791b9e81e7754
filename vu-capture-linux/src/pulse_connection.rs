//! Mainloop + context pair driven synchronously from the owning thread.
//!
//! Used both by the capture thread (long-lived) and by enumeration (a
//! temporary connection that never touches the capture stream).

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use libpulse_binding as pulse;
use pulse::callbacks::ListResult;
use pulse::context::{Context, FlagSet as ContextFlags, State as CtxState};
use pulse::mainloop::standard::{IterateResult, Mainloop};
use pulse::operation::{Operation, State as OpState};
use pulse::proplist::Proplist;

use vu_capture_core::CaptureError;

use crate::inventory::{ServerDefaults, SinkEntry, SourceEntry};

pub const APPLICATION_NAME: &str = "VU Meter";

/// Upper bound on waiting for the context to become ready.
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);

const CONNECT_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct PulseConnection {
    mainloop: Mainloop,
    context: Context,
}

impl PulseConnection {
    /// Creates a mainloop and context and waits until the context is ready.
    pub fn connect(client_name: &str, timeout: Duration) -> Result<Self, CaptureError> {
        let mainloop = Mainloop::new().ok_or_else(|| {
            log::error!("[Pulse] Failed to create mainloop");
            CaptureError::SetupFailure("failed to create PulseAudio mainloop".into())
        })?;

        let mut proplist = Proplist::new()
            .ok_or_else(|| CaptureError::SetupFailure("failed to create proplist".into()))?;
        let _ = proplist.set_str(pulse::proplist::properties::APPLICATION_NAME, APPLICATION_NAME);

        let mut context = Context::new_with_proplist(&mainloop, client_name, &proplist).ok_or_else(|| {
            log::error!("[Pulse] Failed to create context");
            CaptureError::SetupFailure("failed to create PulseAudio context".into())
        })?;

        context.connect(None, ContextFlags::NOFLAGS, None).map_err(|e| {
            log::error!("[Pulse] connect() failed: {} (is PulseAudio/PipeWire running?)", e);
            CaptureError::SetupFailure(format!("failed to connect to PulseAudio: {}", e))
        })?;

        let mut conn = Self { mainloop, context };
        let started = Instant::now();
        loop {
            conn.iterate(false)
                .map_err(|e| CaptureError::SetupFailure(e.to_string()))?;

            match conn.context.get_state() {
                CtxState::Ready => {
                    log::debug!("[Pulse] Context ready after {:?}", started.elapsed());
                    return Ok(conn);
                }
                CtxState::Failed | CtxState::Terminated => {
                    log::error!("[Pulse] Context failed to connect");
                    return Err(CaptureError::SetupFailure(
                        "PulseAudio context failed to connect".into(),
                    ));
                }
                _ => {}
            }

            if started.elapsed() >= timeout {
                log::error!("[Pulse] Context not ready after {:?}", timeout);
                return Err(CaptureError::ConnectionTimeout(timeout));
            }
            thread::sleep(CONNECT_POLL_INTERVAL);
        }
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    pub fn context_state(&self) -> CtxState {
        self.context.get_state()
    }

    /// Runs one mainloop iteration.
    pub fn iterate(&mut self, block: bool) -> Result<(), CaptureError> {
        match self.mainloop.iterate(block) {
            IterateResult::Success(_) => Ok(()),
            IterateResult::Quit(_) => Err(CaptureError::RuntimeFault("mainloop quit unexpectedly".into())),
            IterateResult::Err(e) => Err(CaptureError::RuntimeFault(format!("mainloop iterate error: {}", e))),
        }
    }

    fn wait_for<G: ?Sized>(&mut self, op: &Operation<G>) -> Result<(), CaptureError> {
        loop {
            match op.get_state() {
                OpState::Done => return Ok(()),
                OpState::Cancelled => {
                    return Err(CaptureError::RuntimeFault("introspection request cancelled".into()))
                }
                OpState::Running => self.iterate(true)?,
            }
        }
    }

    pub fn server_defaults(&mut self) -> Result<ServerDefaults, CaptureError> {
        let slot = Rc::new(RefCell::new(ServerDefaults::default()));
        let writer = Rc::clone(&slot);
        let op = self.context.introspect().get_server_info(move |info| {
            let mut defaults = writer.borrow_mut();
            defaults.sink = info.default_sink_name.as_ref().map(|n| n.to_string());
            defaults.source = info.default_source_name.as_ref().map(|n| n.to_string());
        });
        self.wait_for(&op)?;

        let defaults = slot.borrow().clone();
        log::debug!("[Pulse] Server defaults: sink={:?} source={:?}", defaults.sink, defaults.source);
        Ok(defaults)
    }

    pub fn sinks(&mut self) -> Result<Vec<SinkEntry>, CaptureError> {
        let collected = Rc::new(RefCell::new(Vec::new()));
        let failed = Rc::new(Cell::new(false));
        let (items, flag) = (Rc::clone(&collected), Rc::clone(&failed));
        let op = self.context.introspect().get_sink_info_list(move |result| match result {
            ListResult::Item(info) => items.borrow_mut().push(sink_entry(info)),
            ListResult::End => {}
            ListResult::Error => flag.set(true),
        });
        self.wait_for(&op)?;

        if failed.get() {
            return Err(CaptureError::Enumeration("sink list request failed".into()));
        }
        let sinks = collected.take();
        Ok(sinks)
    }

    pub fn sources(&mut self) -> Result<Vec<SourceEntry>, CaptureError> {
        let collected = Rc::new(RefCell::new(Vec::new()));
        let failed = Rc::new(Cell::new(false));
        let (items, flag) = (Rc::clone(&collected), Rc::clone(&failed));
        let op = self.context.introspect().get_source_info_list(move |result| match result {
            ListResult::Item(info) => items.borrow_mut().push(source_entry(info)),
            ListResult::End => {}
            ListResult::Error => flag.set(true),
        });
        self.wait_for(&op)?;

        if failed.get() {
            return Err(CaptureError::Enumeration("source list request failed".into()));
        }
        let sources = collected.take();
        Ok(sources)
    }

    /// Looks up one sink. `Ok(None)` when the server does not know it.
    pub fn sink_by_name(&mut self, name: &str) -> Result<Option<SinkEntry>, CaptureError> {
        let slot = Rc::new(RefCell::new(None));
        let writer = Rc::clone(&slot);
        let op = self.context.introspect().get_sink_info_by_name(name, move |result| {
            if let ListResult::Item(info) = result {
                *writer.borrow_mut() = Some(sink_entry(info));
            }
        });
        self.wait_for(&op)?;
        let sink = slot.take();
        Ok(sink)
    }

    /// Looks up one source. `Ok(None)` when the server does not know it.
    pub fn source_by_name(&mut self, name: &str) -> Result<Option<SourceEntry>, CaptureError> {
        let slot = Rc::new(RefCell::new(None));
        let writer = Rc::clone(&slot);
        let op = self.context.introspect().get_source_info_by_name(name, move |result| {
            if let ListResult::Item(info) = result {
                *writer.borrow_mut() = Some(source_entry(info));
            }
        });
        self.wait_for(&op)?;
        let source = slot.take();
        Ok(source)
    }
}

impl Drop for PulseConnection {
    fn drop(&mut self) {
        if matches!(
            self.context.get_state(),
            CtxState::Connecting | CtxState::Authorizing | CtxState::SettingName | CtxState::Ready
        ) {
            log::debug!("[Pulse] Disconnecting");
            self.context.disconnect();
        }
        self.mainloop.quit(pulse::def::Retval(0));
    }
}

fn sink_entry(info: &pulse::context::introspect::SinkInfo) -> SinkEntry {
    let name = info.name.as_ref().map(|n| n.to_string()).unwrap_or_default();
    SinkEntry {
        description: info
            .description
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_else(|| name.clone()),
        monitor_source: info
            .monitor_source_name
            .as_ref()
            .map(|m| m.to_string())
            .unwrap_or_default(),
        name,
    }
}

fn source_entry(info: &pulse::context::introspect::SourceInfo) -> SourceEntry {
    let name = info.name.as_ref().map(|n| n.to_string()).unwrap_or_default();
    SourceEntry {
        description: info
            .description
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_else(|| name.clone()),
        channels: info.sample_spec.channels,
        rate: info.sample_spec.rate,
        is_monitor: info.monitor_of_sink.is_some(),
        name,
    }
}
