use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::config::{CaptureOptions, MeterScale};
use crate::models::device::{DeviceDescriptor, DeviceKind};
use crate::models::error::CaptureError;
use crate::models::readings::{PublishedReadings, VuReading};
use crate::models::state::CaptureState;
use crate::processing::ballistics::BallisticsConfig;
use crate::processing::meter::MeterProcessor;
use crate::processing::reference::ReferenceControl;
use crate::traits::capture_backend::{AudioBlockHandler, CaptureBackend, StreamRequest};
use crate::traits::capture_delegate::{CaptureDelegate, LoggingDelegate};

/// Reported as the current device until the backend resolves the default
/// output's monitor.
pub const DEFAULT_MONITOR_LABEL: &str = "[default monitor]";

/// Same, for the default input source.
pub const DEFAULT_SOURCE_LABEL: &str = "[default source]";

/// Internal mutable session state, protected by `parking_lot::Mutex`.
struct SessionShared {
    state: CaptureState,
    current_uid: Option<String>,
    delegate: Arc<dyn CaptureDelegate>,
}

/// Sits between the backend and the user delegate, keeping session state in
/// step with what the capture thread reports.
struct SessionRelay {
    shared: Arc<Mutex<SessionShared>>,
    references: Arc<ReferenceControl>,
}

impl SessionRelay {
    fn transition(&self, next: CaptureState) {
        let delegate = {
            let mut s = self.shared.lock();
            s.state = next.clone();
            Arc::clone(&s.delegate)
        };
        delegate.on_state_changed(&next);
    }
}

impl CaptureDelegate for SessionRelay {
    fn on_error(&self, error: &CaptureError) {
        let degrade = error.is_async() && !self.shared.lock().state.is_idle();
        if degrade {
            self.transition(CaptureState::Degraded(error.clone()));
        }
        let delegate = Arc::clone(&self.shared.lock().delegate);
        delegate.on_error(error);
    }

    fn on_device_resolved(&self, device_uid: &str, kind: DeviceKind) {
        self.references.set_device_kind(kind);
        let (delegate, running) = {
            let mut s = self.shared.lock();
            s.current_uid = Some(device_uid.to_string());
            let running = matches!(s.state, CaptureState::Starting | CaptureState::Running { .. });
            (Arc::clone(&s.delegate), running)
        };
        if running {
            self.transition(CaptureState::Running {
                device_uid: Some(device_uid.to_string()),
            });
        }
        delegate.on_device_resolved(device_uid, kind);
    }
}

/// The single object the application talks to.
///
/// Generic over the platform backend via the `CaptureBackend` trait.
/// Owns the calibration, publishes readings and builds a fresh DSP pipeline
/// for every `start`:
/// ```text
/// [Backend thread] → MeterProcessor(DspState, L/R ballistics) → PublishedReadings
///                                                                     ↑
///                                                        left_vu_db / right_vu_db
/// ```
pub struct MeterSession<B: CaptureBackend> {
    backend: B,
    options: CaptureOptions,
    ballistics: BallisticsConfig,
    /// Explicit classification from the last `switch_to`.
    device_tag: Option<DeviceKind>,
    references: Arc<ReferenceControl>,
    readings: Arc<PublishedReadings>,
    shared: Arc<Mutex<SessionShared>>,
}

impl<B: CaptureBackend> MeterSession<B> {
    pub fn new(backend: B, options: CaptureOptions) -> Result<Self, CaptureError> {
        options.validate().map_err(CaptureError::InvalidOptions)?;
        Ok(Self {
            backend,
            references: Arc::new(ReferenceControl::new(&options)),
            readings: Arc::new(PublishedReadings::new(options.scale.min_vu)),
            shared: Arc::new(Mutex::new(SessionShared {
                state: CaptureState::Idle,
                current_uid: None,
                delegate: Arc::new(LoggingDelegate),
            })),
            options,
            ballistics: BallisticsConfig::default(),
            device_tag: None,
        })
    }

    /// Replaces the movement constants used from the next `start`.
    pub fn with_ballistics(mut self, config: BallisticsConfig) -> Self {
        self.ballistics = config;
        self
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn CaptureDelegate>) {
        self.shared.lock().delegate = delegate;
    }

    pub fn scale(&self) -> MeterScale {
        self.options.scale
    }

    pub fn state(&self) -> CaptureState {
        self.shared.lock().state.clone()
    }

    pub fn is_running(&self) -> bool {
        self.backend.is_running()
    }

    /// Classification currently driving the reference level.
    pub fn device_kind(&self) -> DeviceKind {
        self.references.device_kind()
    }

    /// Identifier of the open device, or a placeholder label while the
    /// default device is still being resolved.
    pub fn current_device_uid(&self) -> Option<String> {
        self.shared.lock().current_uid.clone()
    }

    /// Starts capture. Transitions: idle → starting → running.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.backend.is_running() {
            return Err(CaptureError::AlreadyRunning);
        }

        let kind = match (&self.options.device_uid, self.device_tag) {
            (_, Some(tag)) => tag,
            (Some(uid), None) => self.backend.classify_identifier(uid),
            (None, None) => self.options.device_type,
        };
        self.references.set_device_kind(kind);

        let floor = self.options.scale.min_vu;
        self.readings.publish(floor, floor);

        self.shared.lock().current_uid = Some(self.device_label());
        self.set_state(CaptureState::Starting);

        let request = StreamRequest {
            device_uid: self.options.device_uid.clone(),
            device_kind: self.device_tag,
            fallback_kind: self.options.device_type,
            sample_rate: self.options.sample_rate,
            frames_per_buffer: self.options.frames_per_buffer,
        };

        let mut meter = MeterProcessor::new(
            self.options.scale,
            self.ballistics,
            Arc::clone(&self.references),
            Arc::clone(&self.readings),
        );
        let handler: AudioBlockHandler = Box::new(move |samples: &[f32], sample_rate: f64, channels: u16| {
            meter.process(samples, sample_rate, channels);
        });
        let relay: Arc<dyn CaptureDelegate> = Arc::new(SessionRelay {
            shared: Arc::clone(&self.shared),
            references: Arc::clone(&self.references),
        });

        log::info!(
            "starting capture: device={:?} kind={} reference={} dBFS",
            request.device_uid,
            kind.label(),
            self.references.effective_dbfs()
        );

        if let Err(e) = self.backend.start(request, handler, relay) {
            log::error!("capture start failed: {}", e);
            self.shared.lock().current_uid = None;
            self.set_state(CaptureState::Idle);
            return Err(e);
        }

        let next = {
            let s = self.shared.lock();
            match s.state {
                CaptureState::Starting => Some(CaptureState::Running {
                    device_uid: s.current_uid.clone(),
                }),
                _ => None,
            }
        };
        if let Some(next) = next {
            self.set_state(next);
        }
        Ok(())
    }

    /// Stops capture and joins the capture thread. Safe to call in any state.
    pub fn stop(&mut self) {
        self.backend.stop();
        let floor = self.options.scale.min_vu;
        self.readings.publish(floor, floor);
        if !self.shared.lock().state.is_idle() {
            log::info!("capture stopped");
            self.set_state(CaptureState::Idle);
        }
    }

    /// Reopens capture on `device_uid`, or on the default device when `None`.
    ///
    /// The classification is inferred from the identifier's shape.
    pub fn switch_device(&mut self, device_uid: Option<&str>) -> Result<(), CaptureError> {
        self.switch_with(device_uid.map(str::to_owned), None)
    }

    /// Reopens capture on an enumerated device, using its explicit kind tag.
    pub fn switch_to(&mut self, device: &DeviceDescriptor) -> Result<(), CaptureError> {
        self.switch_with(Some(device.uid.clone()), Some(device.kind))
    }

    fn switch_with(
        &mut self,
        device_uid: Option<String>,
        tag: Option<DeviceKind>,
    ) -> Result<(), CaptureError> {
        self.stop();
        self.options.device_uid = device_uid;
        self.device_tag = tag;

        let label = self.device_label();
        log::info!("switching capture device to {}", label);
        self.start()?;

        self.delegate().on_device_changed(&label);
        Ok(())
    }

    pub fn left_vu_db(&self) -> f32 {
        self.readings.left_db()
    }

    pub fn right_vu_db(&self) -> f32 {
        self.readings.right_db()
    }

    pub fn reading(&self) -> VuReading {
        self.readings.snapshot()
    }

    /// Shared handle for a UI refresh timer on another thread.
    pub fn readings_handle(&self) -> Arc<PublishedReadings> {
        Arc::clone(&self.readings)
    }

    /// Lists capturable inputs. Never touches the active stream.
    pub fn enumerate_input_devices(&self) -> Result<Vec<DeviceDescriptor>, CaptureError> {
        self.backend.enumerate_input_devices()
    }

    pub fn device_report(&self) -> Result<String, CaptureError> {
        self.backend.device_report()
    }

    /// Effective 0 VU reference in dBFS for the current classification.
    pub fn reference_dbfs(&self) -> f32 {
        self.references.effective_dbfs()
    }

    /// Stores `dbfs` into the slot of the current classification.
    pub fn set_reference_dbfs(&mut self, dbfs: f32) -> Result<(), CaptureError> {
        match self.device_kind() {
            DeviceKind::Microphone => self.set_microphone_reference_dbfs(dbfs),
            DeviceKind::SystemOutput => self.set_monitor_reference_dbfs(dbfs),
        }
    }

    pub fn microphone_reference_dbfs(&self) -> f32 {
        self.options.reference_for(DeviceKind::Microphone)
    }

    pub fn set_microphone_reference_dbfs(&mut self, dbfs: f32) -> Result<(), CaptureError> {
        check_finite(dbfs)?;
        self.options.microphone_reference_dbfs = dbfs;
        self.references.set_reference(DeviceKind::Microphone, dbfs);
        self.delegate().on_reference_changed(DeviceKind::Microphone, dbfs);
        Ok(())
    }

    pub fn monitor_reference_dbfs(&self) -> f32 {
        self.options.reference_for(DeviceKind::SystemOutput)
    }

    pub fn set_monitor_reference_dbfs(&mut self, dbfs: f32) -> Result<(), CaptureError> {
        check_finite(dbfs)?;
        self.options.monitor_reference_dbfs = dbfs;
        self.references.set_reference(DeviceKind::SystemOutput, dbfs);
        self.delegate().on_reference_changed(DeviceKind::SystemOutput, dbfs);
        Ok(())
    }

    pub fn reference_override(&self) -> Option<f32> {
        self.options.reference_dbfs_override
    }

    /// Sets or clears the reference that wins over both per-type values.
    ///
    /// Not reported through `on_reference_changed`: the override is not a
    /// per-device-type calibration and must not be persisted as one.
    pub fn set_reference_override(&mut self, dbfs: Option<f32>) -> Result<(), CaptureError> {
        if let Some(value) = dbfs {
            check_finite(value)?;
        }
        self.options.reference_dbfs_override = dbfs;
        self.references.set_override(dbfs);
        log::info!("reference override: {:?}", dbfs);
        Ok(())
    }

    // --- Internal helpers ---

    /// Requested identifier, or the placeholder for the default device.
    fn device_label(&self) -> String {
        match (&self.options.device_uid, self.options.device_type) {
            (Some(uid), _) => uid.clone(),
            (None, DeviceKind::SystemOutput) => DEFAULT_MONITOR_LABEL.to_string(),
            (None, DeviceKind::Microphone) => DEFAULT_SOURCE_LABEL.to_string(),
        }
    }

    fn delegate(&self) -> Arc<dyn CaptureDelegate> {
        Arc::clone(&self.shared.lock().delegate)
    }

    fn set_state(&self, new_state: CaptureState) {
        let delegate = {
            let mut s = self.shared.lock();
            s.state = new_state.clone();
            Arc::clone(&s.delegate)
        };
        delegate.on_state_changed(&new_state);
    }
}

impl<B: CaptureBackend> Drop for MeterSession<B> {
    fn drop(&mut self) {
        self.backend.stop();
    }
}

fn check_finite(dbfs: f32) -> Result<(), CaptureError> {
    if dbfs.is_finite() {
        Ok(())
    } else {
        Err(CaptureError::InvalidOptions(format!(
            "reference level must be finite, got {}",
            dbfs
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const RATE: f64 = 48000.0;
    const BLOCK_FRAMES: usize = 480;

    #[derive(Default)]
    struct ScriptedInner {
        handler: Option<AudioBlockHandler>,
        events: Option<Arc<dyn CaptureDelegate>>,
        requests: Vec<StreamRequest>,
        fail_next_start: Option<CaptureError>,
        enumerations: usize,
    }

    /// In-process backend: blocks are pushed by the test, synchronously.
    #[derive(Clone, Default)]
    struct ScriptedBackend {
        inner: Arc<Mutex<ScriptedInner>>,
    }

    impl ScriptedBackend {
        fn feed(&self, samples: &[f32], channels: u16) {
            let mut inner = self.inner.lock();
            if let Some(handler) = inner.handler.as_mut() {
                handler(samples, RATE, channels);
            }
        }

        fn feed_for(&self, secs: f32, amplitude: f32) {
            let block = vec![amplitude; BLOCK_FRAMES * 2];
            let blocks = (secs * RATE as f32 / BLOCK_FRAMES as f32).round() as usize;
            for _ in 0..blocks {
                self.feed(&block, 2);
            }
        }

        fn raise(&self, error: CaptureError) {
            let events = self.inner.lock().events.clone();
            if let Some(events) = events {
                events.on_error(&error);
            }
        }

        fn requests(&self) -> Vec<StreamRequest> {
            self.inner.lock().requests.clone()
        }
    }

    impl CaptureBackend for ScriptedBackend {
        fn start(
            &mut self,
            request: StreamRequest,
            handler: AudioBlockHandler,
            events: Arc<dyn CaptureDelegate>,
        ) -> Result<(), CaptureError> {
            {
                let mut inner = self.inner.lock();
                if let Some(error) = inner.fail_next_start.take() {
                    return Err(error);
                }
                inner.handler = Some(handler);
                inner.events = Some(Arc::clone(&events));
                inner.requests.push(request.clone());
            }

            match request.device_uid.as_deref() {
                Some("missing") => {
                    events.on_error(&CaptureError::DeviceResolutionFailure("missing".into()))
                }
                Some(uid) => {
                    let kind = request.device_kind.unwrap_or_else(|| self.classify_identifier(uid));
                    events.on_device_resolved(uid, kind);
                }
                None => match request.fallback_kind {
                    DeviceKind::SystemOutput => {
                        events.on_device_resolved("speakers.monitor", DeviceKind::SystemOutput)
                    }
                    DeviceKind::Microphone => {
                        events.on_device_resolved("mic", DeviceKind::Microphone)
                    }
                },
            }
            Ok(())
        }

        fn stop(&mut self) {
            let mut inner = self.inner.lock();
            inner.handler = None;
            inner.events = None;
        }

        fn is_running(&self) -> bool {
            self.inner.lock().handler.is_some()
        }

        fn enumerate_input_devices(&self) -> Result<Vec<DeviceDescriptor>, CaptureError> {
            self.inner.lock().enumerations += 1;
            Ok(vec![DeviceDescriptor {
                name: "Speakers".into(),
                uid: "speakers.monitor".into(),
                channel_count: 2,
                is_input_capable: true,
                is_default: true,
                kind: DeviceKind::SystemOutput,
            }])
        }

        fn device_report(&self) -> Result<String, CaptureError> {
            Ok("speakers.monitor [DEFAULT]\n".into())
        }

        fn classify_identifier(&self, device_uid: &str) -> DeviceKind {
            if device_uid.ends_with(".monitor") {
                DeviceKind::SystemOutput
            } else {
                DeviceKind::Microphone
            }
        }
    }

    #[derive(Default)]
    struct RecordingDelegate {
        errors: Mutex<Vec<CaptureError>>,
        changed: Mutex<Vec<String>>,
        resolved: Mutex<Vec<(String, DeviceKind)>>,
        references: Mutex<Vec<(DeviceKind, f32)>>,
    }

    impl CaptureDelegate for RecordingDelegate {
        fn on_error(&self, error: &CaptureError) {
            self.errors.lock().push(error.clone());
        }

        fn on_device_resolved(&self, device_uid: &str, kind: DeviceKind) {
            self.resolved.lock().push((device_uid.to_string(), kind));
        }

        fn on_device_changed(&self, device_uid: &str) {
            self.changed.lock().push(device_uid.to_string());
        }

        fn on_reference_changed(&self, kind: DeviceKind, dbfs: f32) {
            self.references.lock().push((kind, dbfs));
        }
    }

    fn session(kind: DeviceKind) -> (MeterSession<ScriptedBackend>, ScriptedBackend, Arc<RecordingDelegate>) {
        let backend = ScriptedBackend::default();
        let options = CaptureOptions {
            device_type: kind,
            ..Default::default()
        };
        let mut session = MeterSession::new(backend.clone(), options).unwrap();
        let delegate = Arc::new(RecordingDelegate::default());
        session.set_delegate(delegate.clone());
        (session, backend, delegate)
    }

    #[test]
    fn rejects_invalid_options() {
        let options = CaptureOptions {
            sample_rate: 0,
            ..Default::default()
        };
        let result = MeterSession::new(ScriptedBackend::default(), options);
        assert!(matches!(result, Err(CaptureError::InvalidOptions(_))));
    }

    #[test]
    fn microphone_tone_converges_to_reference_offset() {
        let (mut session, backend, _) = session(DeviceKind::Microphone);
        session.start().unwrap();
        assert_eq!(session.left_vu_db(), -96.0);

        backend.feed_for(2.0, 0.1);

        assert_abs_diff_eq!(session.left_vu_db(), -20.0, epsilon = 0.5);
        assert_abs_diff_eq!(session.right_vu_db(), -20.0, epsilon = 0.5);
        assert_eq!(session.current_device_uid().as_deref(), Some("mic"));
        assert_eq!(session.state(), CaptureState::Running { device_uid: Some("mic".into()) });
    }

    #[test]
    fn start_while_running_is_rejected() {
        let (mut session, _, _) = session(DeviceKind::SystemOutput);
        session.start().unwrap();
        assert_eq!(session.start(), Err(CaptureError::AlreadyRunning));
        assert!(session.is_running());
    }

    #[test]
    fn failed_start_leaves_session_idle() {
        let (mut session, backend, _) = session(DeviceKind::SystemOutput);
        backend.inner.lock().fail_next_start = Some(CaptureError::SetupFailure("no server".into()));

        let result = session.start();
        assert_eq!(result, Err(CaptureError::SetupFailure("no server".into())));
        assert!(!session.is_running());
        assert!(session.state().is_idle());
        assert_eq!(session.current_device_uid(), None);
    }

    #[test]
    fn stop_is_idempotent() {
        let (mut session, backend, _) = session(DeviceKind::Microphone);
        session.stop();
        session.start().unwrap();
        backend.feed_for(0.5, 0.1);

        session.stop();
        session.stop();
        assert!(!session.is_running());
        assert!(session.state().is_idle());
        assert_eq!(session.left_vu_db(), -96.0);
    }

    #[test]
    fn switch_round_trip_resets_every_time() {
        let (mut session, backend, delegate) = session(DeviceKind::Microphone);
        session.start().unwrap();

        for uid in ["mic-a", "mic-b", "mic-a"] {
            backend.feed_for(1.0, 0.1);
            assert!(session.left_vu_db() > -30.0);

            session.switch_device(Some(uid)).unwrap();
            assert_eq!(session.left_vu_db(), -96.0);
            assert_eq!(session.right_vu_db(), -96.0);
            assert_eq!(session.current_device_uid().as_deref(), Some(uid));

            // A fresh pipeline has no smoothed power: silence stays on the floor.
            backend.feed_for(0.2, 0.0);
            assert_eq!(session.left_vu_db(), -96.0);
        }

        assert_eq!(backend.requests().len(), 4);
        assert_eq!(*delegate.changed.lock(), vec!["mic-a", "mic-b", "mic-a"]);
    }

    #[test]
    fn enumeration_does_not_disturb_running_capture() {
        let (mut session, backend, _) = session(DeviceKind::Microphone);
        session.start().unwrap();
        backend.feed_for(2.0, 0.1);
        let before = session.left_vu_db();

        let devices = session.enumerate_input_devices().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(session.left_vu_db(), before);
        assert!(session.is_running());

        backend.feed_for(0.1, 0.1);
        assert_abs_diff_eq!(session.left_vu_db(), -20.0, epsilon = 0.5);
        assert_eq!(backend.requests().len(), 1);
        assert_eq!(backend.inner.lock().enumerations, 1);
    }

    #[test]
    fn identifier_shape_sets_classification() {
        let (mut session, _, _) = session(DeviceKind::Microphone);

        session.switch_device(Some("alsa_output.pci.analog-stereo.monitor")).unwrap();
        assert_eq!(session.device_kind(), DeviceKind::SystemOutput);
        assert_eq!(session.reference_dbfs(), -14.0);

        session.switch_device(Some("alsa_input.usb-mic")).unwrap();
        assert_eq!(session.device_kind(), DeviceKind::Microphone);
        assert_eq!(session.reference_dbfs(), 0.0);
    }

    #[test]
    fn explicit_tag_wins_over_identifier_shape() {
        let (mut session, backend, _) = session(DeviceKind::SystemOutput);
        let device = DeviceDescriptor {
            name: "Odd Mic".into(),
            uid: "odd.monitor".into(),
            channel_count: 1,
            is_input_capable: true,
            is_default: false,
            kind: DeviceKind::Microphone,
        };

        session.switch_to(&device).unwrap();
        assert_eq!(session.device_kind(), DeviceKind::Microphone);
        assert_eq!(backend.requests()[0].device_kind, Some(DeviceKind::Microphone));

        // A plain switch drops the tag again.
        session.switch_device(Some("odd.monitor")).unwrap();
        assert_eq!(session.device_kind(), DeviceKind::SystemOutput);
    }

    #[test]
    fn default_switch_reports_placeholder_then_resolved_uid() {
        let (mut session, _, delegate) = session(DeviceKind::SystemOutput);
        session.switch_device(None).unwrap();

        assert_eq!(*delegate.changed.lock(), vec![DEFAULT_MONITOR_LABEL]);
        assert_eq!(session.current_device_uid().as_deref(), Some("speakers.monitor"));
        assert_eq!(
            *delegate.resolved.lock(),
            vec![("speakers.monitor".to_string(), DeviceKind::SystemOutput)]
        );
    }

    #[test]
    fn default_microphone_switch_uses_source_placeholder() {
        let (mut session, _, delegate) = session(DeviceKind::Microphone);
        session.switch_device(None).unwrap();

        assert_eq!(*delegate.changed.lock(), vec![DEFAULT_SOURCE_LABEL]);
        assert_eq!(session.current_device_uid().as_deref(), Some("mic"));
    }

    #[test]
    fn runtime_fault_degrades_but_keeps_running() {
        let (mut session, backend, delegate) = session(DeviceKind::SystemOutput);
        session.start().unwrap();

        backend.raise(CaptureError::RuntimeFault("stream failed".into()));

        assert!(session.is_running());
        assert!(session.state().is_degraded());
        assert_eq!(delegate.errors.lock().len(), 1);

        session.stop();
        assert!(session.state().is_idle());
    }

    #[test]
    fn unresolvable_device_is_reported_asynchronously() {
        let (mut session, _, delegate) = session(DeviceKind::Microphone);
        session.switch_device(Some("missing")).unwrap();

        assert_eq!(
            *delegate.errors.lock(),
            vec![CaptureError::DeviceResolutionFailure("missing".into())]
        );
        assert!(session.state().is_degraded());
    }

    #[test]
    fn reference_setters_track_current_classification() {
        let (mut session, backend, delegate) = session(DeviceKind::Microphone);
        session.start().unwrap();

        session.set_reference_dbfs(-6.0).unwrap();
        assert_eq!(session.microphone_reference_dbfs(), -6.0);
        assert_eq!(session.monitor_reference_dbfs(), -14.0);
        assert_eq!(session.reference_dbfs(), -6.0);

        backend.feed_for(2.0, 0.1);
        assert_abs_diff_eq!(session.left_vu_db(), -14.0, epsilon = 0.5);

        session.set_reference_override(Some(-20.0)).unwrap();
        assert_eq!(session.reference_override(), Some(-20.0));
        assert_eq!(session.reference_dbfs(), -20.0);
        session.set_reference_override(None).unwrap();
        assert_eq!(session.reference_override(), None);
        assert_eq!(session.reference_dbfs(), -6.0);

        assert!(session.set_monitor_reference_dbfs(f32::NAN).is_err());

        session.set_monitor_reference_dbfs(-18.0).unwrap();
        assert_eq!(session.reference_dbfs(), -6.0);

        assert_eq!(
            *delegate.references.lock(),
            vec![(DeviceKind::Microphone, -6.0), (DeviceKind::SystemOutput, -18.0)]
        );
    }

    #[test]
    fn custom_ballistics_apply_from_next_start() {
        let backend = ScriptedBackend::default();
        let options = CaptureOptions {
            device_type: DeviceKind::Microphone,
            ..Default::default()
        };
        let mut session = MeterSession::new(backend.clone(), options)
            .unwrap()
            .with_ballistics(BallisticsConfig::default().without_jitter());
        session.start().unwrap();

        backend.feed_for(2.0, 0.1);

        // Without jitter both channels see identical input and land on the same value.
        assert_eq!(session.left_vu_db(), session.right_vu_db());
        assert_abs_diff_eq!(session.left_vu_db(), -20.0, epsilon = 0.5);
    }

    #[test]
    fn readings_handle_sees_live_values() {
        let (mut session, backend, _) = session(DeviceKind::Microphone);
        let handle = session.readings_handle();
        session.start().unwrap();
        backend.feed_for(1.0, 0.1);

        assert_eq!(handle.snapshot(), session.reading());
        assert!(handle.left_db() > -96.0);
    }
}
