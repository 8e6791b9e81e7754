use super::error::CaptureError;

/// Capture session state machine.
///
/// State transitions:
/// ```text
/// idle → starting → running ⇄ degraded
///   ↑                  │          │
///   └────── stop ──────┴──────────┘
/// ```
///
/// `Degraded` keeps `is_running()` true: a runtime fault leaves the native
/// session in place until an explicit `stop`.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureState {
    Idle,
    Starting,
    Running { device_uid: Option<String> },
    Degraded(CaptureError),
}

impl CaptureState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. } | Self::Degraded(_))
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }

    /// The fault that put the session into `Degraded`, if any.
    pub fn fault(&self) -> Option<&CaptureError> {
        match self {
            Self::Degraded(error) => Some(error),
            _ => None,
        }
    }
}
