use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use vu_capture_core::{CaptureDelegate, CaptureError, CaptureState, DeviceKind};

use crate::reference_store::{self, StoredReferences};

/// CaptureDelegate that writes reference changes back to the JSON store.
pub struct PersistingDelegate {
    references: Mutex<StoredReferences>,
    store_path: Option<PathBuf>,
}

impl PersistingDelegate {
    pub fn new(references: StoredReferences, store_path: Option<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            references: Mutex::new(references),
            store_path,
        })
    }

    pub fn references(&self) -> StoredReferences {
        *self.references.lock()
    }
}

impl CaptureDelegate for PersistingDelegate {
    fn on_error(&self, error: &CaptureError) {
        log::error!("capture error: {}", error);
    }

    fn on_device_resolved(&self, device_uid: &str, kind: DeviceKind) {
        log::info!("capturing from {} ({})", device_uid, kind.label());
    }

    fn on_device_changed(&self, device_uid: &str) {
        log::info!("switched to {}", device_uid);
    }

    fn on_reference_changed(&self, kind: DeviceKind, dbfs: f32) {
        let snapshot = {
            let mut references = self.references.lock();
            references.set(kind, dbfs);
            *references
        };

        let Some(path) = &self.store_path else {
            return;
        };
        match reference_store::save(&snapshot, path) {
            Ok(()) => log::info!("saved {} reference {:.1} dBFS to {}", kind.label(), dbfs, path.display()),
            Err(e) => log::warn!("could not persist reference: {}", e),
        }
    }

    fn on_state_changed(&self, state: &CaptureState) {
        log::debug!("state: {:?}", state);
    }
}
