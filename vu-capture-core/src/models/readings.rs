use std::sync::atomic::{AtomicU32, Ordering};

use serde::Serialize;

/// `f32` stored as raw bits in an `AtomicU32`.
#[derive(Debug)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    pub fn load(&self, order: Ordering) -> f32 {
        f32::from_bits(self.0.load(order))
    }

    pub fn store(&self, value: f32, order: Ordering) {
        self.0.store(value.to_bits(), order);
    }
}

/// Latest VU reading per channel, in VU dB.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VuReading {
    pub left_db: f32,
    pub right_db: f32,
}

/// The two scalars shared between the capture thread and the UI thread.
///
/// Relaxed ordering: each channel is an independent latest-value reading with
/// no cross-field consistency requirement.
#[derive(Debug)]
pub struct PublishedReadings {
    left_db: AtomicF32,
    right_db: AtomicF32,
}

impl PublishedReadings {
    pub fn new(floor: f32) -> Self {
        Self {
            left_db: AtomicF32::new(floor),
            right_db: AtomicF32::new(floor),
        }
    }

    pub fn publish(&self, left_db: f32, right_db: f32) {
        self.left_db.store(left_db, Ordering::Relaxed);
        self.right_db.store(right_db, Ordering::Relaxed);
    }

    pub fn left_db(&self) -> f32 {
        self.left_db.load(Ordering::Relaxed)
    }

    pub fn right_db(&self) -> f32 {
        self.right_db.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> VuReading {
        VuReading {
            left_db: self.left_db(),
            right_db: self.right_db(),
        }
    }
}
