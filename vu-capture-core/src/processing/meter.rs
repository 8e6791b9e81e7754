use std::sync::Arc;

use crate::models::config::MeterScale;
use crate::models::readings::{PublishedReadings, VuReading};
use crate::processing::ballistics::{BallisticsConfig, BallisticsFilter};
use crate::processing::reference::ReferenceControl;
use crate::processing::vu_dsp::{self, DspState};

const LEFT_SEED: u32 = 0x1234_5678;
const RIGHT_SEED: u32 = 0x8765_4321;

/// Session-lifetime DSP pipeline driven from the capture thread.
///
/// Owns the [`DspState`] and both ballistics filters; a fresh instance is
/// built for every `start`, so nothing leaks across a device switch.
pub struct MeterProcessor {
    state: DspState,
    left: BallisticsFilter,
    right: BallisticsFilter,
    scale: MeterScale,
    references: Arc<ReferenceControl>,
    readings: Arc<PublishedReadings>,
    blocks: u64,
}

impl MeterProcessor {
    pub fn new(
        scale: MeterScale,
        ballistics: BallisticsConfig,
        references: Arc<ReferenceControl>,
        readings: Arc<PublishedReadings>,
    ) -> Self {
        let filter = |seed| {
            BallisticsFilter::with_config(scale.min_vu, ballistics)
                .with_travel(scale.min_vu, scale.max_vu)
                .with_seed(seed)
        };
        Self {
            state: DspState::default(),
            left: filter(LEFT_SEED),
            right: filter(RIGHT_SEED),
            scale,
            references,
            readings,
            blocks: 0,
        }
    }

    /// Processes one interleaved block and publishes the result.
    pub fn process(&mut self, samples: &[f32], sample_rate: f64, channels: u16) -> VuReading {
        let reference = self.references.snapshot();
        let reading = vu_dsp::process_block(
            samples,
            channels as usize,
            sample_rate as f32,
            &reference,
            &mut self.left,
            &mut self.right,
            &mut self.state,
            self.scale,
        );
        self.readings.publish(reading.left_db, reading.right_db);

        self.blocks += 1;
        if self.blocks == 1 {
            log::debug!(
                "first block: {} samples, {} ch @ {} Hz, reference {} dBFS",
                samples.len(),
                channels,
                sample_rate,
                reference.effective_dbfs()
            );
        }
        reading
    }

    pub fn is_awake(&self) -> bool {
        self.state.meter_awake
    }

    pub fn blocks_processed(&self) -> u64 {
        self.blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::CaptureOptions;
    use crate::models::device::DeviceKind;
    use approx::assert_abs_diff_eq;

    fn processor(kind: DeviceKind) -> (MeterProcessor, Arc<ReferenceControl>, Arc<PublishedReadings>) {
        let options = CaptureOptions {
            device_type: kind,
            ..Default::default()
        };
        let references = Arc::new(ReferenceControl::new(&options));
        let readings = Arc::new(PublishedReadings::new(options.scale.min_vu));
        let processor = MeterProcessor::new(
            options.scale,
            BallisticsConfig::default(),
            Arc::clone(&references),
            Arc::clone(&readings),
        );
        (processor, references, readings)
    }

    #[test]
    fn publishes_every_block() {
        let (mut processor, _, readings) = processor(DeviceKind::Microphone);
        let block = vec![0.1f32; 960];
        for _ in 0..100 {
            processor.process(&block, 48000.0, 2);
        }

        assert_eq!(processor.blocks_processed(), 100);
        assert!(processor.is_awake());
        assert_abs_diff_eq!(readings.left_db(), -20.0, epsilon = 0.5);
        assert_abs_diff_eq!(readings.right_db(), -20.0, epsilon = 0.5);
    }

    #[test]
    fn reference_change_applies_on_next_block() {
        let (mut processor, references, readings) = processor(DeviceKind::Microphone);
        let block = vec![0.1f32; 960];
        for _ in 0..100 {
            processor.process(&block, 48000.0, 2);
        }

        references.set_override(Some(-20.0));
        for _ in 0..100 {
            processor.process(&block, 48000.0, 2);
        }
        assert_abs_diff_eq!(readings.left_db(), 0.0, epsilon = 0.5);
    }

    #[test]
    fn channels_jitter_independently() {
        let (mut processor, _, _) = processor(DeviceKind::Microphone);
        let block = vec![0.1f32; 960];
        let mut differs = false;
        for _ in 0..50 {
            let reading = processor.process(&block, 48000.0, 2);
            differs |= reading.left_db != reading.right_db;
        }
        assert!(differs);
    }
}
