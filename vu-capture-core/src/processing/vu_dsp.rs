//! Interleaved float samples → calibrated VU dB per channel.
//!
//! Per block: transient pre-emphasis, block RMS, wake/reseed or 20 ms
//! exponential power smoothing, noise floor, dBFS conversion, reference
//! subtraction, cold-start wake, ballistics, clamp to the meter scale.

use crate::models::config::{MeterScale, DEFAULT_MICROPHONE_REFERENCE_DBFS, DEFAULT_MONITOR_REFERENCE_DBFS};
use crate::models::device::DeviceKind;
use crate::models::readings::VuReading;
use crate::processing::ballistics::BallisticsFilter;

/// Weight of the first-difference term: `y = x + k·(x − x[n−1])`.
pub const PRE_EMPHASIS: f32 = 0.15;

/// Block RMS above which the meter wakes / reseeds (about -54 dBFS).
pub const WAKE_THRESHOLD: f32 = 0.002;

/// Power integration time constant in seconds.
pub const POWER_TAU_SECS: f32 = 0.020;

/// Ceiling on the per-block time step in seconds.
pub const MAX_BLOCK_SECS: f32 = 0.050;

/// Smoothed RMS below this is treated as digital silence.
pub const NOISE_FLOOR: f32 = 0.001;

/// Lower bound fed to `log10`.
pub const DB_EPSILON: f32 = 1e-12;

/// Calibration input for one block, copied out before the block starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceOptions {
    /// Explicit reference that wins over everything else.
    pub override_dbfs: Option<f32>,
    pub microphone_dbfs: f32,
    pub monitor_dbfs: f32,
    pub device_kind: DeviceKind,
}

impl ReferenceOptions {
    /// Reference with the built-in per-device-type defaults.
    pub fn for_kind(device_kind: DeviceKind) -> Self {
        Self {
            override_dbfs: None,
            microphone_dbfs: DEFAULT_MICROPHONE_REFERENCE_DBFS,
            monitor_dbfs: DEFAULT_MONITOR_REFERENCE_DBFS,
            device_kind,
        }
    }

    /// The dBFS level that maps to 0 VU.
    pub fn effective_dbfs(&self) -> f32 {
        if let Some(value) = self.override_dbfs {
            return value;
        }
        match self.device_kind {
            DeviceKind::Microphone => self.microphone_dbfs,
            DeviceKind::SystemOutput => self.monitor_dbfs,
        }
    }
}

impl Default for ReferenceOptions {
    fn default() -> Self {
        Self::for_kind(DeviceKind::SystemOutput)
    }
}

/// Scratch state carried between blocks of one capture session.
///
/// One instance per session: recreating it per block loses the integration
/// history and the wake flag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DspState {
    pub previous_left: f32,
    pub previous_right: f32,
    pub smoothed_power_left: f32,
    pub smoothed_power_right: f32,
    pub meter_awake: bool,
}

/// Runs one block through the DSP chain and the two ballistics filters.
///
/// `samples` is interleaved with `channels` samples per frame; a trailing
/// partial frame is ignored. Mono input drives both channels.
#[allow(clippy::too_many_arguments)]
pub fn process_block(
    samples: &[f32],
    channels: usize,
    sample_rate: f32,
    reference: &ReferenceOptions,
    ballistics_left: &mut BallisticsFilter,
    ballistics_right: &mut BallisticsFilter,
    state: &mut DspState,
    scale: MeterScale,
) -> VuReading {
    let frames = if channels == 0 { 0 } else { samples.len() / channels };
    if frames == 0 || !(sample_rate > 0.0) || !sample_rate.is_finite() {
        return VuReading {
            left_db: scale.min_vu,
            right_db: scale.min_vu,
        };
    }

    let mut sum_left = 0.0f64;
    let mut sum_right = 0.0f64;
    for frame in samples.chunks_exact(channels) {
        let raw_left = finite_or_silence(frame[0]);
        let raw_right = if channels > 1 {
            finite_or_silence(frame[1])
        } else {
            raw_left
        };

        let left = raw_left + PRE_EMPHASIS * (raw_left - state.previous_left);
        let right = raw_right + PRE_EMPHASIS * (raw_right - state.previous_right);
        state.previous_left = raw_left;
        state.previous_right = raw_right;

        sum_left += f64::from(left) * f64::from(left);
        sum_right += f64::from(right) * f64::from(right);
    }

    let block_rms_left = ((sum_left / frames as f64) as f32).sqrt();
    let block_rms_right = ((sum_right / frames as f64) as f32).sqrt();

    let dt = (frames as f32 / sample_rate).min(MAX_BLOCK_SECS);
    let alpha = (-dt / POWER_TAU_SECS).exp();

    state.smoothed_power_left = integrate_power(state.smoothed_power_left, block_rms_left, alpha);
    state.smoothed_power_right = integrate_power(state.smoothed_power_right, block_rms_right, alpha);

    let rms_left = gate(state.smoothed_power_left.sqrt());
    let rms_right = gate(state.smoothed_power_right.sqrt());

    let reference_dbfs = reference.effective_dbfs();
    let target_left = to_dbfs(rms_left) - reference_dbfs;
    let target_right = to_dbfs(rms_right) - reference_dbfs;

    if !state.meter_awake && (rms_left > WAKE_THRESHOLD || rms_right > WAKE_THRESHOLD) {
        ballistics_left.reset(target_left);
        ballistics_right.reset(target_right);
        state.meter_awake = true;
    }

    let left_db = ballistics_left.process(target_left, dt);
    let right_db = ballistics_right.process(target_right, dt);

    VuReading {
        left_db: scale.clamp(left_db),
        right_db: scale.clamp(right_db),
    }
}

/// Reseeds from the block power when loud, otherwise smooths toward it.
fn integrate_power(smoothed: f32, block_rms: f32, alpha: f32) -> f32 {
    let block_power = block_rms * block_rms;
    if block_rms > WAKE_THRESHOLD {
        block_power
    } else {
        alpha * smoothed + (1.0 - alpha) * block_power
    }
}

/// Non-finite samples from a faulty device count as silence.
fn finite_or_silence(sample: f32) -> f32 {
    if sample.is_finite() {
        sample
    } else {
        0.0
    }
}

fn gate(rms: f32) -> f32 {
    if rms < NOISE_FLOOR {
        0.0
    } else {
        rms
    }
}

/// `20·log10(max(x, ε))`.
pub fn to_dbfs(rms: f32) -> f32 {
    20.0 * rms.max(DB_EPSILON).log10()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::ballistics::BallisticsConfig;
    use approx::assert_abs_diff_eq;
    use std::f32::consts::{PI, SQRT_2};

    const RATE: f32 = 48_000.0;
    const FRAMES: usize = 480;

    struct Rig {
        left: BallisticsFilter,
        right: BallisticsFilter,
        state: DspState,
        scale: MeterScale,
        reference: ReferenceOptions,
    }

    impl Rig {
        fn new(kind: DeviceKind) -> Self {
            let scale = MeterScale::default();
            Self {
                left: BallisticsFilter::new(scale.min_vu).with_travel(scale.min_vu, scale.max_vu),
                right: BallisticsFilter::new(scale.min_vu)
                    .with_travel(scale.min_vu, scale.max_vu)
                    .with_seed(7),
                state: DspState::default(),
                scale,
                reference: ReferenceOptions::for_kind(kind),
            }
        }

        fn feed(&mut self, block: &[f32], channels: usize) -> VuReading {
            process_block(
                block,
                channels,
                RATE,
                &self.reference,
                &mut self.left,
                &mut self.right,
                &mut self.state,
                self.scale,
            )
        }

        /// Feeds `secs` of 10 ms blocks produced by `make`, returning every reading.
        fn run(&mut self, secs: f32, mut make: impl FnMut(usize) -> Vec<f32>) -> Vec<VuReading> {
            let blocks = (secs / (FRAMES as f32 / RATE)).round() as usize;
            (0..blocks).map(|i| self.feed(&make(i), 2)).collect()
        }
    }

    fn constant(value: f32) -> Vec<f32> {
        vec![value; FRAMES * 2]
    }

    fn sine(block_index: usize, amplitude: f32, freq: f32) -> Vec<f32> {
        let mut out = Vec::with_capacity(FRAMES * 2);
        for i in 0..FRAMES {
            let n = (block_index * FRAMES + i) as f32;
            let v = amplitude * (2.0 * PI * freq * n / RATE).sin();
            out.push(v);
            out.push(v);
        }
        out
    }

    #[test]
    fn degenerate_input_yields_floor_without_touching_state() {
        let mut rig = Rig::new(DeviceKind::Microphone);
        rig.state.previous_left = 0.3;

        let floor = VuReading {
            left_db: -96.0,
            right_db: -96.0,
        };
        assert_eq!(rig.feed(&[], 2), floor);
        assert_eq!(rig.feed(&[0.5, 0.5], 0), floor);
        let reading = process_block(
            &[0.5, 0.5],
            2,
            0.0,
            &rig.reference,
            &mut rig.left,
            &mut rig.right,
            &mut rig.state,
            rig.scale,
        );
        assert_eq!(reading, floor);
        assert_eq!(rig.state.previous_left, 0.3);
        assert!(!rig.state.meter_awake);
    }

    #[test]
    fn silence_stays_at_floor_and_never_wakes() {
        let mut rig = Rig::new(DeviceKind::SystemOutput);
        let readings = rig.run(1.0, |_| constant(0.0));

        for reading in readings {
            assert_eq!(reading.left_db, -96.0);
            assert_eq!(reading.right_db, -96.0);
        }
        assert!(!rig.state.meter_awake);
    }

    #[test]
    fn sub_floor_noise_is_gated_to_silence() {
        let mut rig = Rig::new(DeviceKind::Microphone);
        let readings = rig.run(0.5, |_| constant(0.0005));

        assert_eq!(readings.last().unwrap().left_db, -96.0);
        assert!(!rig.state.meter_awake);
    }

    #[test]
    fn constant_tenth_amplitude_as_microphone_reads_minus_20_vu() {
        let mut rig = Rig::new(DeviceKind::Microphone);
        let readings = rig.run(2.0, |_| constant(0.1));

        let last = readings.last().unwrap();
        assert_abs_diff_eq!(last.left_db, -20.0, epsilon = 0.5);
        assert_abs_diff_eq!(last.right_db, -20.0, epsilon = 0.5);
        assert!(readings.iter().all(|r| r.left_db <= 6.0 && r.right_db <= 6.0));
        assert!(rig.state.meter_awake);
    }

    #[test]
    fn zero_dbfs_sine_converges_to_zero_vu_for_microphone() {
        let mut rig = Rig::new(DeviceKind::Microphone);
        let readings = rig.run(2.0, |i| sine(i, SQRT_2, 100.0));

        let last = readings.last().unwrap();
        assert_abs_diff_eq!(last.left_db, 0.0, epsilon = 0.1);
        assert_abs_diff_eq!(last.right_db, 0.0, epsilon = 0.1);
    }

    #[test]
    fn zero_dbfs_sine_as_system_output_pins_at_ceiling() {
        let mut rig = Rig::new(DeviceKind::SystemOutput);
        let readings = rig.run(2.0, |i| sine(i, SQRT_2, 100.0));

        assert!(readings.iter().all(|r| r.left_db <= 6.0));
        assert_eq!(readings.last().unwrap().left_db, 6.0);

        // Unclamped the target would be +14 VU.
        rig.scale = MeterScale::new(-96.0, 20.0);
        rig.left = BallisticsFilter::with_config(0.0, BallisticsConfig::default().without_jitter());
        let readings = rig.run(2.0, |i| sine(i + 200, SQRT_2, 100.0));
        assert_abs_diff_eq!(readings.last().unwrap().left_db, 14.0, epsilon = 0.1);
    }

    #[test]
    fn override_wins_over_device_type() {
        let mut reference = ReferenceOptions::for_kind(DeviceKind::Microphone);
        assert_eq!(reference.effective_dbfs(), 0.0);

        reference.device_kind = DeviceKind::SystemOutput;
        assert_eq!(reference.effective_dbfs(), -14.0);

        reference.override_dbfs = Some(-18.0);
        assert_eq!(reference.effective_dbfs(), -18.0);
    }

    #[test]
    fn wake_snaps_needle_instead_of_crawling() {
        let mut rig = Rig::new(DeviceKind::Microphone);
        rig.run(0.3, |_| constant(0.0));

        let first = rig.feed(&constant(0.1), 2);
        assert!(rig.state.meter_awake);
        // Block 1 includes the pre-emphasis kick of the leading edge.
        assert!(first.left_db > -21.0 && first.left_db < -18.0, "got {}", first.left_db);
    }

    #[test]
    fn quiet_signal_rises_through_smoothing_only() {
        let mut rig = Rig::new(DeviceKind::Microphone);
        // 0.0015 sits between the noise floor and the wake threshold.
        let readings = rig.run(1.0, |_| constant(0.0015));

        assert!(!rig.state.meter_awake);
        assert_eq!(readings[0].left_db, -96.0);
        let expected = to_dbfs(0.0015);
        assert_abs_diff_eq!(readings.last().unwrap().left_db, expected, epsilon = 0.5);
    }

    #[test]
    fn mono_input_mirrors_to_right_channel() {
        let mut rig = Rig::new(DeviceKind::Microphone);
        let mono = vec![0.1f32; FRAMES];
        let mut last = rig.feed(&mono, 1);
        for _ in 0..100 {
            last = rig.feed(&mono, 1);
        }
        assert_abs_diff_eq!(last.left_db, last.right_db, epsilon = 0.1);
        assert_abs_diff_eq!(rig.state.smoothed_power_left, rig.state.smoothed_power_right);
    }

    #[test]
    fn channels_are_independent() {
        let mut rig = Rig::new(DeviceKind::Microphone);
        let readings = rig.run(1.0, |_| {
            let mut block = Vec::with_capacity(FRAMES * 2);
            for _ in 0..FRAMES {
                block.push(0.1);
                block.push(0.0);
            }
            block
        });

        let last = readings.last().unwrap();
        assert_abs_diff_eq!(last.left_db, -20.0, epsilon = 0.5);
        assert_eq!(last.right_db, -96.0);
    }

    #[test]
    fn long_blocks_are_clamped_to_max_step() {
        let mut rig = Rig::new(DeviceKind::Microphone);
        rig.feed(&constant(0.1), 2);
        rig.feed(&vec![0.0; 48_000 * 2], 2);

        // A full second of silence integrates as 50 ms, so power is not gone.
        let expected = 0.01 * (-MAX_BLOCK_SECS / POWER_TAU_SECS).exp();
        assert_abs_diff_eq!(rig.state.smoothed_power_left, expected, epsilon = 1e-4);
    }

    #[test]
    fn non_finite_samples_do_not_poison_the_channel() {
        let mut rig = Rig::new(DeviceKind::Microphone);
        let mut bad = constant(0.0015);
        bad[0] = f32::NAN;
        bad[2] = f32::INFINITY;
        let first = rig.feed(&bad, 2);

        assert!(first.left_db.is_finite());
        assert!(rig.state.smoothed_power_left.is_finite());
        assert!(rig.state.previous_left.is_finite());

        let readings = rig.run(2.0, |_| constant(0.0015));
        let last = readings.last().unwrap();
        let expected = to_dbfs(0.0015);
        assert_abs_diff_eq!(last.left_db, expected, epsilon = 0.5);
        assert_abs_diff_eq!(last.left_db, last.right_db, epsilon = 0.2);
    }

    #[test]
    fn dbfs_conversion_has_epsilon_floor() {
        assert_abs_diff_eq!(to_dbfs(1.0), 0.0);
        assert_abs_diff_eq!(to_dbfs(0.1), -20.0, epsilon = 1e-4);
        assert_abs_diff_eq!(to_dbfs(0.0), -240.0, epsilon = 1e-3);
    }
}
