/// Mechanical response of an analog VU movement.
///
/// The needle is modelled as a damped spring-mass system driven toward the
/// target loudness (in VU dB):
///
/// ```text
/// x'' = ωn² · (target − x) − 2ζ·ωn · x'
/// ```
///
/// With the default constants a step reaches 99 % of its size in about
/// 300 ms and overshoots by about 1.1 % before settling. Falling uses a lower
/// natural frequency than rising, so decay is slightly slower than attack.
/// A low-passed pseudo-random "life" component of a few hundredths of a dB is
/// added on top of the settled position, except while the needle rests on
/// one of its stops.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallisticsConfig {
    /// Natural frequency (rad/s) while moving up toward the target.
    pub rise_natural_freq: f32,
    /// Natural frequency (rad/s) while falling back toward the target.
    pub fall_natural_freq: f32,
    /// Damping ratio ζ. Below 1.0 gives the characteristic overshoot.
    pub damping: f32,
    /// Peak amplitude of the jitter component in dB (0 disables it).
    pub jitter_db: f32,
    /// Correlation time of the jitter low-pass, in seconds.
    pub jitter_correlation_secs: f32,
    /// Largest integration step; longer `dt` values are subdivided.
    pub max_substep_secs: f32,
}

impl BallisticsConfig {
    /// Same movement without the jitter component.
    pub fn without_jitter(self) -> Self {
        Self { jitter_db: 0.0, ..self }
    }
}

impl Default for BallisticsConfig {
    fn default() -> Self {
        Self {
            rise_natural_freq: 14.0,
            fall_natural_freq: 12.0,
            damping: 0.815,
            jitter_db: 0.03,
            jitter_correlation_secs: 0.08,
            max_substep_secs: 0.001,
        }
    }
}

/// Longest `dt` a single `process` call integrates over.
const MAX_STEP_SECS: f32 = 0.5;

const DEFAULT_SEED: u32 = 0x9E37_79B9;

/// Per-channel ballistics state.
///
/// Purely a function of its own prior state, the new target and `dt`.
#[derive(Debug, Clone)]
pub struct BallisticsFilter {
    config: BallisticsConfig,
    position: f32,
    velocity: f32,
    jitter: f32,
    displayed: f32,
    rng: u32,
    travel: Option<(f32, f32)>,
}

impl BallisticsFilter {
    /// Creates a filter resting at `initial` with the default movement.
    pub fn new(initial: f32) -> Self {
        Self::with_config(initial, BallisticsConfig::default())
    }

    pub fn with_config(initial: f32, config: BallisticsConfig) -> Self {
        Self {
            config,
            position: initial,
            velocity: 0.0,
            jitter: 0.0,
            displayed: initial,
            rng: DEFAULT_SEED,
            travel: None,
        }
    }

    /// Limits needle travel to `[min, max]`, like the stop pins of a dial.
    ///
    /// Hitting a stop kills the velocity component pushing into it.
    pub fn with_travel(mut self, min: f32, max: f32) -> Self {
        self.travel = Some((min.min(max), max.max(min)));
        self
    }

    /// Seeds the jitter generator so channels do not move in lockstep.
    pub fn with_seed(mut self, seed: u32) -> Self {
        self.rng = if seed == 0 { DEFAULT_SEED } else { seed };
        self
    }

    /// Last displayed value.
    pub fn value(&self) -> f32 {
        self.displayed
    }

    /// Discards the integration history and snaps the needle to `value`.
    pub fn reset(&mut self, value: f32) {
        self.position = value;
        self.velocity = 0.0;
        self.jitter = 0.0;
        self.displayed = value;
    }

    /// Advances the movement by `dt` seconds toward `target`.
    pub fn process(&mut self, target: f32, dt: f32) -> f32 {
        if !target.is_finite() || !dt.is_finite() || dt <= 0.0 {
            return self.displayed;
        }

        let dt = dt.min(MAX_STEP_SECS);
        let substep = self.config.max_substep_secs.max(1e-5);
        let steps = (dt / substep).ceil().max(1.0) as u32;
        let h = dt / steps as f32;
        let zeta = self.config.damping;

        for _ in 0..steps {
            let wn = if target >= self.position {
                self.config.rise_natural_freq
            } else {
                self.config.fall_natural_freq
            };
            let accel = wn * wn * (target - self.position) - 2.0 * zeta * wn * self.velocity;
            self.velocity += accel * h;
            self.position += self.velocity * h;
            self.apply_stops();
        }

        self.advance_jitter(dt);

        let mut displayed = self.position + self.jitter;
        if let Some((min, max)) = self.travel {
            displayed = displayed.clamp(min, max);
        }
        self.displayed = displayed;
        displayed
    }

    fn apply_stops(&mut self) {
        let Some((min, max)) = self.travel else {
            return;
        };
        if self.position <= min {
            self.position = min;
            self.velocity = self.velocity.max(0.0);
        } else if self.position >= max {
            self.position = max;
            self.velocity = self.velocity.min(0.0);
        }
    }

    fn resting_on_stop(&self) -> bool {
        matches!(self.travel, Some((min, max)) if self.position <= min || self.position >= max)
    }

    fn advance_jitter(&mut self, dt: f32) {
        if self.config.jitter_db <= 0.0 || self.resting_on_stop() {
            self.jitter = 0.0;
            return;
        }
        let alpha = (-dt / self.config.jitter_correlation_secs.max(1e-3)).exp();
        let noise = self.next_noise() * self.config.jitter_db;
        self.jitter = alpha * self.jitter + (1.0 - alpha) * noise;
    }

    /// xorshift32 mapped to [-1, 1].
    fn next_noise(&mut self) -> f32 {
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.rng = x;
        (x as f32 / u32::MAX as f32) * 2.0 - 1.0
    }
}
