//! Adaptive noise/signal level estimation for the envelope stream.
//!
//! All configuration is taken in dB and converted once to linear units
//! against a full scale of 16384 (0 dB). Amplitude envelopes use the
//! 10·log10 convention, magnitude envelopes 20·log10.

use std::f32::consts::LOG2_10;

/// Time constant of the noise (low level) estimator.
pub(crate) const EST_LOW_RATIO: i32 = 1024;
/// Time constant of the signal (high level) estimator.
pub(crate) const EST_HIGH_RATIO: i32 = 64;

/// Linear level of 0 dB.
const FULL_SCALE: i32 = 16384;

/// Attenuation in 1 dB steps from +3 dB down to -33 dB, 10·log10
/// convention.
const AMP_ATTENUATION: [i32; 37] = [
    32690, 25967, 20626, 16384, 13014, 10338, 8211, 6523, 5181, 4115, 3269, 2597, 2063, 1638,
    1301, 1034, 821, 652, 518, 412, 327, 260, 206, 164, 130, 103, 82, 65, 52, 41, 33, 26, 21, 16,
    13, 10, 8,
];

/// Attenuation in 1 dB steps from +3 dB down to -33 dB, 20·log10
/// convention.
const MAG_ATTENUATION: [i32; 37] = [
    23143, 20626, 18383, 16384, 14602, 13014, 11599, 10338, 9213, 8211, 7318, 6523, 5813, 5181,
    4618, 4115, 3668, 3269, 2914, 2597, 2314, 2063, 1838, 1638, 1460, 1301, 1160, 1034, 921, 821,
    732, 652, 581, 518, 462, 412, 367,
];

/// Linear ratio for an attenuation in dB.
pub(crate) fn db_to_ratio(db: f32, use_magnitude: bool) -> f32 {
    // exp2 is measurably faster than powf here, see
    // https://docs.rs/rodio/latest/src/rodio/math.rs.html
    let scale = if use_magnitude { 0.05 } else { 0.1 };
    (db * scale * LOG2_10).exp2()
}

/// Linear level for an attenuation in dB relative to full scale.
pub fn db_to_level(db: f32, use_magnitude: bool) -> i32 {
    (FULL_SCALE as f32 * db_to_ratio(db, use_magnitude)).round() as i32
}

/// Nearest whole-dB attenuation for a linear level, clamped to the table
/// range. Diagnostics only.
pub fn level_to_db(level: i32, use_magnitude: bool) -> i32 {
    let table = if use_magnitude {
        &MAG_ATTENUATION
    }
    else {
        &AMP_ATTENUATION
    };
    for (i, entry) in table.iter().enumerate() {
        if level >= *entry {
            return 3 - i as i32;
        }
    }
    -33
}

#[derive(Clone, Copy, Debug)]
pub struct LevelConfig {
    /// The envelope carries magnitudes rather than amplitudes.
    pub use_magnitude: bool,
    /// Fixed detection threshold in dB. `None` tracks the levels
    /// adaptively.
    pub fixed_high_level: Option<f32>,
    /// Lowest value the high level estimate may take, in dB.
    pub min_high_level: f32,
    /// Distance assumed between noise and signal while idle, in dB.
    pub high_low_ratio: f32,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            use_magnitude: false,
            fixed_high_level: None,
            min_high_level: -12.1442,
            high_low_ratio: 9.0,
        }
    }
}

/// Running estimates of the noise floor and the signal level, and the
/// detection threshold derived from them.
#[derive(Clone, Copy, Debug)]
pub struct LevelEstimator {
    low: i32,
    high: i32,
    min_high: i32,
    high_low_ratio: f32,
    fixed_high: Option<i32>,
    use_magnitude: bool,
}

impl LevelEstimator {
    pub fn new(config: &LevelConfig) -> Self {
        let min_high = db_to_level(config.min_high_level, config.use_magnitude);
        Self {
            low: 0,
            high: min_high,
            min_high,
            high_low_ratio: db_to_ratio(config.high_low_ratio, config.use_magnitude),
            fixed_high: config
                .fixed_high_level
                .map(|db| db_to_level(db, config.use_magnitude)),
            use_magnitude: config.use_magnitude,
        }
    }

    /// Very slow noise tracker. The ±1 nudge counters the integer
    /// division truncating toward zero.
    pub fn update_low(&mut self, am: i32) {
        self.low += am / EST_LOW_RATIO - self.low / EST_LOW_RATIO;
        self.low += if am > self.low { 1 } else { -1 };
    }

    pub fn update_high(&mut self, am: i32) {
        self.high += am / EST_HIGH_RATIO - self.high / EST_HIGH_RATIO;
        self.high = self.high.clamp(self.min_high, FULL_SCALE);
    }

    /// While idle the high estimate is pinned to a ratio of the noise
    /// level.
    pub fn refresh_default_high(&mut self) {
        let high = (self.low as f32 * self.high_low_ratio) as i32;
        self.high = high.clamp(self.min_high, FULL_SCALE);
    }

    pub fn threshold(&self) -> i32 {
        match self.fixed_high {
            Some(fixed) => fixed,
            None => self.low + (self.high - self.low) / 2,
        }
    }

    /// ~12% of the threshold.
    pub fn hysteresis(&self) -> i32 {
        self.threshold() / 8
    }

    #[inline]
    pub fn low(&self) -> i32 {
        self.low
    }

    #[inline]
    pub fn high(&self) -> i32 {
        self.high
    }

    pub fn low_db(&self) -> i32 {
        level_to_db(self.low, self.use_magnitude)
    }

    pub fn high_db(&self) -> i32 {
        level_to_db(self.high, self.use_magnitude)
    }
}
