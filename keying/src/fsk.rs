//! Tone classification for the instantaneous-frequency stream.
//!
//! Runs nested inside the envelope state machine, and only while the
//! first envelope pulse of a candidate package is still open. Two
//! interchangeable trackers classify the stream into high-tone pulses and
//! low-tone gaps using the same storage discipline as the envelope
//! demodulator.

use crate::{
    detect::MIN_PULSE_SAMPLES,
    train::PulseTrain,
};

/// Tone separation assumed before both estimates are primed.
const DEFAULT_FM_DELTA: i32 = 6000;
/// Estimator rate while moving away from the band center.
const EST_FAST: i32 = 16;
/// Estimator rate while moving back toward the band center.
const EST_SLOW: i32 = 64;
/// Tracker slew per sample for the min/max variant.
const TRACK_STEP: i32 = 10;
/// Samples ignored while the min/max trackers frame the signal.
const SETTLE_SAMPLES: u32 = 40;

/// Selects the tone tracking algorithm for the next package.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FskMode {
    /// Frequency tracking with per-tone moving averages.
    Classic,
    /// Min/max envelope tracking around a running midpoint.
    #[default]
    MinMax,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ToneState {
    Init,
    ToneHigh,
    ToneLow,
    Error,
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum FskDemod {
    Classic(ClassicFsk),
    MinMax(MinMaxFsk),
}

impl FskDemod {
    pub fn new(mode: FskMode) -> Self {
        match mode {
            FskMode::Classic => Self::Classic(ClassicFsk::default()),
            FskMode::MinMax => Self::MinMax(MinMaxFsk::default()),
        }
    }

    pub fn feed(&mut self, fm: i16, out: &mut PulseTrain) {
        match self {
            Self::Classic(demod) => demod.feed(i32::from(fm), out),
            Self::MinMax(demod) => demod.feed(i32::from(fm), out),
        }
    }

    /// Flushes the in-progress run as the final stored pulse or gap.
    pub fn wrap_up(&mut self, out: &mut PulseTrain) {
        let (state, pulse_length) = match self {
            Self::Classic(demod) => (demod.state, demod.pulse_length),
            Self::MinMax(demod) => (demod.state, demod.pulse_length),
        };

        if out.is_full() {
            return;
        }

        match state {
            ToneState::ToneHigh => {
                out.push_pulse(pulse_length + 1);
                out.push_gap(0);
            }
            ToneState::ToneLow => {
                out.push_gap(pulse_length + 1);
            }
            ToneState::Init | ToneState::Error => {
                tracing::debug!(?state, "nothing to wrap up");
            }
        }
    }

    /// Current (upper, lower) tone estimates.
    pub fn estimates(&self) -> (i32, i32) {
        match self {
            Self::Classic(demod) => (demod.f1_est, demod.f2_est),
            Self::MinMax(demod) => (demod.var_max, demod.var_min),
        }
    }
}

/// Tracks one moving average per tone and switches whenever the current
/// sample is closer to the other tone's estimate.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ClassicFsk {
    state: ToneState,
    pulse_length: u32,
    f1_est: i32,
    f2_est: i32,
}

impl Default for ClassicFsk {
    fn default() -> Self {
        Self {
            state: ToneState::Init,
            pulse_length: 0,
            f1_est: 0,
            f2_est: 0,
        }
    }
}

impl ClassicFsk {
    fn feed(&mut self, fm: i32, out: &mut PulseTrain) {
        self.pulse_length = self.pulse_length.saturating_add(1);

        match self.state {
            ToneState::Init => {
                // quick initial estimate
                self.f1_est = self.f1_est / 2 + fm / 2;

                if (fm - self.f1_est).abs() > DEFAULT_FM_DELTA / 2 {
                    if fm > self.f1_est {
                        // what we averaged so far was the low tone
                        out.push_pulse(0);
                        out.push_gap(self.pulse_length);
                        self.f2_est = self.f1_est;
                        self.f1_est = fm;
                        self.pulse_length = 0;
                        self.state = ToneState::ToneHigh;
                    }
                    else {
                        out.push_pulse(self.pulse_length);
                        self.f2_est = fm;
                        self.pulse_length = 0;
                        self.state = ToneState::ToneLow;
                    }
                }
            }
            ToneState::ToneHigh => {
                let f1_delta = (fm - self.f1_est).abs();
                let f2_delta = (fm - self.f2_est).abs();

                if f2_delta < f1_delta {
                    if self.pulse_length >= MIN_PULSE_SAMPLES {
                        if out.is_full() {
                            tracing::debug!("tone buffer full");
                            self.state = ToneState::Error;
                            return;
                        }
                        out.push_pulse(self.pulse_length);
                        self.pulse_length = 0;
                        self.state = ToneState::ToneLow;
                    }
                    else if let Some(gap) = out.pop_last_gap() {
                        // too short to be a pulse, fold it into the
                        // previous gap
                        self.pulse_length += gap;
                        self.state = ToneState::ToneLow;
                    }
                    else {
                        self.state = ToneState::Init;
                    }
                }
                else if fm > self.f1_est {
                    self.f1_est += fm / EST_FAST - self.f1_est / EST_FAST;
                }
                else {
                    self.f1_est += fm / EST_SLOW - self.f1_est / EST_SLOW;
                }
            }
            ToneState::ToneLow => {
                let f1_delta = (fm - self.f1_est).abs();
                let f2_delta = (fm - self.f2_est).abs();

                if f1_delta < f2_delta {
                    if self.pulse_length >= MIN_PULSE_SAMPLES {
                        out.push_gap(self.pulse_length);
                        self.pulse_length = 0;
                        self.state = ToneState::ToneHigh;
                    }
                    else if let Some(pulse) = out.pop_pending_pulse() {
                        // too short to be a gap, fold it into the
                        // previous pulse
                        self.pulse_length += pulse;
                        self.state = ToneState::ToneHigh;
                    }
                    else {
                        self.state = ToneState::Init;
                    }
                }
                else if fm < self.f2_est {
                    self.f2_est += fm / EST_FAST - self.f2_est / EST_FAST;
                }
                else {
                    self.f2_est += fm / EST_SLOW - self.f2_est / EST_SLOW;
                }
            }
            ToneState::Error => {}
        }
    }
}

/// Tracks the extremes of the frequency swing and classifies against
/// their midpoint. No hysteresis and no spurious suppression of its own;
/// the enclosing envelope machine provides the robustness.
#[derive(Clone, Copy, Debug)]
pub(crate) struct MinMaxFsk {
    state: ToneState,
    pulse_length: u32,
    var_max: i32,
    var_min: i32,
    skip_samples: u32,
}

impl Default for MinMaxFsk {
    fn default() -> Self {
        Self {
            state: ToneState::Init,
            pulse_length: 0,
            var_max: 0,
            var_min: 0,
            skip_samples: SETTLE_SAMPLES,
        }
    }
}

impl MinMaxFsk {
    fn feed(&mut self, fm: i32, out: &mut PulseTrain) {
        // let the trackers frame the signal before trusting them
        if self.skip_samples > 0 {
            self.skip_samples -= 1;
            return;
        }

        let mid = (self.var_max + self.var_min) / 2;
        if fm > mid {
            if fm > self.var_max {
                self.var_max += TRACK_STEP;
            }
            else {
                self.var_max -= TRACK_STEP;
            }
        }
        else if fm < self.var_min {
            self.var_min -= TRACK_STEP;
        }
        else {
            self.var_min += TRACK_STEP;
        }

        let high = fm > mid;
        self.pulse_length = self.pulse_length.saturating_add(1);

        match self.state {
            ToneState::Init => {
                if high {
                    self.state = ToneState::ToneHigh;
                }
                else {
                    // leading low run, keep the arrays paired
                    out.push_pulse(0);
                    self.state = ToneState::ToneLow;
                }
            }
            ToneState::ToneHigh if !high => {
                if out.is_full() {
                    tracing::debug!("tone buffer full");
                    self.state = ToneState::Error;
                    return;
                }
                out.push_pulse(self.pulse_length);
                self.pulse_length = 0;
                self.state = ToneState::ToneLow;
            }
            ToneState::ToneLow if high => {
                out.push_gap(self.pulse_length);
                self.pulse_length = 0;
                self.state = ToneState::ToneHigh;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        FskDemod,
        FskMode,
        SETTLE_SAMPLES,
    };
    use crate::train::PulseTrain;

    fn feed(demod: &mut FskDemod, train: &mut PulseTrain, value: i16, count: usize) {
        for _ in 0..count {
            demod.feed(value, train);
        }
    }

    #[test]
    fn minmax_classifies_alternating_runs() {
        let mut demod = FskDemod::new(FskMode::MinMax);
        let mut train = PulseTrain::new();

        feed(&mut demod, &mut train, 1000, SETTLE_SAMPLES as usize);
        for _ in 0..5 {
            feed(&mut demod, &mut train, 1000, 100);
            feed(&mut demod, &mut train, -1000, 150);
        }
        demod.wrap_up(&mut train);

        assert_eq!(train.num_pulses(), 5);
        // the run boundary sample is charged to the run it ends
        assert_eq!(train.pulses(), &[101, 100, 100, 100, 100]);
        assert_eq!(train.gaps(), &[150, 150, 150, 150, 150]);

        let (upper, lower) = demod.estimates();
        assert!(upper > 900);
        assert!(lower < -900);
    }

    #[test]
    fn classic_tracks_two_tones() {
        let mut demod = FskDemod::new(FskMode::Classic);
        let mut train = PulseTrain::new();

        for _ in 0..6 {
            feed(&mut demod, &mut train, 4000, 50);
            feed(&mut demod, &mut train, -4000, 40);
        }
        demod.wrap_up(&mut train);

        assert_eq!(train.num_pulses(), 6);
        assert_eq!(train.pulses(), &[51, 50, 50, 50, 50, 50]);
        assert_eq!(train.gaps(), &[40, 40, 40, 40, 40, 40]);

        let (f1, f2) = demod.estimates();
        assert!(f1 > 3000);
        assert!(f2 < -3000);
    }

    #[test]
    fn classic_merges_spurious_runs() {
        let mut demod = FskDemod::new(FskMode::Classic);
        let mut train = PulseTrain::new();

        feed(&mut demod, &mut train, 4000, 50);
        feed(&mut demod, &mut train, -4000, 40);
        // a high run interrupted by a 5 sample blip of the other tone
        feed(&mut demod, &mut train, 4000, 50);
        feed(&mut demod, &mut train, -4000, 5);
        feed(&mut demod, &mut train, 4000, 45);
        feed(&mut demod, &mut train, -4000, 40);
        demod.wrap_up(&mut train);

        // the blip is absorbed instead of splitting the run
        assert_eq!(train.pulses(), &[51, 100]);
        assert_eq!(train.gaps(), &[40, 40]);
    }

    #[test]
    fn classic_emits_placeholder_for_leading_low_tone() {
        let mut demod = FskDemod::new(FskMode::Classic);
        let mut train = PulseTrain::new();

        feed(&mut demod, &mut train, -4000, 30);
        feed(&mut demod, &mut train, 4000, 30);
        demod.wrap_up(&mut train);

        assert_eq!(train.pulses(), &[0, 30]);
        assert_eq!(train.gaps(), &[31, 0]);
    }
}
