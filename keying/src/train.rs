use arrayvec::ArrayVec;

use crate::{
    detect::MAX_PULSES,
    level::EST_HIGH_RATIO,
};

/// One detected transmission as a sequence of mark/space widths.
///
/// Pulse and gap widths are sample counts stored in parallel arrays with a
/// fixed capacity of [`MAX_PULSES`] pairs. A train is cleared when the
/// detector opens a new package and is only valid for reading once the
/// detector has signalled completion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PulseTrain {
    offset: u64,
    sample_rate: u32,
    start_ago: u32,
    end_ago: u32,
    pulse: ArrayVec<u32, MAX_PULSES>,
    gap: ArrayVec<u32, MAX_PULSES>,
    ook_low_estimate: i32,
    ook_high_estimate: i32,
    fsk_f1_est: i32,
    fsk_f2_est: i32,
}

impl PulseTrain {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Absolute sample position of the package start.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples between the package start and the end of the chunk it
    /// started in.
    #[inline]
    pub fn start_ago(&self) -> u32 {
        self.start_ago
    }

    /// Samples between the package end and the end of the chunk it ended
    /// in.
    #[inline]
    pub fn end_ago(&self) -> u32 {
        self.end_ago
    }

    /// Number of completed pulse/gap pairs.
    #[inline]
    pub fn num_pulses(&self) -> usize {
        self.gap.len()
    }

    #[inline]
    pub fn pulses(&self) -> &[u32] {
        &self.pulse
    }

    #[inline]
    pub fn gaps(&self) -> &[u32] {
        &self.gap
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pulse.is_empty() && self.gap.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.gap.len() >= MAX_PULSES
    }

    /// Noise level estimate at package end, in linear units.
    #[inline]
    pub fn ook_low_estimate(&self) -> i32 {
        self.ook_low_estimate
    }

    /// Signal level estimate at package end, in linear units.
    #[inline]
    pub fn ook_high_estimate(&self) -> i32 {
        self.ook_high_estimate
    }

    /// Carrier (or upper tone) frequency estimate, full scale `i16`.
    #[inline]
    pub fn fsk_f1_est(&self) -> i32 {
        self.fsk_f1_est
    }

    /// Lower tone frequency estimate, full scale `i16`.
    #[inline]
    pub fn fsk_f2_est(&self) -> i32 {
        self.fsk_f2_est
    }

    /// Carrier/tone offset in Hz relative to the capture center.
    ///
    /// Instantaneous-frequency full scale maps to half the sample rate.
    pub fn f1_hz(&self) -> f32 {
        self.fsk_f1_est as f32 / 32768.0 * self.sample_rate as f32 / 2.0
    }

    pub fn f2_hz(&self) -> f32 {
        self.fsk_f2_est as f32 / 32768.0 * self.sample_rate as f32 / 2.0
    }

    pub(crate) fn start(&mut self, offset: u64, sample_rate: u32, start_ago: u32) {
        self.pulse.clear();
        self.gap.clear();
        self.offset = offset;
        self.sample_rate = sample_rate;
        self.start_ago = start_ago;
        self.end_ago = 0;
        self.ook_low_estimate = 0;
        self.ook_high_estimate = 0;
        self.fsk_f1_est = 0;
        self.fsk_f2_est = 0;
    }

    pub(crate) fn push_pulse(&mut self, width: u32) {
        let _ = self.pulse.try_push(width);
    }

    pub(crate) fn push_gap(&mut self, width: u32) {
        let _ = self.gap.try_push(width);
    }

    /// Removes a stored pulse that has no matching gap yet.
    pub(crate) fn pop_pending_pulse(&mut self) -> Option<u32> {
        if self.pulse.len() > self.gap.len() {
            self.pulse.pop()
        }
        else {
            None
        }
    }

    /// Removes the most recent gap, but only if it completed a pair.
    pub(crate) fn pop_last_gap(&mut self) -> Option<u32> {
        if self.pulse.len() == self.gap.len() {
            self.gap.pop()
        }
        else {
            None
        }
    }

    /// Slow average of the instantaneous frequency while the carrier is on.
    pub(crate) fn track_carrier(&mut self, fm: i32) {
        self.fsk_f1_est += fm / EST_HIGH_RATIO - self.fsk_f1_est / EST_HIGH_RATIO;
    }

    pub(crate) fn set_levels(&mut self, low: i32, high: i32) {
        self.ook_low_estimate = low;
        self.ook_high_estimate = high;
    }

    pub(crate) fn set_tone_estimates(&mut self, f1: i32, f2: i32) {
        self.fsk_f1_est = f1;
        self.fsk_f2_est = f2;
    }

    pub(crate) fn set_end_ago(&mut self, end_ago: u32) {
        self.end_ago = end_ago;
    }
}
