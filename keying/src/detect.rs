//! Envelope pulse detection.
//!
//! A resumable, sample-by-sample state machine that classifies an
//! envelope stream into ON/OFF intervals and, for the first pulse of
//! every candidate package, lets the nested tone tracker decide whether
//! the package is frequency keyed instead.

use crate::{
    fsk::{
        FskDemod,
        FskMode,
    },
    level::{
        LevelConfig,
        LevelEstimator,
    },
    train::PulseTrain,
};

/// Hard cap on stored pulse/gap pairs per package.
pub const MAX_PULSES: usize = 1200;
/// Pulses and gaps shorter than this are spurious.
pub const MIN_PULSE_SAMPLES: u32 = 10;
/// Tone pairs required before a package is classified as FSK.
pub(crate) const MIN_FSK_PULSES: usize = 16;

/// Lower bound on the gap that ends a package.
const MIN_GAP_MS: u32 = 10;
/// A gap this long always ends the package.
const MAX_GAP_MS: u32 = 100;
/// A gap this many times the longest pulse ends the package.
const MAX_GAP_RATIO: u32 = 10;
/// One noise-estimator time constant of settling before detection is
/// trusted.
const LEAD_IN_SAMPLES: u32 = 1024;

/// Which output buffer holds a completed package.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PackageKind {
    Ook,
    Fsk,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OokState {
    Idle,
    Pulse,
    GapStart,
    Gap { spurious_end: bool },
}

/// Streaming OOK/FSK pulse detector.
///
/// One instance per logical sample stream. Feed successive chunks of the
/// stream to [`detect`](Self::detect); pulses and gaps may span chunk
/// boundaries and survive exactly.
#[derive(Clone, Debug)]
pub struct PulseDetector {
    levels: LevelEstimator,
    state: OokState,
    pulse_length: u32,
    max_pulse: u32,
    data_counter: usize,
    lead_in_counter: u32,
    fsk: FskDemod,
}

impl PulseDetector {
    pub fn new(config: LevelConfig) -> Self {
        Self {
            levels: LevelEstimator::new(&config),
            state: OokState::Idle,
            pulse_length: 0,
            max_pulse: 0,
            data_counter: 0,
            lead_in_counter: 0,
            fsk: FskDemod::new(FskMode::default()),
        }
    }

    /// Current level estimates, mostly useful for diagnostics.
    pub fn levels(&self) -> &LevelEstimator {
        &self.levels
    }

    /// Classifies one chunk of matched envelope and instantaneous
    /// frequency samples.
    ///
    /// Returns `None` once the chunk is fully consumed; call again with
    /// the next chunk, internal state carries over. Returns
    /// `Some(kind)` as soon as a package is complete in the
    /// corresponding output buffer; call again with the *same* chunk
    /// (and the same `stream_offset`) to keep scanning the remainder.
    ///
    /// `stream_offset` is the absolute position of the chunk start and
    /// only used to stamp package offsets.
    pub fn detect(
        &mut self,
        envelope: &[i16],
        fm: &[i16],
        sample_rate: u32,
        stream_offset: u64,
        fsk_mode: FskMode,
        ook_out: &mut PulseTrain,
        fsk_out: &mut PulseTrain,
    ) -> Option<PackageKind> {
        debug_assert_eq!(envelope.len(), fm.len());
        let len = envelope.len().min(fm.len());
        let samples_per_ms = sample_rate / 1000;

        while self.data_counter < len {
            let n = self.data_counter;
            let am = i32::from(envelope[n]);
            let fm_n = fm[n];
            let threshold = self.levels.threshold();
            let hysteresis = self.levels.hysteresis();

            match self.state {
                OokState::Idle => {
                    if am > threshold + hysteresis && self.lead_in_counter >= LEAD_IN_SAMPLES {
                        ook_out.start(stream_offset + n as u64, sample_rate, (len - n) as u32);
                        fsk_out.start(stream_offset + n as u64, sample_rate, (len - n) as u32);
                        self.pulse_length = 0;
                        self.max_pulse = 0;
                        self.fsk = FskDemod::new(fsk_mode);
                        self.state = OokState::Pulse;
                        tracing::trace!(offset = ook_out.offset(), threshold, "package start");
                    }
                    else {
                        self.levels.update_low(am);
                        self.levels.refresh_default_high();
                        if self.lead_in_counter < LEAD_IN_SAMPLES {
                            self.lead_in_counter += 1;
                        }
                    }
                }
                OokState::Pulse => {
                    self.pulse_length = self.pulse_length.saturating_add(1);

                    if am < threshold - hysteresis {
                        // end of pulse
                        if self.pulse_length < MIN_PULSE_SAMPLES {
                            if ook_out.num_pulses() == 0 {
                                // false start
                                self.state = OokState::Idle;
                            }
                            else {
                                // the blip becomes the terminating gap
                                ook_out.push_pulse(0);
                                self.state = OokState::Gap { spurious_end: true };
                            }
                        }
                        else {
                            ook_out.push_pulse(self.pulse_length);
                            self.max_pulse = self.max_pulse.max(self.pulse_length);
                            self.pulse_length = 0;
                            self.state = OokState::GapStart;
                        }
                    }
                    else {
                        self.levels.update_high(am);
                        ook_out.track_carrier(i32::from(fm_n));
                        // tone tracking is only meaningful while the
                        // first pulse is open
                        if ook_out.num_pulses() == 0 {
                            self.fsk.feed(fm_n, fsk_out);
                        }
                    }
                }
                OokState::GapStart => {
                    self.pulse_length = self.pulse_length.saturating_add(1);

                    if self.pulse_length >= MIN_PULSE_SAMPLES {
                        // a real gap; a frequency keyed package has no
                        // envelope gaps, so enough stored tones decide
                        // the modulation now
                        if fsk_out.num_pulses() > MIN_FSK_PULSES {
                            self.fsk.wrap_up(fsk_out);
                            let (f1, f2) = self.fsk.estimates();
                            fsk_out.set_tone_estimates(f1, f2);
                            fsk_out.set_levels(self.levels.low(), self.levels.high());
                            fsk_out.set_end_ago((len - n) as u32);
                            self.state = OokState::Idle;
                            tracing::debug!(
                                num_pulses = fsk_out.num_pulses(),
                                f1,
                                f2,
                                "fsk package"
                            );
                            return Some(PackageKind::Fsk);
                        }
                        self.state = OokState::Gap { spurious_end: false };
                    }
                    else if am > threshold + hysteresis {
                        // spurious micro-gap, merge it back into the
                        // pulse
                        self.pulse_length += ook_out.pop_pending_pulse().unwrap_or(0);
                        self.state = OokState::Pulse;
                    }

                    if ook_out.num_pulses() == 0 {
                        self.fsk.feed(fm_n, fsk_out);
                    }
                }
                OokState::Gap { spurious_end } => {
                    self.pulse_length = self.pulse_length.saturating_add(1);

                    if !spurious_end && am > threshold + hysteresis {
                        // next pulse
                        ook_out.push_gap(self.pulse_length);
                        if ook_out.num_pulses() >= MAX_PULSES {
                            return self.finish_ook(ook_out, (len - n) as u32);
                        }
                        self.pulse_length = 0;
                        self.state = OokState::Pulse;
                    }
                    else {
                        let gap = u64::from(self.pulse_length);
                        let over_ratio = gap > u64::from(MAX_GAP_RATIO) * u64::from(self.max_pulse)
                            && gap > u64::from(MIN_GAP_MS * samples_per_ms);
                        let over_max = gap > u64::from(MAX_GAP_MS * samples_per_ms);

                        if spurious_end || over_ratio || over_max {
                            ook_out.push_gap(self.pulse_length);
                            return self.finish_ook(ook_out, (len - n) as u32);
                        }
                    }
                }
            }

            self.data_counter += 1;
        }

        self.data_counter = 0;
        None
    }

    fn finish_ook(&mut self, ook_out: &mut PulseTrain, end_ago: u32) -> Option<PackageKind> {
        ook_out.set_levels(self.levels.low(), self.levels.high());
        ook_out.set_end_ago(end_ago);
        self.state = OokState::Idle;
        tracing::debug!(
            num_pulses = ook_out.num_pulses(),
            low_db = self.levels.low_db(),
            high_db = self.levels.high_db(),
            "ook package"
        );
        Some(PackageKind::Ook)
    }
}
