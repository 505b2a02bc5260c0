mod detect;
mod fsk;
mod level;
pub mod stream;
mod train;

pub use crate::{
    detect::{
        MAX_PULSES,
        MIN_PULSE_SAMPLES,
        PackageKind,
        PulseDetector,
    },
    fsk::FskMode,
    level::{
        LevelConfig,
        LevelEstimator,
        db_to_level,
        level_to_db,
    },
    train::PulseTrain,
};
