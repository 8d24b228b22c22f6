//! Speech scheduling for the day.
//!
//! - [`turns`]: ordered speeches, one per living player, ascending by id
//! - [`discussion`]: a time-boxed free-for-all where AI players speak at
//!   random moments until the window closes

pub mod discussion;
pub mod turns;

use std::time::Duration;

use rand::Rng;

use crate::config::SecsRange;

pub use discussion::{DiscussionSpeech, DiscussionWindow};
pub use turns::{SpeechMaker, TurnScheduler, fallback_line};

#[derive(Debug, Clone)]
pub struct TurnSettings {
    /// Simulated thinking time before an AI speech
    pub speech_delay: SecsRange,
    pub speech_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DiscussionSettings {
    pub duration: Duration,
    /// Wait between speaking opportunities
    pub interval: SecsRange,
    pub probability: f64,
    /// Speakers stop rescheduling once less than this remains
    pub min_remaining: Duration,
    pub speech_timeout: Duration,
}

/// A uniform draw from `range`, in seconds.
pub(crate) fn draw<R: Rng + ?Sized>(range: SecsRange, rng: &mut R) -> Duration {
    let (min, max) = (range.min.max(0.0), range.max.max(0.0));
    if max <= min {
        return Duration::from_secs_f64(min);
    }
    Duration::from_secs_f64(rng.random_range(min..=max))
}
