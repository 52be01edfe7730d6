// Pacing Delay
// Maps a segment's text length to the wait before the next send

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay strategy with its parameters, all in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "camelCase")]
pub enum PacingModel {
    Fixed { seconds: f64 },
    Linear { base: f64, factor: f64 },
    Log { base: f64, factor: f64, cap: f64 },
    Random { min: f64, max: f64 },
}

impl PacingModel {
    /// Wait for a segment carrying `text_len` characters of text.
    /// Negative factors count as zero, so length never shortens a wait.
    pub fn delay<R: Rng + ?Sized>(&self, text_len: usize, rng: &mut R) -> Duration {
        let len = text_len as f64;
        let secs = match *self {
            Self::Fixed { seconds } => seconds,
            Self::Linear { base, factor } => base + factor.max(0.0) * len,
            Self::Log { base, factor, cap } => {
                (base + factor.max(0.0) * (len + 1.0).ln()).min(cap)
            }
            Self::Random { min, max } => {
                if !min.is_finite() || !max.is_finite() {
                    return Duration::ZERO;
                }
                let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
                let (lo, hi) = (lo.max(0.0), hi.max(0.0));
                if lo == hi {
                    lo
                } else {
                    rng.gen_range(lo..=hi)
                }
            }
        };
        seconds_to_duration(secs)
    }
}

fn seconds_to_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}
