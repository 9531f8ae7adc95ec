use std::time::{Duration, Instant};

/// When a timer fires, and when it fires again.
///
/// A policy computes concrete fire times; whether a timer keeps firing is
/// decided by its callback's return value at each fire.
#[derive(Clone, Copy, Debug)]
pub enum Policy {
    /// Fire once, `delay` after scheduling.
    ///
    /// A callback returning `true` re-arms the timer for another `delay`.
    Once { delay: Duration },
    /// Fire every `interval`.
    Repeating { interval: Duration },
    /// Fire at a frequency easing from `min_freq` towards `max_freq` over
    /// `duration`, front-loading the slowdown.
    ///
    /// Used to back off background tasks (resync polling and the like)
    /// while keeping them snappy right after a reset.
    EaseIn {
        min_freq: Duration,
        max_freq: Duration,
        duration: Duration,
    },
    /// Like [`Policy::EaseIn`], but slow at both ends of the ramp.
    EaseInOut {
        min_freq: Duration,
        max_freq: Duration,
        duration: Duration,
    },
    /// Fire on the next scheduler iteration.
    Microtask,
    /// Fire on the next tick, after every deadline of the current one.
    ///
    /// All timers armed with this policy during one tick fire in insertion
    /// order on the following tick.
    NextTick,
}

fn ease_in(t: f64) -> f64 {
    t * t
}

fn ease_in_out(t: f64) -> f64 {
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}

fn eased_delay(
    ease: impl Fn(f64) -> f64,
    min_freq: Duration,
    max_freq: Duration,
    duration: Duration,
    elapsed: Duration,
) -> Duration {
    let progress = if duration.is_zero() {
        1.0
    } else {
        (elapsed.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0)
    };
    min_freq + max_freq.saturating_sub(min_freq).mul_f64(ease(progress))
}

impl Policy {
    /// The next fire time for a timer (re)armed at `now`.
    ///
    /// `ramp_start` is the instant the easing policies measure their
    /// progress from; it is ignored by the fixed policies.
    pub(crate) fn next_deadline(&self, now: Instant, ramp_start: Instant) -> Instant {
        match *self {
            Self::Once { delay } => now + delay,
            Self::Repeating { interval } => now + interval,
            Self::EaseIn {
                min_freq,
                max_freq,
                duration,
            } => now + eased_delay(ease_in, min_freq, max_freq, duration, now - ramp_start),
            Self::EaseInOut {
                min_freq,
                max_freq,
                duration,
            } => now + eased_delay(ease_in_out, min_freq, max_freq, duration, now - ramp_start),
            Self::Microtask | Self::NextTick => now,
        }
    }
}
