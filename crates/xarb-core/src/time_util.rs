//! Time utilities and injectable clock sources.
//!
//! Wall-clock readings are **microseconds since Unix epoch**; the monotonic
//! clock is **seconds since process start** as `f64`. Components take their
//! clocks as `Arc<dyn Fn ..>` so tests can drive time deterministically.

use std::sync::{Arc, LazyLock};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Wall-clock source returning microseconds since Unix epoch.
pub type WallClock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Monotonic clock source returning seconds as `f64`.
pub type MonotonicClock = Arc<dyn Fn() -> f64 + Send + Sync>;

/// Instant source used by the circuit breaker.
pub type InstantClock = Arc<dyn Fn() -> Instant + Send + Sync>;

static ORIGIN: LazyLock<Instant> = LazyLock::new(Instant::now);

/// Current time as **microseconds** since Unix epoch.
#[inline]
pub fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or_default()
}

/// Monotonic clock in **seconds** since first use, for sequencing without
/// wall-clock jumps.
#[inline]
pub fn monotonic_secs() -> f64 {
    ORIGIN.elapsed().as_secs_f64()
}

/// The system wall clock as a [`WallClock`].
pub fn system_wall_clock() -> WallClock {
    Arc::new(now_us)
}

/// The process monotonic clock as a [`MonotonicClock`].
pub fn system_monotonic_clock() -> MonotonicClock {
    Arc::new(monotonic_secs)
}

/// `Instant::now` as an [`InstantClock`].
pub fn system_instant_clock() -> InstantClock {
    Arc::new(Instant::now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_never_goes_back() {
        let a = monotonic_secs();
        let b = monotonic_secs();
        assert!(b >= a);
    }

    #[test]
    fn wall_clock_units() {
        let us = now_us();
        // after 2020-01-01
        assert!(us > 1_577_836_800_000_000);
    }
}
