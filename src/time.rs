//! Millisecond time base for protocol timeouts.
//! The controller never reads a clock, callers pass `now` in.

pub type Instant = fugit::TimerInstantU32<1000>;
pub type Duration = fugit::MillisDurationU32;

/// Milliseconds since boot as an `Instant`
pub fn millis(ticks: u32) -> Instant {
    Instant::from_ticks(ticks)
}

/// Elapsed time, zero if `earlier` is actually in the future
pub fn elapsed(now: Instant, earlier: Instant) -> Duration {
    now.checked_duration_since(earlier).unwrap_or(Duration::from_ticks(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_saturates() {
        assert_eq!(elapsed(millis(1500), millis(500)), Duration::millis(1000));
        assert_eq!(elapsed(millis(500), millis(1500)), Duration::millis(0));
    }
}
