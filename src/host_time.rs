//! Host time: monotonic ticks used to align rendering with the session clock.
//!
//! Ticks are nanoseconds of a process-local monotonic clock. [`Timebase`]
//! carries the numer/denom pair a platform reports for its tick unit, from
//! which the seconds-to-ticks factor is derived once at initialization.

use std::time::{Duration, Instant};

pub const NANOS_PER_SECOND: f64 = 1.0e9;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HostTime(pub u64);

impl HostTime {
    pub fn ticks(self) -> u64 {
        self.0
    }

    pub fn add_ticks(self, ticks: u64) -> Self {
        HostTime(self.0.saturating_add(ticks))
    }

    /// Signed distance from `earlier` to `self`, in seconds.
    pub fn seconds_since(self, earlier: HostTime) -> f64 {
        (self.0 as i128 - earlier.0 as i128) as f64 / NANOS_PER_SECOND
    }

    /// Shifts by a (possibly negative) number of seconds, clamping at zero.
    pub fn offset_seconds(self, seconds: f64) -> Self {
        let shifted = self.0 as f64 + seconds * NANOS_PER_SECOND;
        HostTime(shifted.max(0.0).round() as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timebase {
    pub numer: u32,
    pub denom: u32,
}

impl Timebase {
    /// The timebase of [`HostClock`] ticks (one tick per nanosecond).
    pub fn native() -> Self {
        Timebase { numer: 1, denom: 1 }
    }

    pub fn seconds_to_host_time(&self) -> f64 {
        (NANOS_PER_SECOND * f64::from(self.denom)) / f64::from(self.numer)
    }
}

impl Default for Timebase {
    fn default() -> Self {
        Self::native()
    }
}

/// Converts a device latency into host ticks, saturating at `u32::MAX`.
pub fn latency_to_host_ticks(latency: Duration, seconds_to_host_time: f64) -> u32 {
    (seconds_to_host_time * latency.as_secs_f64()) as u32
}

#[derive(Debug, Clone, Copy)]
pub struct HostClock {
    epoch: Instant,
}

impl HostClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    pub fn now(&self) -> HostTime {
        HostTime(self.epoch.elapsed().as_nanos() as u64)
    }
}

impl Default for HostClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_timebase_factor() {
        assert_eq!(Timebase::native().seconds_to_host_time(), 1.0e9);
        let mach_like = Timebase {
            numer: 125,
            denom: 3,
        };
        assert_eq!(mach_like.seconds_to_host_time(), 24_000_000.0);
    }

    #[test]
    fn test_latency_conversion() {
        let ticks = latency_to_host_ticks(Duration::from_millis(5), 1.0e9);
        assert_eq!(ticks, 5_000_000);
        // Saturates instead of wrapping.
        let ticks = latency_to_host_ticks(Duration::from_secs(10), 1.0e9);
        assert_eq!(ticks, u32::MAX);
    }

    #[test]
    fn test_seconds_since_is_signed() {
        let a = HostTime(2_000_000_000);
        let b = HostTime(500_000_000);
        assert_eq!(a.seconds_since(b), 1.5);
        assert_eq!(b.seconds_since(a), -1.5);
        assert_eq!(b.offset_seconds(1.5), a);
        assert_eq!(b.offset_seconds(-10.0), HostTime(0));
    }

    #[test]
    fn test_host_clock_is_monotonic() {
        let clock = HostClock::new();
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
