//! Timing subsystem
//!
//! Two families of timeouts drive the data link:
//!
//! - Bit-time derived values (frame abort, line turnaround) which scale with
//!   the configured baud rate and are computed by [`BitTiming`]
//! - Wall-clock state machine timeouts, configured through
//!   [`Timeouts`](crate::core::Timeouts) and tracked by [`Timer`]
//!
//! Every timer is armed from an instant supplied by a [`Clock`]. Nothing in
//! the engine reads the ambient clock, so feeding synthetic instants gives
//! fully deterministic runs.
//!
//! # Examples
//!
//! ```
//! use mstp_link::time::{BitTiming, Timer};
//! use std::time::{Duration, Instant};
//!
//! let timing = BitTiming::new(38400);
//! assert_eq!(timing.turnaround(), Duration::from_nanos(1_041_666));
//!
//! let start = Instant::now();
//! let timer = Timer::armed_at(start);
//! assert!(timer.expired(start + Duration::from_millis(10), Duration::from_millis(10)));
//! ```

mod clock;
mod timer;

pub use self::clock::{Clock, ManualClock, MonotonicClock};
pub use self::timer::Timer;

use std::time::Duration;

/// Bit times of silence that abort a partially received frame
pub const FRAME_ABORT_BITS: u64 = 60;

/// Bit times a station waits after the last received octet before driving the line
pub const TURNAROUND_BITS: u64 = 40;

/// Bits on the wire per octet (start, eight data, stop)
pub const BITS_PER_OCTET: u64 = 10;

/// Converts bit counts into durations for one line speed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitTiming {
    baud_rate: u32,
}

impl BitTiming {
    /// Creates timing for `baud_rate` bits per second
    pub fn new(baud_rate: u32) -> Self {
        BitTiming {
            baud_rate: baud_rate.max(1),
        }
    }

    /// Configured line speed
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Duration of `bits` bit times
    pub fn bits(&self, bits: u64) -> Duration {
        Duration::from_nanos(bits * 1_000_000_000 / self.baud_rate as u64)
    }

    /// Silence that aborts a frame in progress
    pub fn frame_abort(&self) -> Duration {
        self.bits(FRAME_ABORT_BITS)
    }

    /// Minimum gap between receiving and transmitting
    pub fn turnaround(&self) -> Duration {
        self.bits(TURNAROUND_BITS)
    }

    /// Time to put `octets` on the wire
    pub fn transmission(&self, octets: usize) -> Duration {
        self.bits(octets as u64 * BITS_PER_OCTET)
    }
}

/// Utility functions for time management
pub mod util {
    use std::time::Duration;

    /// Whole milliseconds in a duration, saturating
    pub fn millis(duration: Duration) -> u64 {
        duration.as_millis().min(u64::MAX as u128) as u64
    }

    /// Multiplies a duration by a station count without overflow
    pub fn scaled(base: Duration, factor: u32) -> Duration {
        base.checked_mul(factor).unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_times_scale_with_baud() {
        let slow = BitTiming::new(9600);
        let fast = BitTiming::new(76800);
        assert_eq!(slow.frame_abort(), fast.frame_abort() * 8);
        assert!(slow.turnaround() > fast.turnaround() * 7);
    }

    #[test]
    fn test_standard_values_at_38400() {
        let timing = BitTiming::new(38400);
        // 60 bits at 38400 bps
        assert_eq!(timing.frame_abort(), Duration::from_nanos(1_562_500));
        // one 8 octet token frame
        assert_eq!(timing.transmission(8), Duration::from_nanos(2_083_333));
    }

    #[test]
    fn test_zero_baud_is_clamped() {
        let timing = BitTiming::new(0);
        assert_eq!(timing.baud_rate(), 1);
        assert_eq!(timing.bits(1), Duration::from_secs(1));
    }

    #[test]
    fn test_scaled_saturates() {
        assert_eq!(util::scaled(Duration::from_millis(10), 3), Duration::from_millis(30));
        assert_eq!(util::scaled(Duration::MAX, 2), Duration::MAX);
        assert_eq!(util::millis(Duration::from_micros(2500)), 2);
    }
}
