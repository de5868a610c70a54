use std::time::{Duration, Instant};

/// A restartable timeout armed from an injected instant
///
/// Timers are never waited on. The scheduler asks `expired` on every tick
/// and acts when the answer flips.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timer {
    started: Option<Instant>,
}

impl Timer {
    /// Creates a disarmed timer
    pub const fn new() -> Self {
        Timer { started: None }
    }

    /// Creates a timer armed at `now`
    pub fn armed_at(now: Instant) -> Self {
        Timer { started: Some(now) }
    }

    /// (Re)starts the timer at `now`
    pub fn arm(&mut self, now: Instant) {
        self.started = Some(now);
    }

    /// Stops the timer
    pub fn disarm(&mut self) {
        self.started = None;
    }

    /// Whether the timer is running
    pub fn is_armed(&self) -> bool {
        self.started.is_some()
    }

    /// Time since the timer was armed, zero when disarmed
    pub fn elapsed(&self, now: Instant) -> Duration {
        self.started
            .map(|started| now.saturating_duration_since(started))
            .unwrap_or(Duration::ZERO)
    }

    /// True once an armed timer has run for at least `limit`
    pub fn expired(&self, now: Instant, limit: Duration) -> bool {
        self.is_armed() && self.elapsed(now) >= limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disarmed_timer_never_expires() {
        let now = Instant::now();
        let timer = Timer::new();
        assert!(!timer.expired(now + Duration::from_secs(60), Duration::ZERO));
        assert_eq!(timer.elapsed(now), Duration::ZERO);
    }

    #[test]
    fn test_expiry_is_inclusive() {
        let start = Instant::now();
        let timer = Timer::armed_at(start);
        let limit = Duration::from_millis(10);

        assert!(!timer.expired(start + Duration::from_millis(9), limit));
        assert!(timer.expired(start + limit, limit));
    }

    #[test]
    fn test_rearm_restarts() {
        let start = Instant::now();
        let mut timer = Timer::armed_at(start);
        timer.arm(start + Duration::from_millis(8));
        assert_eq!(
            timer.elapsed(start + Duration::from_millis(10)),
            Duration::from_millis(2)
        );
    }

    #[test]
    fn test_elapsed_before_arm_is_zero() {
        let start = Instant::now();
        let timer = Timer::armed_at(start + Duration::from_millis(5));
        assert_eq!(timer.elapsed(start), Duration::ZERO);
    }
}
