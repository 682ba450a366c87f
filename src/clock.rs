use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source, expressed as an offset from the clock's origin
pub trait Clock {
    fn now(&self) -> Duration;
}

/// Production clock backed by `Instant`
#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Test clock that only moves when told to. Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    micros: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(now: Duration) -> Self {
        let clock = Self::default();
        clock.set(now);
        clock
    }

    pub fn set(&self, now: Duration) {
        self.micros.store(now.as_micros() as u64, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) -> Duration {
        let micros = by.as_micros() as u64;
        let after = self.micros.fetch_add(micros, Ordering::SeqCst) + micros;
        Duration::from_micros(after)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.micros.load(Ordering::SeqCst))
    }
}

/// Periodic deadline. Owners arm it on entering a state and drop it on
/// leaving so no stray tick can reach a later state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timer {
    period: Duration,
    next_due: Duration,
}

impl Timer {
    pub fn arm(now: Duration, period: Duration) -> Self {
        Self {
            period,
            next_due: now + period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn next_due(&self) -> Duration {
        self.next_due
    }

    /// Fire at most once, skipping any periods that were missed.
    pub fn poll(&mut self, now: Duration) -> bool {
        if now < self.next_due {
            return false;
        }
        while self.next_due <= now {
            self.next_due += self.period;
        }
        true
    }

    /// Fire once for the next due period only; call again to catch up.
    pub fn poll_once(&mut self, now: Duration) -> bool {
        if now < self.next_due {
            return false;
        }
        self.next_due += self.period;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_shares_time_between_clones() {
        let clock = ManualClock::starting_at(Duration::from_secs(5));
        let other = clock.clone();

        clock.advance(Duration::from_millis(250));

        assert_eq!(other.now(), Duration::from_millis(5250));
    }

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn timer_fires_on_period_boundary() {
        let mut timer = Timer::arm(Duration::ZERO, Duration::from_secs(1));

        assert!(!timer.poll(Duration::from_millis(999)));
        assert!(timer.poll(Duration::from_secs(1)));
        assert!(!timer.poll(Duration::from_millis(1500)));
        assert!(timer.poll(Duration::from_secs(2)));
    }

    #[test]
    fn timer_poll_skips_missed_periods() {
        let mut timer = Timer::arm(Duration::ZERO, Duration::from_millis(10));

        assert!(timer.poll(Duration::from_millis(55)));
        assert!(!timer.poll(Duration::from_millis(59)));
        assert!(timer.poll(Duration::from_millis(60)));
    }

    #[test]
    fn timer_poll_once_catches_up_one_period_at_a_time() {
        let mut timer = Timer::arm(Duration::ZERO, Duration::from_secs(1));
        let now = Duration::from_millis(2500);

        let mut fired = 0;
        while timer.poll_once(now) {
            fired += 1;
        }

        assert_eq!(fired, 2);
    }
}
