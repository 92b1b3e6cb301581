//! Host monotonic clock.

use std::time::Instant;

use super::Clock;

/// [`Clock`] backed by `std::time::Instant`.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Clock whose zero is now.
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
    fn now_us(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}

/// Busy-wait for `micros`, like a kernel `udelay`.
///
/// Used for the trigger pulse width, which is far below what a timer can resolve.
pub fn spin_for_us(micros: u64) {
    let start = Instant::now();
    let target = std::time::Duration::from_micros(micros);
    while start.elapsed() < target {
        std::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_goes_backwards() {
        let clock = MonotonicClock::new();
        let mut last = clock.now_us();
        for _ in 0..1000 {
            let now = clock.now_us();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn spin_waits_at_least_requested() {
        let start = Instant::now();
        spin_for_us(50);
        assert!(start.elapsed() >= std::time::Duration::from_micros(50));
    }
}
