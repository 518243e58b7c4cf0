//! Tick clocks for pre-auth node aging.
//!
//! The engine only needs a wrapping millisecond counter; node ages are
//! computed with `wrapping_sub`, so the counter rolling over after ~49 days
//! is harmless.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use crate::application::context::Clock;

/// Milliseconds since the clock was created, from a monotonic source.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ticks(&self) -> u32 {
        // Truncation is the wrap.
        self.origin.elapsed().as_millis() as u32
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    ticks: AtomicU32,
}

impl ManualClock {
    pub fn new(start: u32) -> Self {
        Self {
            ticks: AtomicU32::new(start),
        }
    }

    /// Moves the clock forward by `ticks`, wrapping at `u32::MAX`.
    pub fn advance(&self, ticks: u32) {
        let now = self.ticks.load(Ordering::SeqCst);
        self.ticks.store(now.wrapping_add(ticks), Ordering::SeqCst);
    }

    pub fn set(&self, ticks: u32) {
        self.ticks.store(ticks, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ticks(&self) -> u32 {
        self.ticks.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances_and_wraps() {
        // Arrange
        let clock = ManualClock::new(u32::MAX - 1);

        // Act
        clock.advance(3);

        // Assert
        assert_eq!(clock.now_ticks(), 1);
    }

    #[test]
    fn test_manual_clock_set_overrides_current_value() {
        let clock = ManualClock::new(10);
        clock.set(500);
        assert_eq!(clock.now_ticks(), 500);
    }

    #[test]
    fn test_monotonic_clock_never_goes_backwards() {
        // Arrange
        let clock = MonotonicClock::new();

        // Act
        let first = clock.now_ticks();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = clock.now_ticks();

        // Assert
        assert!(second >= first);
    }
}
