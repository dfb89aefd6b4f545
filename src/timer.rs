// Licensed under the Apache-2.0 license

//! Host implementations of the timing seams.

use crate::eeprom::traits::{MillisInstant, Monotonic};
use embedded_hal::delay::DelayNs;
use std::time::{Duration, Instant};

/// Milliseconds elapsed since the clock was created.
pub struct StdClock {
    start: Instant,
}

impl StdClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Monotonic for StdClock {
    fn now(&mut self) -> MillisInstant {
        let elapsed = u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX);
        MillisInstant::from_ticks(elapsed)
    }
}

/// Blocking delay on the calling thread.
#[derive(Copy, Clone, Debug, Default)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(u64::from(ns)));
    }
}
