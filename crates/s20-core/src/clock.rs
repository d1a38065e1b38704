//! Millisecond clock shared by the engine and the pairing machine.
//!
//! Timestamps are `u32` and wrap after ~49.7 days; all comparisons go
//! through [`elapsed`] so they stay correct across the wrap.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// Monotonic millisecond source.
pub trait Clock {
    fn now_ms(&self) -> u32;
}

/// Milliseconds from `since` to `now`, wrap-safe.
#[inline]
pub fn elapsed(now: u32, since: u32) -> u32 {
    now.wrapping_sub(since)
}

/// A countdown started at some instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Deadline {
    start: u32,
    duration: u32,
}

impl Deadline {
    pub fn new(now: u32, duration: u32) -> Self {
        Self {
            start: now,
            duration,
        }
    }

    pub fn expired(&self, now: u32) -> bool {
        elapsed(now, self.start) >= self.duration
    }

    pub fn remaining(&self, now: u32) -> u32 {
        self.duration.saturating_sub(elapsed(now, self.start))
    }
}

/// Wall-clock backed implementation, counting from construction.
#[derive(Debug, Clone, Copy)]
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
    fn now_ms(&self) -> u32 {
        // Truncation is the wrap.
        self.origin.elapsed().as_millis() as u32
    }
}

/// Test clock; clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u32>>,
}

impl ManualClock {
    pub fn new(start: u32) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn set(&self, now: u32) {
        self.now.set(now);
    }

    pub fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.now.get()
    }
}
