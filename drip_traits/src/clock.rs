use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Millisecond clock abstraction for the control loop.
///
/// - millis(): a free-running `u32` millisecond counter that wraps at `u32::MAX`
/// - sleep(): sleeps for the provided duration (implementations may simulate)
/// - ms_since(): wraparound-safe elapsed milliseconds from an earlier reading
pub trait Clock {
    fn millis(&self) -> u32;
    fn sleep(&self, d: Duration);

    /// Milliseconds elapsed since `earlier`, correct across one counter wrap.
    fn ms_since(&self, earlier: u32) -> u32 {
        elapsed_ms(self.millis(), earlier)
    }
}

/// Wrapping difference `now - earlier` on the `u32` millisecond counter.
#[inline]
pub fn elapsed_ms(now: u32, earlier: u32) -> u32 {
    now.wrapping_sub(earlier)
}

/// Real-time clock backed by `std::time::Instant`, truncated to `u32` millis.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn millis(&self) -> u32 {
        // Truncation is the point: the counter wraps like a firmware tick.
        self.origin.elapsed().as_millis() as u32
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}

/// Deterministic clock whose time only moves when told to.
///
/// Clones share the same counter, so a test can keep one handle and give
/// another to the controller. `sleep(d)` advances the counter by `d`.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU32>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the counter at an arbitrary value (e.g. just below a wrap).
    pub fn starting_at(ms: u32) -> Self {
        Self {
            now: Arc::new(AtomicU32::new(ms)),
        }
    }

    /// Advance the clock by `ms`, wrapping at `u32::MAX`.
    pub fn advance(&self, ms: u32) {
        let cur = self.now.load(Ordering::Relaxed);
        self.now.store(cur.wrapping_add(ms), Ordering::Relaxed);
    }

    /// Set the absolute counter value.
    pub fn set(&self, ms: u32) {
        self.now.store(ms, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn millis(&self) -> u32 {
        self.now.load(Ordering::Relaxed)
    }

    fn sleep(&self, d: Duration) {
        self.advance(d.as_millis() as u32);
    }
}
