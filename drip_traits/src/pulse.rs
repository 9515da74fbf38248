//! Flow sensor pulse counter shared between the edge interrupt and the tick loop.
//!
//! The interrupt side only ever calls [`PulseCounter::increment`]. The control
//! loop takes one [`PulseCounter::snapshot`] per tick and resets the counter
//! when a metering session starts. Nothing else crosses execution contexts.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Clone, Default)]
pub struct PulseCounter {
    count: Arc<AtomicU32>,
}

impl PulseCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called from the pulse edge handler.
    #[inline]
    pub fn increment(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Add several pulses at once (simulators, batched edge counts).
    #[inline]
    pub fn add(&self, pulses: u32) {
        self.count.fetch_add(pulses, Ordering::Relaxed);
    }

    /// Current counter value.
    #[inline]
    pub fn snapshot(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_observe_interrupt_side_increments() {
        let isr = PulseCounter::new();
        let core = isr.clone();
        for _ in 0..5 {
            isr.increment();
        }
        isr.add(10);
        assert_eq!(core.snapshot(), 15);
        core.reset();
        assert_eq!(isr.snapshot(), 0);
    }
}
