//! Per-item access statistics.
//!
//! Every tracked item carries a one-pass (Welford) estimate of the mean and
//! the sum of squared deviations of its inter-access intervals. Values are
//! kept in fixed point, scaled by `1 << SCALE_SHIFT`, so that the integer
//! divisions of the update step keep ten bits of fraction.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use tracing::trace;


/// Fixed-point shift of interval statistics (×1024).
pub const SCALE_SHIFT: u32 = 10;

/// Outcome of feeding one timestamp to [`Welford::update`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Update {
    /// First sample of the item; only the timestamp was recorded.
    ColdStart,
    /// The timestamp was not after the last accepted one and was dropped.
    OutOfOrder,
    /// A new interval was folded into the running statistics.
    Accepted { interval: u64 },
}

/// Online mean/variance of inter-access intervals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Welford {
    /// Timestamp of the last accepted sample, 0 if never sampled.
    pub last_sample_time: u64,
    /// Number of accepted samples, the cold start included.
    pub sample_count: u32,
    /// Mean interval, ×1024.
    pub running_mean: u64,
    /// Sum of squared deviations (M2), ×1024.
    pub running_m2: u64,
}

impl Welford {
    pub fn update(&mut self, now: u64) -> Update {
        if self.last_sample_time == 0 {
            *self = Self {
                last_sample_time: now,
                sample_count: 1,
                running_mean: 0,
                running_m2: 0,
            };
            return Update::ColdStart;
        }

        // Hardware timestamps are not monotonic across reporting paths.
        if now <= self.last_sample_time {
            return Update::OutOfOrder;
        }

        let interval = now - self.last_sample_time;
        let x = (interval << SCALE_SHIFT) as i64;

        self.last_sample_time = now;
        self.sample_count = self.sample_count.saturating_add(1);
        let n = self.sample_count as i64;

        let delta = x.wrapping_sub(self.running_mean as i64);
        // `/` on signed integers truncates toward zero.
        self.running_mean = (self.running_mean as i64).wrapping_add(delta / n) as u64;
        let delta2 = x.wrapping_sub(self.running_mean as i64);

        // The product carries a ×1024² scale, shifting restores ×1024.
        let m2_step = (delta as i128 * delta2 as i128) >> SCALE_SHIFT;
        let m2_step = m2_step.clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        self.running_m2 = self.running_m2.saturating_add_signed(m2_step);

        Update::Accepted { interval }
    }

    /// Sample variance of the intervals, ×1024.
    pub fn variance(&self) -> Option<u64> {
        (self.sample_count > 1).then(|| self.running_m2 / (self.sample_count as u64 - 1))
    }

    /// M2, the accumulated fluctuation; `None` if never sampled.
    pub fn fluctuation(&self) -> Option<u64> {
        (self.sample_count >= 1).then_some(self.running_m2)
    }
}

/// Shared cell holding a [`Welford`] estimate.
///
/// Only the drain thread writes; scoring reads concurrently and may observe a
/// mix of two consecutive updates, which is fine for a control signal.
#[derive(Debug, Default)]
pub struct ItemStats {
    last_sample_time: AtomicU64,
    sample_count: AtomicU32,
    running_mean: AtomicU64,
    running_m2: AtomicU64,
}

impl ItemStats {
    pub fn load(&self) -> Welford {
        Welford {
            last_sample_time: self.last_sample_time.load(Ordering::Relaxed),
            sample_count: self.sample_count.load(Ordering::Relaxed),
            running_mean: self.running_mean.load(Ordering::Relaxed),
            running_m2: self.running_m2.load(Ordering::Relaxed),
        }
    }

    fn store(&self, w: &Welford) {
        self.running_mean.store(w.running_mean, Ordering::Relaxed);
        self.running_m2.store(w.running_m2, Ordering::Relaxed);
        self.sample_count.store(w.sample_count, Ordering::Relaxed);
        self.last_sample_time.store(w.last_sample_time, Ordering::Relaxed);
    }

    /// Folds `now` into the estimate.
    ///
    /// Must only be called from a single thread at a time; concurrent
    /// writers would lose updates.
    pub fn update(&self, now: u64) -> Update {
        let mut w = self.load();
        let update = w.update(now);
        match update {
            Update::OutOfOrder => {
                trace!(now, last = w.last_sample_time, "welford: timestamp rewind, sample skipped");
            }
            Update::ColdStart => {
                trace!(now, "welford: cold start");
                self.store(&w);
            }
            Update::Accepted { interval } => {
                trace!(
                    n = w.sample_count,
                    mean = w.running_mean,
                    m2 = w.running_m2,
                    interval,
                    "welford: update"
                );
                self.store(&w);
            }
        }
        update
    }
}

/// An item whose accesses are being tracked.
///
/// What an item stands for (a page, a huge page, an object) is decided by
/// the [`Resolver`][crate::source::Resolver] that hands it out; this crate
/// only owns its statistics.
#[derive(Debug)]
pub struct TrackedItem {
    key: u64,
    stats: ItemStats,
}

impl TrackedItem {
    pub fn new(key: u64) -> Self {
        Self {
            key,
            stats: ItemStats::default(),
        }
    }

    /// Identity assigned by the resolver.
    pub fn key(&self) -> u64 {
        self.key
    }

    pub fn stats(&self) -> &ItemStats {
        &self.stats
    }
}
