//! Composite scoring of an event class.
//!
//! Three sub-scores in `[0, SCALE]` are derived from a class's hot item heap
//! and its cumulative sample counter:
//!
//! * vibrate: how volatile the access intervals of the tracked items are,
//! * hotness: how often the tracked items are hit, plus a bonus for heap fill,
//! * overhead: how many samples the class has produced so far.
//!
//! They are weighted into a raw composite and normalized against the
//! theoretical range of that composite.

use crate::config::{ScoreOpts, SCALE};
use crate::heap::{EventHeap, HeapEntry};

#[cfg(test)]
mod test;

const SCALE_U64: u64 = SCALE as u64;

/// Scores and periods of one class for the latest control cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdaptiveMetrics {
    pub vibrate_score: u32,
    pub hotness_score: u32,
    pub overhead_score: u32,
    /// Weighted sum of the sub-scores, may be negative.
    pub raw_composite: i32,
    pub normalized_composite: u32,

    pub target_period: u64,
    pub current_period: u64,
    pub smoothed_period: u64,
}

fn ratio_score(value: u64, max: u64) -> u32 {
    if value >= max {
        SCALE
    } else {
        (value as u128 * SCALE_U64 as u128 / max as u128) as u32
    }
}

/// Volatility of the tracked items' access intervals.
pub fn vibrate_score(entries: &[HeapEntry], fluc_max: u64) -> u32 {
    let (sum, count) = entries
        .iter()
        .filter_map(|e| e.item.stats().load().fluctuation())
        .fold((0u128, 0u128), |(sum, count), f| (sum + f as u128, count + 1));

    if count == 0 {
        return 0;
    }
    let avg = (sum / count).min(u64::MAX as u128) as u64;
    ratio_score(avg, fluc_max)
}

/// Average hit count of the tracked items plus a heap fill bonus.
pub fn hotness_score(entries: &[HeapEntry], capacity: usize, hit_max: u64) -> u32 {
    if entries.is_empty() {
        return 0;
    }

    let sum: u64 = entries.iter().map(|e| e.hit_count as u64).sum();
    let avg = sum / entries.len() as u64;
    let base = ratio_score(avg, hit_max);

    // 0..=100, a fuller heap means more distinct hot items.
    let density_bonus = match capacity {
        0 => 0,
        c => (entries.len() * 100 / c) as u32,
    };

    (base + density_bonus).min(SCALE)
}

/// Sampling overhead of the class so far.
pub fn overhead_score(samples: u64, overhead_max: u64) -> u32 {
    ratio_score(samples, overhead_max)
}

/// Fills the score fields of [`AdaptiveMetrics`] from the sub-scores.
pub fn combine(vibrate: u32, hotness: u32, overhead: u32, opts: &ScoreOpts) -> AdaptiveMetrics {
    let w = &opts.weights;
    let raw = (w.vibrate as i64 * vibrate as i64
        + w.hotness as i64 * hotness as i64
        + w.overhead as i64 * overhead as i64)
        / SCALE as i64;

    let (v_min, v_max) = (w.v_min(), w.v_max());
    let normalized = if raw <= v_min {
        0
    } else if raw >= v_max {
        SCALE
    } else {
        ((raw - v_min) * SCALE as i64 / (v_max - v_min)) as u32
    };

    AdaptiveMetrics {
        vibrate_score: vibrate,
        hotness_score: hotness,
        overhead_score: overhead,
        raw_composite: raw as i32,
        normalized_composite: normalized,
        ..Default::default()
    }
}

/// Scores a class from its heap and cumulative sample count.
///
/// The heap is read under its lock in one go, so the vibrate and hotness
/// scores describe the same set of items.
pub fn score(heap: &EventHeap, samples: u64, opts: &ScoreOpts) -> AdaptiveMetrics {
    let (vibrate, hotness) = heap.with_entries(|entries| {
        (
            vibrate_score(entries, opts.fluc_max),
            hotness_score(entries, heap.capacity(), opts.hit_max),
        )
    });
    let overhead = overhead_score(samples, opts.overhead_max);
    combine(vibrate, hotness, overhead, opts)
}
