use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{combine, hotness_score, overhead_score, score, vibrate_score};
use crate::config::{ScoreOpts, Weights, SCALE};
use crate::heap::{EventHeap, HeapEntry};
use crate::stat::TrackedItem;

fn entry(hit_count: u32, stamps: &[u64]) -> HeapEntry {
    let item = Arc::new(TrackedItem::new(0));
    for &t in stamps {
        item.stats().update(t);
    }
    HeapEntry { item, hit_count }
}

#[test]
fn test_empty_heap() {
    let opts = ScoreOpts::default();
    let heap = EventHeap::new(8).unwrap();
    let m = score(&heap, 0, &opts);

    assert_eq!(m.vibrate_score, 0);
    assert_eq!(m.hotness_score, 0);
    assert_eq!(m.overhead_score, 0);
    assert_eq!(m.raw_composite, 0);
    // (0 - (-1000)) * 10000 / 10000
    assert_eq!(m.normalized_composite, 1000);
}

#[test]
fn test_vibrate_score() {
    // [0, 1000] at ×1024: M2 = 512_000_000.
    let es = [entry(1, &[100, 1100]), entry(1, &[5])];
    // Average of 512_000_000 and 0.
    assert_eq!(vibrate_score(&es, 512_000_000), SCALE / 2);
    assert_eq!(vibrate_score(&es, 256_000_000), SCALE);
    assert_eq!(vibrate_score(&es, u64::MAX), 0);

    // Items never sampled do not count.
    let es = [entry(1, &[100, 1100]), entry(1, &[])];
    assert_eq!(vibrate_score(&es, 512_000_000), SCALE);
    assert_eq!(vibrate_score(&[], 1), 0);
}

#[test]
fn test_hotness_score() {
    let es: Vec<_> = [1, 2, 3, 4].iter().map(|&h| entry(h, &[])).collect();
    // avg = 10 / 4 = 2 -> 200, density = 4 * 100 / 8 = 50.
    assert_eq!(hotness_score(&es, 8, 100), 250);
    // Full heap, avg above the ceiling.
    assert_eq!(hotness_score(&es, 4, 2), SCALE);
    assert_eq!(hotness_score(&[], 4, 2), 0);
}

#[test]
fn test_overhead_score_saturates() {
    assert_eq!(overhead_score(0, 10_000), 0);
    assert_eq!(overhead_score(2_500, 10_000), 2_500);
    assert_eq!(overhead_score(10_000, 10_000), SCALE);
    assert_eq!(overhead_score(u64::MAX, 10_000), SCALE);
}

#[test]
fn test_combine_extremes() {
    let opts = ScoreOpts::default();

    let worst = combine(0, 0, SCALE, &opts);
    assert_eq!(worst.raw_composite, -1000);
    assert_eq!(worst.normalized_composite, 0);

    let best = combine(SCALE, SCALE, 0, &opts);
    assert_eq!(best.raw_composite, 9000);
    assert_eq!(best.normalized_composite, SCALE);

    let mid = combine(5000, 5000, 5000, &opts);
    // (2000 + 2500 - 500) = 4000 -> (4000 + 1000) * 10000 / 10000
    assert_eq!(mid.raw_composite, 4000);
    assert_eq!(mid.normalized_composite, 5000);
}

#[test]
fn test_scores_stay_in_bounds() {
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..2_000 {
        let opts = ScoreOpts {
            fluc_max: rng.gen_range(1..u64::MAX),
            hit_max: rng.gen_range(1..1_000),
            overhead_max: rng.gen_range(1..100_000),
            weights: Weights {
                vibrate: rng.gen_range(-10_000..10_000),
                hotness: rng.gen_range(-10_000..10_000),
                overhead: rng.gen_range(-10_000..10_000),
            },
        };
        if opts.weights.v_max() <= opts.weights.v_min() {
            continue;
        }

        let mut es = Vec::new();
        for _ in 0..rng.gen_range(0..16) {
            let stamps: Vec<u64> = (1..rng.gen_range(1..8u64))
                .map(|i| i * rng.gen_range(1..u32::MAX as u64))
                .collect();
            es.push(entry(rng.gen_range(1..u32::MAX), &stamps));
        }

        let v = vibrate_score(&es, opts.fluc_max);
        let h = hotness_score(&es, 16, opts.hit_max);
        let o = overhead_score(rng.gen(), opts.overhead_max);
        let m = combine(v, h, o, &opts);

        for s in [v, h, o, m.normalized_composite] {
            assert!(s <= SCALE);
        }
    }
}
