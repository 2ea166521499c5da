//! Sampling period control.
//!
//! Two loops retune the periods of adaptive classes:
//!
//! * the per-class loop maps each class's composite score to a target period,
//!   smooths it against the period currently programmed and caps the total
//!   projected sample volume with a global budget,
//! * the [`quota`] loop steps a coarse period index to keep the drain
//!   thread within its CPU quota.
//!
//! Both write through [`PeriodWriter`], which serializes writes per class.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arrayvec::ArrayVec;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::{PeriodOpts, Ratio, ScoreOpts, SCALE};
use crate::event::{EventClass, PerClass, CLASS_COUNT};
use crate::heap::EventHeap;
use crate::score::{score, AdaptiveMetrics};
use crate::source::EventSource;

pub mod quota;


/// Inverse-linear mapping of a normalized score onto `[min, max]`.
///
/// A full score maps to `min` (sample the most), a zero score to `max`.
pub fn map_score_to_period(score: u32, opts: &PeriodOpts) -> u64 {
    if score >= SCALE {
        opts.min
    } else if score == 0 {
        opts.max
    } else {
        let range = opts.max - opts.min;
        opts.max - score as u64 * range / SCALE as u64
    }
}

/// `alpha * target + (1 - alpha) * current`, rounded to the nearest integer.
pub fn smooth(current: u64, target: u64, alpha: Ratio) -> u64 {
    let num = alpha.num as u128;
    let den = alpha.den as u128;
    let sum = num * target as u128 + (den - num) * current as u128;
    ((sum + den / 2) / den) as u64
}

/// Per-class input of the overhead budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Projection {
    pub class: EventClass,
    /// Hardware events the class saw during the last interval,
    /// estimated as samples × period in effect.
    pub events: u128,
    /// Proposed period.
    pub period: u64,
}

impl Projection {
    /// Samples the class would produce per interval at its proposed period.
    pub fn volume(&self) -> u128 {
        self.events / self.period.max(1) as u128
    }
}

/// Outcome of [`enforce_budget`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Budget {
    /// The proposed periods fit as they are.
    Within { volume: u128 },
    /// Periods were scaled up to fit.
    Scaled { before: u128, after: u128 },
    /// Even with every class at `max` the volume does not fit; every class
    /// was clamped to `max`.
    Infeasible { before: u128, after: u128 },
}

/// Scales proposed periods up until the projected sample volume fits into
/// `budget`.
///
/// Classes that would pass `max` are pinned there, and the budget they leave
/// is shared among the others by one common factor, so ratios between the
/// classes below `max` are kept. The result may exceed `budget` by one
/// sample per class from rounding.
pub fn enforce_budget(projections: &mut [Projection], budget: u64, max: u64) -> Budget {
    let volume = |ps: &[Projection]| ps.iter().map(Projection::volume).sum::<u128>();
    // Never lower a period that already sits above `max`.
    let ceiling = |p: &Projection| max.max(p.period);

    let total = volume(projections);
    let budget = budget as u128;
    if total <= budget {
        return Budget::Within { volume: total };
    }

    let at_max = projections
        .iter()
        .map(|p| {
            Projection {
                period: ceiling(p),
                ..*p
            }
            .volume()
        })
        .sum::<u128>();
    if at_max > budget {
        for p in projections.iter_mut() {
            p.period = ceiling(p);
        }
        return Budget::Infeasible {
            before: total,
            after: at_max,
        };
    }

    let proposed: Vec<u64> = projections.iter().map(|p| p.period).collect();
    let mut pinned = vec![false; projections.len()];
    // Every round pins at least one more class, or is the last one.
    loop {
        let mut fixed = 0;
        let mut free = 0;
        for ((p, &period), &pin) in projections.iter_mut().zip(&proposed).zip(&pinned) {
            if pin {
                fixed += p.volume();
            } else {
                p.period = period;
                free += p.volume();
            }
        }
        // `fixed` never exceeds `at_max`.
        let room = budget.saturating_sub(fixed);
        if free <= room {
            break;
        }

        let mut again = false;
        for (p, pin) in projections.iter_mut().zip(&mut pinned) {
            if *pin {
                continue;
            }
            // Rounding up keeps the scaled volume at or below its share.
            let scaled = match room {
                0 => u128::MAX,
                _ => (p.period as u128 * free).div_ceil(room),
            };
            if scaled > max as u128 {
                p.period = ceiling(p);
                *pin = true;
                again = true;
            } else {
                p.period = scaled as u64;
            }
        }
        if !again {
            break;
        }
    }

    Budget::Scaled {
        before: total,
        after: volume(projections),
    }
}

/// Serializes period writes to the event source, one lock per class.
///
/// Both period loops call [`set`][Self::set]; the last writer wins, but a
/// write and the bookkeeping of the period in effect never interleave.
pub struct PeriodWriter<S> {
    source: Arc<S>,
    periods: PerClass<Mutex<u64>>,
}

impl<S: EventSource> PeriodWriter<S> {
    pub fn new(source: Arc<S>, initial: impl Fn(EventClass) -> u64) -> Self {
        Self {
            source,
            periods: PerClass::from_fn(|class| Mutex::new(initial(class))),
        }
    }

    /// Programs `period` for `class` on the event source.
    pub fn set(&self, class: EventClass, period: u64) -> io::Result<()> {
        let mut current = self.periods[class].lock();
        self.source.set_period(class, period)?;
        info!(%class, from = *current, to = period, "period updated");
        *current = period;
        Ok(())
    }

    /// Reads the period in effect from the event source.
    pub fn get(&self, class: EventClass) -> io::Result<u64> {
        let mut current = self.periods[class].lock();
        let period = self.source.period(class)?;
        *current = period;
        Ok(period)
    }

    /// Last period successfully written or read.
    pub fn last(&self, class: EventClass) -> u64 {
        *self.periods[class].lock()
    }
}

/// Outcome of one per-class adaptive cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cycle {
    /// Classes whose period was retuned.
    pub adapted: usize,
    /// Classes skipped because the event source failed them.
    pub failed: usize,
    pub budget: Budget,
}

/// The per-class, score-driven period loop.
pub struct PeriodController<S> {
    writer: PeriodWriter<S>,
    opts: PeriodOpts,
    adaptive: ArrayVec<EventClass, CLASS_COUNT>,
    // Sample counters as of the previous cycle.
    last_samples: Mutex<PerClass<u64>>,
}

impl<S: EventSource> PeriodController<S> {
    pub fn new(
        writer: PeriodWriter<S>,
        opts: PeriodOpts,
        adaptive: impl IntoIterator<Item = EventClass>,
    ) -> Self {
        Self {
            writer,
            opts,
            adaptive: adaptive.into_iter().collect(),
            last_samples: Mutex::new(PerClass::from_fn(|_| 0)),
        }
    }

    pub fn writer(&self) -> &PeriodWriter<S> {
        &self.writer
    }

    pub fn adaptive_classes(&self) -> &[EventClass] {
        &self.adaptive
    }

    /// Scores every class and retunes the adaptive ones.
    ///
    /// `metrics` is overwritten for every class; fixed classes only get
    /// their scores and current period filled in.
    pub fn adapt(
        &self,
        heaps: &PerClass<EventHeap>,
        samples: &PerClass<AtomicU64>,
        score_opts: &ScoreOpts,
        metrics: &mut PerClass<AdaptiveMetrics>,
    ) -> Cycle {
        let mut last_samples = self.last_samples.lock();
        let mut projections = ArrayVec::<Projection, CLASS_COUNT>::new();
        let mut failed = 0;

        for class in EventClass::ALL {
            let count = samples[class].load(Ordering::Relaxed);
            let m = &mut metrics[class];
            *m = score(&heaps[class], count, score_opts);
            m.current_period = self.writer.last(class);

            let since_last = count.saturating_sub(last_samples[class]);
            last_samples[class] = count;

            if !self.adaptive.contains(&class) {
                continue;
            }

            m.target_period = map_score_to_period(m.normalized_composite, &self.opts);
            m.current_period = match self.writer.get(class) {
                Ok(period) => period,
                Err(e) => {
                    warn!(%class, error = %e, "failed to read period, class skipped");
                    failed += 1;
                    continue;
                }
            };
            m.smoothed_period = smooth(m.current_period, m.target_period, self.opts.ema);

            debug!(
                %class,
                vibrate = m.vibrate_score,
                hotness = m.hotness_score,
                overhead = m.overhead_score,
                raw = m.raw_composite,
                normalized = m.normalized_composite,
                target = m.target_period,
                current = m.current_period,
                smoothed = m.smoothed_period,
                "class scored"
            );

            projections.push(Projection {
                class,
                events: since_last as u128 * m.current_period as u128,
                period: m.smoothed_period,
            });
        }
        drop(last_samples);

        let budget = enforce_budget(&mut projections, self.opts.budget, self.opts.max);
        match budget {
            Budget::Within { .. } => (),
            Budget::Scaled { before, after } => {
                debug!(before, after, budget = self.opts.budget, "periods scaled to budget")
            }
            Budget::Infeasible { before, after } => {
                warn!(before, after, budget = self.opts.budget, "overhead budget infeasible")
            }
        }

        let mut adapted = 0;
        for p in &projections {
            match self.writer.set(p.class, p.period) {
                Ok(()) => {
                    metrics[p.class].current_period = p.period;
                    adapted += 1;
                }
                Err(e) => {
                    warn!(class = %p.class, period = p.period, error = %e, "failed to set period");
                    failed += 1;
                }
            }
        }

        Cycle {
            adapted,
            failed,
            budget,
        }
    }
}
