use std::time::Duration;

use crate::error::{Error, Result};
use crate::event::{EventClass, PerClass, Tier};

/// Fixed-point scale of every score: `SCALE` means 100%.
pub const SCALE: u32 = 10_000;

macro_rules! invalid {
    ($bool:expr, $msg:literal) => {
        if $bool {
            return Err(Error::InvalidOpts($msg));
        }
    };
}

/// Controller options.
///
/// Every field has the default the sampler was tuned with, so most hosts
/// only need to override the CPU quota or the heap capacity.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Opts {
    /// Capacity of every hot item heap.
    pub heap_capacity: u32,
    pub score: ScoreOpts,
    pub period: PeriodOpts,
    pub quota: QuotaOpts,
    pub drain: DrainOpts,
    pub classes: PerClass<ClassOpts>,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            heap_capacity: 1000,
            score: ScoreOpts::default(),
            period: PeriodOpts::default(),
            quota: QuotaOpts::default(),
            drain: DrainOpts::default(),
            classes: PerClass::default(),
        }
    }
}

/// Normalization ceilings and weights of the score engine.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScoreOpts {
    /// Average fluctuation (Welford M2, ×1024) that maps to a full vibrate score.
    pub fluc_max: u64,
    /// Average hit count that maps to a full hotness score.
    pub hit_max: u64,
    /// Cumulative sample count that maps to a full overhead score.
    pub overhead_max: u64,
    pub weights: Weights,
}

impl Default for ScoreOpts {
    fn default() -> Self {
        Self {
            fluc_max: 20_000_000_000_000_000,
            hit_max: 100,
            overhead_max: 10_000,
            weights: Weights::default(),
        }
    }
}

/// Sub-score weights in units of [`SCALE`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Weights {
    pub vibrate: i32,
    pub hotness: i32,
    /// Usually negative: sampling overhead penalizes the score.
    pub overhead: i32,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            vibrate: 4000,
            hotness: 5000,
            overhead: -1000,
        }
    }
}

impl Weights {
    fn iter(&self) -> [i64; 3] {
        [self.vibrate as _, self.hotness as _, self.overhead as _]
    }

    /// Lowest raw composite reachable with sub-scores in `[0, SCALE]`.
    pub fn v_min(&self) -> i64 {
        self.iter().into_iter().map(|w| w.min(0)).sum()
    }

    /// Highest raw composite reachable with sub-scores in `[0, SCALE]`.
    pub fn v_max(&self) -> i64 {
        self.iter().into_iter().map(|w| w.max(0)).sum()
    }
}

/// An exact rational in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ratio {
    pub num: u64,
    pub den: u64,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeriodOpts {
    /// Period a full score maps to (highest sampling rate).
    pub min: u64,
    /// Period a zero score maps to (lowest sampling rate).
    pub max: u64,
    /// Weight of the target period in the exponential smoothing.
    pub ema: Ratio,
    /// Maximum number of samples across all classes per interval.
    pub budget: u64,
    /// Interval of the per-class adaptive loop.
    pub interval: Duration,
}

impl Default for PeriodOpts {
    fn default() -> Self {
        Self {
            min: 2_000,
            max: 200_000,
            ema: Ratio { num: 3, den: 10 },
            budget: 50_000,
            interval: Duration::from_secs(10),
        }
    }
}

/// Global CPU-quota loop.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QuotaOpts {
    /// CPU quota of the drain thread in permil, 0 disables the loop.
    pub cpu_permil: u64,
    /// Dead band around the quota, in permil.
    pub tolerance_permil: u64,
    /// Measurement window.
    pub window: Duration,
    /// Coarse periods of [`Tier::Base`] classes, finest first.
    pub base_periods: Vec<u64>,
    /// Coarse periods of [`Tier::Instr`] classes, finest first.
    pub instr_periods: Vec<u64>,
}

impl Default for QuotaOpts {
    fn default() -> Self {
        Self {
            cpu_permil: 30,
            tolerance_permil: 5,
            window: Duration::from_secs(15),
            base_periods: vec![5_000, 10_007, 20_011, 40_009, 80_021, 160_001, 200_003],
            instr_periods: vec![
                500_000, 1_000_003, 2_000_003, 4_000_037, 8_000_009, 16_000_057, 20_000_003,
            ],
        }
    }
}

impl QuotaOpts {
    /// Number of coarse steps.
    pub fn steps(&self) -> usize {
        self.base_periods.len()
    }

    /// Coarse period of `tier` at `index`, `None` for fixed classes.
    pub fn period(&self, tier: Tier, index: usize) -> Option<u64> {
        match tier {
            Tier::Base => self.base_periods.get(index).copied(),
            Tier::Instr => self.instr_periods.get(index).copied(),
            Tier::Fixed => None,
        }
    }
}

/// Drain loop pacing and backpressure.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DrainOpts {
    /// Ring fill (percent of the ring size) above which a ring is drained in a tight loop.
    pub high_watermark: u8,
    /// Ring fill (percent of the ring size) below which a ring gets one record per pass.
    pub low_watermark: u8,
    /// Sleep between two drain passes.
    pub sleep: Duration,
    /// Interval of the diagnostics report.
    pub report_interval: Duration,
    /// A milestone line is logged every this many samples.
    pub milestone: u64,
}

impl Default for DrainOpts {
    fn default() -> Self {
        Self {
            high_watermark: 50,
            low_watermark: 10,
            sleep: Duration::from_millis(2),
            report_interval: Duration::from_millis(1500),
            milestone: 500_000,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClassOpts {
    /// Period programmed when the controller starts.
    pub initial_period: u64,
    /// Excludes the class from both period loops.
    pub fixed: bool,
}

impl Default for ClassOpts {
    fn default() -> Self {
        Self {
            initial_period: 5_000,
            fixed: false,
        }
    }
}

impl Default for PerClass<ClassOpts> {
    fn default() -> Self {
        PerClass::from_fn(|class| match class.tier() {
            Tier::Instr => ClassOpts {
                initial_period: 500_000,
                fixed: false,
            },
            Tier::Fixed => ClassOpts {
                initial_period: 50_000,
                fixed: true,
            },
            Tier::Base => ClassOpts::default(),
        })
    }
}

impl Opts {
    pub fn validate(&self) -> Result<()> {
        invalid!(self.heap_capacity == 0, "heap capacity must be positive");

        let s = &self.score;
        invalid!(s.fluc_max == 0, "`score.fluc_max` must be positive");
        invalid!(s.hit_max == 0, "`score.hit_max` must be positive");
        invalid!(s.overhead_max == 0, "`score.overhead_max` must be positive");
        invalid!(
            s.weights.v_max() <= s.weights.v_min(),
            "score weights leave no composite range"
        );

        let p = &self.period;
        invalid!(p.min == 0, "`period.min` must be positive");
        invalid!(p.min >= p.max, "`period.min` must be below `period.max`");
        invalid!(p.ema.den == 0, "`period.ema` has a zero denominator");
        invalid!(p.ema.num > p.ema.den, "`period.ema` must not exceed 1");
        invalid!(p.budget == 0, "`period.budget` must be positive");

        let q = &self.quota;
        invalid!(q.base_periods.is_empty(), "coarse period tables are empty");
        invalid!(
            q.base_periods.len() != q.instr_periods.len(),
            "coarse period tables differ in length"
        );
        invalid!(
            q.base_periods.iter().chain(&q.instr_periods).any(|&p| p == 0),
            "coarse periods must be positive"
        );

        let d = &self.drain;
        invalid!(d.high_watermark > 100, "`drain.high_watermark` is a percentage");
        invalid!(
            d.low_watermark > d.high_watermark,
            "`drain.low_watermark` exceeds `drain.high_watermark`"
        );

        invalid!(
            self.classes.iter().any(|(_, c)| c.initial_period == 0),
            "initial periods must be positive"
        );

        Ok(())
    }

    /// Classes both period loops may retune.
    pub fn adaptive_classes(&self) -> impl Iterator<Item = EventClass> + '_ {
        self.classes
            .iter()
            .filter(|(_, c)| !c.fixed)
            .map(|(class, _)| class)
    }
}
