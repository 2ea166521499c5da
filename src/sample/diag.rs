use std::sync::atomic::{AtomicU64, Ordering};

use crate::event::EventClass;

macro_rules! counters {
    ($($(#[$meta:meta])* $field:ident),+ $(,)?) => {
        /// Drain loop counters.
        ///
        /// Written by the drain thread, readable from anywhere.
        #[derive(Debug, Default)]
        pub struct Diagnostics {
            $($(#[$meta])* pub(crate) $field: AtomicU64,)+
        }

        /// Point-in-time copy of [`Diagnostics`].
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub struct DiagSnapshot {
            $($(#[$meta])* pub $field: u64,)+
        }

        impl Diagnostics {
            pub fn snapshot(&self) -> DiagSnapshot {
                DiagSnapshot {
                    $($field: self.$field.load(Ordering::Relaxed),)+
                }
            }
        }
    };
}

counters! {
    /// Samples accepted into the statistics.
    sampled,
    dram,
    nvm,
    write,
    /// Throttle and unthrottle records.
    throttled,
    lost,
    /// Records of a kind the drain loop does not decode.
    unknown,
    /// Visits of an empty ring.
    skipped,
    /// Samples whose address failed the reportable filter.
    unreportable,
    /// Samples the resolver had no item for.
    unresolved,
    /// Samples with a timestamp at or before the item's last one.
    out_of_order,
    /// Period reads and writes the event source refused.
    period_failures,
    /// Adaptive cycles whose overhead budget could not be met.
    budget_infeasible,
}

impl Diagnostics {
    pub(crate) fn bump(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

/// Drain-local counters reset by milestones and reports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Window {
    pub dram: u64,
    pub nvm: u64,
    pub write: u64,
    /// DRAM reads since the last report.
    pub hr_dram: u64,
    /// NVM reads since the last report.
    pub hr_nvm: u64,
}

impl Window {
    pub fn count(&mut self, class: EventClass) {
        match class {
            EventClass::DramRead => {
                self.dram += 1;
                self.hr_dram += 1;
            }
            EventClass::NvmRead => {
                self.nvm += 1;
                self.hr_nvm += 1;
            }
            EventClass::MemWrite => self.write += 1,
            _ => (),
        }
    }

    /// Share of fast-tier reads since the last report, ×10000.
    pub fn hit_ratio(&self) -> u64 {
        match self.hr_dram + self.hr_nvm {
            0 => 0,
            total => self.hr_dram * 10_000 / total,
        }
    }
}
