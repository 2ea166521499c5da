//! Global CPU-quota loop.
//!
//! Every window the drain thread's own CPU usage is compared against the
//! configured quota. Above `quota + tolerance` the coarse period index moves
//! one step towards coarser periods, below `quota - tolerance` one step back.

use std::time::Duration;

use tracing::{info, warn};

use super::PeriodWriter;
use crate::config::QuotaOpts;
use crate::event::EventClass;
use crate::source::EventSource;

/// CPU usage in permil of `exec` CPU time over `elapsed` wall time.
pub fn permil(exec: Duration, elapsed: Duration) -> u64 {
    // ns / us = permil
    (exec.as_nanos() / elapsed.as_micros().max(1)) as u64
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Coarser periods, new index.
    Up(usize),
    /// Finer periods, new index.
    Down(usize),
    Hold,
}

#[derive(Clone, Debug, Default)]
pub struct QuotaLoop {
    index: usize,
    /// CPU usage estimate in permil.
    cputime: u64,
}

impl QuotaLoop {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Latest CPU usage estimate, in permil.
    pub fn cputime(&self) -> u64 {
        self.cputime
    }

    /// Feeds one window: `exec` CPU time spent during `elapsed` wall time.
    pub fn observe(&mut self, exec: Duration, elapsed: Duration, opts: &QuotaOpts) -> Step {
        let cur = permil(exec, elapsed);
        self.cputime = if self.cputime == 0 {
            (cur * 8 + self.cputime * 2) / 10
        } else {
            cur
        };

        let last = opts.steps().saturating_sub(1);
        if self.cputime > opts.cpu_permil + opts.tolerance_permil && self.index < last {
            self.index += 1;
            Step::Up(self.index)
        } else if self.cputime + opts.tolerance_permil < opts.cpu_permil && self.index > 0 {
            self.index -= 1;
            Step::Down(self.index)
        } else {
            Step::Hold
        }
    }

    /// Pushes the coarse periods at the current index to `classes`.
    ///
    /// Returns the number of classes the event source refused.
    pub fn apply<S: EventSource>(
        &self,
        writer: &PeriodWriter<S>,
        classes: &[EventClass],
        opts: &QuotaOpts,
    ) -> usize {
        let mut failed = 0;
        for &class in classes {
            let Some(period) = opts.period(class.tier(), self.index) else {
                continue;
            };
            if let Err(e) = writer.set(class, period) {
                warn!(%class, period, error = %e, "failed to set coarse period");
                failed += 1;
            }
        }
        info!(
            index = self.index,
            cputime = self.cputime,
            quota = opts.cpu_permil,
            "coarse sampling period changed"
        );
        failed
    }
}
