use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{info, warn};

use super::Shared;
use crate::event::Tier;
use crate::ffi::thread_cputime;
use crate::period::quota::{permil, QuotaLoop, Step};
use crate::sample::diag::Diagnostics;
use crate::sample::Drain;
use crate::source::{EventSource, Resolver};

/// Stop flag the workers sleep on.
#[derive(Debug, Default)]
pub(crate) struct Stop {
    stopped: Mutex<bool>,
    cond: Condvar,
}

impl Stop {
    pub fn signal(&self) {
        *self.stopped.lock() = true;
        self.cond.notify_all();
    }

    /// Sleeps up to `timeout` and returns whether the stop flag is set.
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            self.cond.wait_for(&mut stopped, timeout);
        }
        *stopped
    }
}

/// Start of a measurement window of the drain thread's CPU time.
pub(super) struct CpuWindow {
    pub start: Instant,
    pub cputime: Duration,
}

impl CpuWindow {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            cputime: thread_cputime().unwrap_or_default(),
        }
    }

    /// Closes the window at `now` and opens the next one.
    ///
    /// Returns the CPU time spent and the wall time elapsed.
    pub fn roll(&mut self, now: Instant, cputime: Duration) -> (Duration, Duration) {
        let exec = cputime.saturating_sub(self.cputime);
        let elapsed = now.saturating_duration_since(self.start);
        *self = Self {
            start: now,
            cputime,
        };
        (exec, elapsed)
    }
}

pub(crate) fn drain<S: EventSource, R: Resolver>(
    shared: Arc<Shared<S>>,
    mut drain: Drain<S::Stream, R>,
) {
    let opts = &shared.opts;
    let started = Instant::now();
    let mut quota = QuotaLoop::default();
    let mut window = CpuWindow::new();
    let mut report = CpuWindow::new();

    info!(rings = drain.rings().len(), "drain thread started");

    loop {
        drain.pass(shared.sink(), &opts.drain);
        if shared.stop.wait(opts.drain.sleep) {
            break;
        }

        let now = Instant::now();
        if opts.quota.cpu_permil > 0 && now - window.start >= opts.quota.window {
            match thread_cputime() {
                Ok(cputime) => {
                    let (exec, elapsed) = window.roll(now, cputime);
                    let step = quota.observe(exec, elapsed, &opts.quota);
                    if step != Step::Hold {
                        let failed = quota.apply(
                            shared.periods.writer(),
                            shared.periods.adaptive_classes(),
                            &opts.quota,
                        );
                        Diagnostics::add(&shared.diag.period_failures, failed as u64);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to read thread CPU time");
                    window.start = now;
                }
            }
        }

        if now - report.start >= opts.drain.report_interval {
            let coarse_period = match opts.quota.cpu_permil {
                0 => None,
                _ => opts.quota.period(Tier::Base, quota.index()),
            };
            let cpu_permil = match thread_cputime() {
                Ok(cputime) => {
                    let (exec, elapsed) = report.roll(now, cputime);
                    Some(permil(exec, elapsed))
                }
                Err(e) => {
                    warn!(error = %e, "failed to read thread CPU time");
                    report.start = now;
                    None
                }
            };
            drain.report(&shared.diag, coarse_period, cpu_permil);
        }
    }

    let runtime = started.elapsed();
    let cputime = thread_cputime().unwrap_or_default();
    let diag = shared.diag.snapshot();
    info!(
        sampled = diag.sampled,
        throttled = diag.throttled,
        lost = diag.lost,
        runtime_ms = runtime.as_millis() as u64,
        cputime_ms = cputime.as_millis() as u64,
        cpu_permil = permil(cputime, runtime),
        "drain thread stopped"
    );
}

pub(crate) fn adapt<S: EventSource>(shared: Arc<Shared<S>>) {
    while !shared.stop.wait(shared.opts.period.interval) {
        shared.adapt();
    }
}
