//! The sampling controller.
//!
//! [`Controller::init`] opens one ring per (CPU, class), programs the
//! initial periods, enables the classes and starts two threads:
//!
//! * the drain thread runs [`Drain`] passes, the CPU-quota loop and the
//!   periodic report,
//! * the adaptive thread runs the per-class period loop every
//!   [`PeriodOpts::interval`][crate::config::PeriodOpts::interval].
//!
//! [`Controller::shutdown`] (also run on drop) stops both, disables the
//! event source and releases the heaps.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use arrayvec::ArrayVec;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::Opts;
use crate::error::{Error, Result};
use crate::event::{EventClass, PerClass, CLASS_COUNT};
use crate::heap::EventHeap;
use crate::period::{Budget, Cycle, PeriodController, PeriodWriter};
use crate::sample::diag::{DiagSnapshot, Diagnostics};
use crate::sample::{Drain, Ring, Sink};
use crate::score::{score, AdaptiveMetrics};
use crate::source::{EventSource, Resolver};

mod worker;

#[cfg(test)]
mod test;

use worker::Stop;

/// Monitoring view of one class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClassSnapshot {
    pub class: EventClass,
    /// Items currently tracked by the class's heap.
    pub heap_size: usize,
    /// Normalized composite score of the latest cycle.
    pub composite_score: u32,
    pub current_period: u64,
    pub cumulative_samples: u64,
}

/// State shared with the worker threads.
pub(crate) struct Shared<S> {
    opts: Opts,
    heaps: PerClass<EventHeap>,
    samples: PerClass<AtomicU64>,
    metrics: Mutex<PerClass<AdaptiveMetrics>>,
    diag: Diagnostics,
    periods: PeriodController<S>,
    stop: Stop,
}

impl<S: EventSource> Shared<S> {
    fn sink(&self) -> Sink<'_> {
        Sink {
            heaps: &self.heaps,
            samples: &self.samples,
            diag: &self.diag,
        }
    }

    fn adapt(&self) -> Cycle {
        let mut metrics = self.metrics.lock().clone();
        let cycle = self.periods.adapt(
            &self.heaps,
            &self.samples,
            &self.opts.score,
            &mut metrics,
        );
        *self.metrics.lock() = metrics;

        Diagnostics::add(&self.diag.period_failures, cycle.failed as u64);
        if let Budget::Infeasible { .. } = cycle.budget {
            Diagnostics::bump(&self.diag.budget_infeasible);
        }
        info!(
            adapted = cycle.adapted,
            failed = cycle.failed,
            "adaptive cycle done"
        );
        cycle
    }

    /// Scores every class without touching any period.
    fn rescore(&self) {
        let mut metrics = self.metrics.lock();
        for class in EventClass::ALL {
            let samples = self.samples[class].load(Ordering::Relaxed);
            let fresh = score(&self.heaps[class], samples, &self.opts.score);
            let m = &mut metrics[class];
            *m = AdaptiveMetrics {
                target_period: m.target_period,
                smoothed_period: m.smoothed_period,
                current_period: self.periods.writer().last(class),
                ..fresh
            };
            debug!(
                %class,
                vibrate = m.vibrate_score,
                hotness = m.hotness_score,
                overhead = m.overhead_score,
                raw = m.raw_composite,
                normalized = m.normalized_composite,
                "final score"
            );
        }
    }
}

/// Owns the per-class heaps, counters and metrics and the threads that
/// update them.
pub struct Controller<S: EventSource> {
    shared: Arc<Shared<S>>,
    source: Arc<S>,
    enabled: ArrayVec<EventClass, CLASS_COUNT>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    down: AtomicBool,
}

impl<S: EventSource> Controller<S> {
    /// Starts sampling.
    ///
    /// On error everything set up so far is undone: enabled classes are
    /// disabled again, started threads are joined and the heaps are freed.
    pub fn init<R: Resolver>(opts: Opts, source: Arc<S>, resolver: R) -> Result<Self> {
        opts.validate()?;

        let mut heaps = ArrayVec::<_, CLASS_COUNT>::new();
        for class in EventClass::ALL {
            let heap = EventHeap::new(opts.heap_capacity).inspect_err(|_| {
                warn!(%class, capacity = opts.heap_capacity, "failed to create heap");
            })?;
            heaps.push(heap);
        }
        let heaps = heaps
            .into_inner()
            .map_err(|_| Error::Alloc { what: "event heaps" })?;

        let cpus = source.cpus();
        let mut rings = Vec::new();
        rings
            .try_reserve_exact(cpus.len() * CLASS_COUNT)
            .map_err(|_| Error::Alloc { what: "ring table" })?;
        let mut available = PerClass::from_fn(|_| false);
        for &cpu in &cpus {
            for class in EventClass::ALL {
                match source.open(cpu, class) {
                    Ok(Some(stream)) => {
                        rings.push(Ring::new(cpu, class, stream));
                        available[class] = true;
                    }
                    Ok(None) => debug!(cpu, %class, "class not available"),
                    Err(e) => return Err(Error::source_op(class, "open")(e)),
                }
            }
        }

        let writer = PeriodWriter::new(Arc::clone(&source), |class| {
            opts.classes[class].initial_period
        });
        let adaptive: ArrayVec<_, CLASS_COUNT> = opts
            .adaptive_classes()
            .filter(|&class| available[class])
            .collect();
        let periods = PeriodController::new(writer, opts.period.clone(), adaptive);

        let shared = Arc::new(Shared {
            heaps: PerClass(heaps),
            samples: PerClass::from_fn(|_| AtomicU64::new(0)),
            metrics: Mutex::new(PerClass::from_fn(|_| AdaptiveMetrics::default())),
            diag: Diagnostics::default(),
            periods,
            stop: Stop::default(),
            opts,
        });
        let mut controller = Self {
            shared,
            source,
            enabled: ArrayVec::new(),
            workers: Mutex::new(Vec::new()),
            down: AtomicBool::new(false),
        };

        // From here on, dropping `controller` unwinds.
        for class in EventClass::ALL {
            if !available[class] {
                continue;
            }
            let period = controller.shared.opts.classes[class].initial_period;
            controller
                .shared
                .periods
                .writer()
                .set(class, period)
                .map_err(Error::source_op(class, "set_period"))?;
            controller
                .source
                .enable(class)
                .map_err(Error::source_op(class, "enable"))?;
            controller.enabled.push(class);
        }

        let drain = Drain::new(rings, resolver);
        let shared = Arc::clone(&controller.shared);
        controller.spawn("drain", move || worker::drain(shared, drain))?;
        let shared = Arc::clone(&controller.shared);
        controller.spawn("adaptive", move || worker::adapt(shared))?;

        info!(
            cpus = cpus.len(),
            classes = controller.enabled.len(),
            capacity = controller.shared.opts.heap_capacity,
            "sampler started"
        );
        Ok(controller)
    }

    fn spawn<F>(&self, name: &'static str, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(format!("mem-sampler-{name}"))
            .spawn(f)
            .map_err(|source| Error::Spawn { name, source })?;
        self.workers.lock().push(handle);
        Ok(())
    }

    /// Runs one per-class adaptive cycle on the calling thread.
    ///
    /// Returns `None` once the controller is shut down.
    pub fn adapt_now(&self) -> Option<Cycle> {
        if self.down.load(Ordering::Acquire) {
            return None;
        }
        Some(self.shared.adapt())
    }

    /// Per-class view for monitoring.
    pub fn snapshot(&self) -> PerClass<ClassSnapshot> {
        let metrics = self.shared.metrics.lock().clone();
        PerClass::from_fn(|class| ClassSnapshot {
            class,
            heap_size: self.shared.heaps[class].len(),
            composite_score: metrics[class].normalized_composite,
            current_period: self.shared.periods.writer().last(class),
            cumulative_samples: self.shared.samples[class].load(Ordering::Relaxed),
        })
    }

    /// Metrics of the latest cycle.
    pub fn metrics(&self) -> PerClass<AdaptiveMetrics> {
        self.shared.metrics.lock().clone()
    }

    pub fn diagnostics(&self) -> DiagSnapshot {
        self.shared.diag.snapshot()
    }

    pub fn opts(&self) -> &Opts {
        &self.shared.opts
    }

    /// Classes the controller enabled on the event source.
    pub fn enabled(&self) -> &[EventClass] {
        &self.enabled
    }

    /// Stops sampling and releases the heaps.
    ///
    /// Calling it again is a no-op. Every step runs even if an earlier one
    /// failed; failures are logged.
    pub fn shutdown(&self) {
        if self.down.swap(true, Ordering::AcqRel) {
            return;
        }

        self.shared.stop.signal();
        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            let name = handle.thread().name().unwrap_or_default().to_owned();
            if handle.join().is_err() {
                warn!(thread = %name, "worker thread panicked");
            }
        }

        for &class in &self.enabled {
            if let Err(e) = self.source.disable(class) {
                warn!(%class, error = %e, "failed to disable class");
            }
        }

        self.shared.rescore();
        for (class, heap) in self.shared.heaps.iter() {
            info!(%class, size = heap.len(), "final heap size");
            heap.clear();
        }
        info!("sampler stopped");
    }
}

impl<S: EventSource> Drop for Controller<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
