//! The sample drain.
//!
//! One pass visits every (CPU, class) ring in order. A ring below its low
//! watermark gives up one record per pass; a ring above its high watermark
//! is drained in a tight loop until it falls below the low watermark again,
//! so that a busy ring does not overflow and lose records.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};

use crate::config::DrainOpts;
use crate::event::{EventClass, PerClass};
use crate::heap::EventHeap;
use crate::source::{RecordStream, Resolver};
use crate::stat::Update;

pub mod diag;
pub mod rb;
pub mod record;


use diag::{Diagnostics, Window};
use rb::Backpressure;
use record::{Record, Sample};

/// Where accepted samples go.
#[derive(Clone, Copy)]
pub struct Sink<'a> {
    pub heaps: &'a PerClass<EventHeap>,
    pub samples: &'a PerClass<AtomicU64>,
    pub diag: &'a Diagnostics,
}

pub struct Ring<T> {
    pub cpu: u32,
    pub class: EventClass,
    stream: T,
    pressure: Backpressure,
}

impl<T: RecordStream> Ring<T> {
    pub fn new(cpu: u32, class: EventClass, stream: T) -> Self {
        Self {
            cpu,
            class,
            stream,
            pressure: Backpressure::default(),
        }
    }
}

/// Totals of one drain pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Pass {
    /// Records consumed.
    pub records: u64,
    /// Rings that had nothing to consume.
    pub empty: u64,
}

pub struct Drain<T, R> {
    rings: Vec<Ring<T>>,
    resolver: R,
    window: Window,
}

impl<T: RecordStream, R: Resolver> Drain<T, R> {
    pub fn new(rings: Vec<Ring<T>>, resolver: R) -> Self {
        Self {
            rings,
            resolver,
            window: Window::default(),
        }
    }

    pub fn rings(&self) -> &[Ring<T>] {
        &self.rings
    }

    /// Visits every ring once, honoring its backpressure state.
    pub fn pass(&mut self, sink: Sink<'_>, opts: &DrainOpts) -> Pass {
        let mut pass = Pass::default();

        for ring in &mut self.rings {
            loop {
                let cursor = ring.stream.cursor();
                if cursor.is_empty() {
                    Diagnostics::bump(&sink.diag.skipped);
                    pass.empty += 1;
                    break;
                }

                let again = ring
                    .pressure
                    .update(&cursor, opts.high_watermark, opts.low_watermark);

                let Some(record) = ring.stream.pop() else {
                    break;
                };
                pass.records += 1;
                dispatch(
                    ring.class,
                    record,
                    &mut self.resolver,
                    &mut self.window,
                    sink,
                    opts,
                );

                if !again {
                    break;
                }
            }
        }

        pass
    }

    /// Logs the periodic report and starts a new hit ratio window.
    ///
    /// `cpu_permil` is the drain thread's CPU usage since the last report.
    pub fn report(
        &mut self,
        diag: &Diagnostics,
        coarse_period: Option<u64>,
        cpu_permil: Option<u64>,
    ) {
        info!(
            sampled = diag.sampled.load(Ordering::Relaxed),
            sample_period = coarse_period,
            cpu_permil,
            hit_ratio = self.window.hit_ratio(),
            "sampling report"
        );
        self.window.hr_dram = 0;
        self.window.hr_nvm = 0;
    }
}

fn dispatch<R: Resolver>(
    class: EventClass,
    record: Record,
    resolver: &mut R,
    window: &mut Window,
    sink: Sink<'_>,
    opts: &DrainOpts,
) {
    let diag = sink.diag;
    match record {
        Record::Sample(sample) => {
            if accept(class, &sample, resolver, sink) {
                window.count(class);
                let sampled = Diagnostics::bump(&diag.sampled);
                if opts.milestone > 0 && sampled % opts.milestone == 0 {
                    info!(
                        sampled,
                        dram = window.dram,
                        nvm = window.nvm,
                        write = window.write,
                        throttled = diag.throttled.load(Ordering::Relaxed),
                        "sampling milestone"
                    );
                    window.dram = 0;
                    window.nvm = 0;
                    window.write = 0;
                }
            }
        }
        Record::Throttle(_) | Record::Unthrottle(_) => {
            Diagnostics::bump(&diag.throttled);
        }
        Record::LostSamples(lost) => {
            Diagnostics::bump(&diag.lost);
            debug!(%class, lost = lost.lost_samples, "samples lost");
        }
        Record::Other(ty) => {
            Diagnostics::bump(&diag.unknown);
            debug!(%class, ty, "unexpected record kind skipped");
        }
    }
}

/// Folds one sample into the statistics; false if it was dropped.
fn accept<R: Resolver>(
    class: EventClass,
    sample: &Sample,
    resolver: &mut R,
    sink: Sink<'_>,
) -> bool {
    if !resolver.is_reportable(sample.addr) {
        Diagnostics::bump(&sink.diag.unreportable);
        return false;
    }
    let Some(item) = resolver.resolve(sample.addr, sample.task.pid, sample.time) else {
        Diagnostics::bump(&sink.diag.unresolved);
        return false;
    };

    if item.stats().update(sample.time) == Update::OutOfOrder {
        Diagnostics::bump(&sink.diag.out_of_order);
    }
    sink.samples[class].fetch_add(1, Ordering::Relaxed);
    sink.heaps[class].record_hit(&item);

    match class {
        EventClass::DramRead => Diagnostics::bump(&sink.diag.dram),
        EventClass::NvmRead => Diagnostics::bump(&sink.diag.nvm),
        EventClass::MemWrite => Diagnostics::bump(&sink.diag.write),
        _ => 0,
    };
    true
}
