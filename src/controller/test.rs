use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::worker::CpuWindow;
use super::Controller;
use crate::config::Opts;
use crate::error::Error;
use crate::event::EventClass;
use crate::period::quota::permil;
use crate::source::mock::{sample, MapResolver, MockSource, Op};
use crate::source::EventSource;

const PAGE: u64 = 0x7f12_3400_0000;

fn opts() -> Opts {
    let mut opts = Opts::default();
    opts.heap_capacity = 64;
    opts.drain.sleep = Duration::from_millis(1);
    opts.period.interval = Duration::from_secs(3600);
    opts.quota.cpu_permil = 0;
    opts
}

fn wait_for(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_init_programs_and_enables_classes() {
    let source = Arc::new(MockSource::new(2));
    let c = Controller::init(opts(), Arc::clone(&source), MapResolver::default()).unwrap();

    assert_eq!(c.enabled(), &EventClass::ALL);
    for class in EventClass::ALL {
        assert!(source.is_enabled(class));
        assert_eq!(source.current(class), c.opts().classes[class].initial_period);
    }
    assert_eq!(source.current(EventClass::L1Miss), 500_000);
    assert_eq!(source.current(EventClass::L2Hit), 50_000);
    assert_eq!(source.current(EventClass::NvmRead), 5_000);

    c.shutdown();
    assert!(EventClass::ALL.iter().all(|&class| !source.is_enabled(class)));
}

#[test]
fn test_samples_reach_snapshot() {
    let source = Arc::new(MockSource::new(2));
    let resolver = MapResolver::default();
    let c = Controller::init(opts(), Arc::clone(&source), resolver.clone()).unwrap();

    let dram = source.ring(0, EventClass::DramRead);
    let nvm = source.ring(1, EventClass::NvmRead);
    for t in 1..=10 {
        dram.push(sample(PAGE + (t % 3) * 0x1000, t * 1000));
    }
    nvm.push(sample(PAGE + 0x10_0000, 500));
    wait_for(|| c.diagnostics().sampled == 11);

    let snapshot = c.snapshot();
    let s = snapshot[EventClass::DramRead];
    assert_eq!(s.class, EventClass::DramRead);
    assert_eq!(s.heap_size, 3);
    assert_eq!(s.cumulative_samples, 10);
    assert_eq!(s.current_period, 5_000);
    assert_eq!(snapshot[EventClass::NvmRead].heap_size, 1);
    assert_eq!(snapshot[EventClass::L1Hit].cumulative_samples, 0);

    let diag = c.diagnostics();
    assert_eq!(diag.dram, 10);
    assert_eq!(diag.nvm, 1);
    let stats = resolver.get(PAGE).unwrap().stats().load();
    assert_eq!(stats.sample_count, 3);
    assert_eq!(stats.last_sample_time, 9000);
}

#[test]
fn test_adapt_now_retunes_periods() {
    let source = Arc::new(MockSource::new(1));
    let c = Controller::init(opts(), Arc::clone(&source), MapResolver::default()).unwrap();
    source.clear_writes();

    let cycle = c.adapt_now().unwrap();
    assert_eq!(cycle.adapted, 7);

    let snapshot = c.snapshot();
    let metrics = c.metrics();
    for class in EventClass::ALL {
        assert_eq!(snapshot[class].current_period, source.current(class));
        assert_eq!(snapshot[class].composite_score, metrics[class].normalized_composite);
    }
    assert_eq!(source.current(EventClass::L2Miss), 50_000);
    assert_eq!(source.writes().len(), 7);

    c.shutdown();
    assert_eq!(c.adapt_now(), None);
}

#[test]
fn test_period_failures_are_counted() {
    let source = Arc::new(MockSource::new(1));
    let c = Controller::init(opts(), Arc::clone(&source), MapResolver::default()).unwrap();

    source.fail(EventClass::L3Miss, Op::SetPeriod);
    let cycle = c.adapt_now().unwrap();
    assert_eq!(cycle.failed, 1);
    assert_eq!(c.diagnostics().period_failures, 1);
    assert_eq!(c.snapshot()[EventClass::L3Miss].current_period, 5_000);
}

#[test]
fn test_unavailable_class_stays_disabled() {
    let source = Arc::new(MockSource::new(2));
    source.unavailable(EventClass::NvmRead);
    let c = Controller::init(opts(), Arc::clone(&source), MapResolver::default()).unwrap();

    assert!(!c.enabled().contains(&EventClass::NvmRead));
    assert!(!source.is_enabled(EventClass::NvmRead));
    assert_eq!(c.adapt_now().unwrap().adapted, 6);
}

#[test]
fn test_init_unwinds_on_enable_failure() {
    let source = Arc::new(MockSource::new(1));
    source.fail(EventClass::NvmRead, Op::Enable);

    let err = Controller::init(opts(), Arc::clone(&source), MapResolver::default())
        .err()
        .unwrap();
    assert!(matches!(
        err,
        Error::EventSource {
            class: EventClass::NvmRead,
            op: "enable",
            ..
        }
    ));
    assert!(EventClass::ALL.iter().all(|&class| !source.is_enabled(class)));
}

#[test]
fn test_init_fails_on_open_failure() {
    let source = Arc::new(MockSource::new(4));
    source.fail(EventClass::L3Hit, Op::Open);

    let err = Controller::init(opts(), Arc::clone(&source), MapResolver::default())
        .err()
        .unwrap();
    assert!(matches!(err, Error::EventSource { op: "open", .. }));
    assert!(source.writes().is_empty());
}

#[test]
fn test_init_rejects_invalid_opts() {
    let source = Arc::new(MockSource::new(1));
    let mut opts = opts();
    opts.period.min = opts.period.max + 1;

    let err = Controller::init(opts, Arc::clone(&source), MapResolver::default())
        .err()
        .unwrap();
    assert!(matches!(err, Error::InvalidOpts(_)));
}

#[test]
fn test_shutdown_is_idempotent() {
    let source = Arc::new(MockSource::new(1));
    let c = Controller::init(opts(), Arc::clone(&source), MapResolver::default()).unwrap();
    let ring = source.ring(0, EventClass::MemWrite);
    ring.push(sample(PAGE, 1000));
    ring.push(sample(PAGE, 2000));
    wait_for(|| c.diagnostics().write == 2);

    c.shutdown();
    // Scores are computed once more before the heaps are released.
    let metrics = c.metrics()[EventClass::MemWrite];
    assert!(metrics.hotness_score > 0);
    assert_eq!(c.snapshot()[EventClass::MemWrite].heap_size, 0);

    source.enable(EventClass::L1Hit).unwrap();
    c.shutdown();
    drop(c);
    // Neither the second call nor the drop touched the source again.
    assert!(source.is_enabled(EventClass::L1Hit));
}

#[test]
fn test_drop_shuts_down() {
    let source = Arc::new(MockSource::new(1));
    let c = Controller::init(opts(), Arc::clone(&source), MapResolver::default()).unwrap();
    drop(c);
    assert!(!source.is_enabled(EventClass::DramRead));
}

#[test]
fn test_disable_failure_does_not_stop_shutdown() {
    let source = Arc::new(MockSource::new(1));
    let c = Controller::init(opts(), Arc::clone(&source), MapResolver::default()).unwrap();

    source.fail(EventClass::L1Hit, Op::Disable);
    c.shutdown();
    assert!(source.is_enabled(EventClass::L1Hit));
    assert!(!source.is_enabled(EventClass::MemWrite));
}

#[test]
fn test_report_window_measures_its_own_span() {
    let start = Instant::now();
    let mut report = CpuWindow {
        start,
        cputime: Duration::from_millis(200),
    };

    let now = start + Duration::from_secs(2);
    let (exec, elapsed) = report.roll(now, Duration::from_millis(600));
    assert_eq!(exec, Duration::from_millis(400));
    assert_eq!(elapsed, Duration::from_secs(2));
    assert_eq!(permil(exec, elapsed), 200);

    // The next report only covers the time since this one.
    let now = start + Duration::from_secs(3);
    let (exec, elapsed) = report.roll(now, Duration::from_millis(650));
    assert_eq!(permil(exec, elapsed), 50);
    assert_eq!(report.start, now);
    assert_eq!(report.cputime, Duration::from_millis(650));
}

#[test]
fn test_report_window_tolerates_clock_skew() {
    let start = Instant::now();
    let mut report = CpuWindow {
        start,
        cputime: Duration::from_millis(500),
    };
    let (exec, elapsed) = report.roll(start, Duration::from_millis(100));
    assert_eq!(exec, Duration::ZERO);
    assert_eq!(permil(exec, elapsed), 0);
}
