//! In-memory event source and resolver for tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{Error, ErrorKind, Result};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{EventSource, RecordStream, Resolver};
use crate::event::{EventClass, PerClass};
use crate::sample::rb::Cursor;
use crate::sample::record::{Record, Sample, Task};
use crate::stat::TrackedItem;

#[derive(Debug, Default)]
struct Ring {
    records: VecDeque<Record>,
    head: u64,
    tail: u64,
    size: u64,
}

/// A ring fed by the test, shared with the [`MockSource`] that opened it.
#[derive(Clone, Debug)]
pub struct MockStream(Arc<Mutex<Ring>>);

impl MockStream {
    pub fn new(size: u64) -> Self {
        Self(Arc::new(Mutex::new(Ring {
            size,
            ..Default::default()
        })))
    }

    pub fn push(&self, record: impl Into<Record>) {
        let record = record.into();
        let mut ring = self.0.lock();
        ring.head += record.size() as u64;
        ring.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.0.lock().records.len()
    }
}

impl RecordStream for MockStream {
    fn cursor(&self) -> Cursor {
        let ring = self.0.lock();
        Cursor {
            head: ring.head,
            tail: ring.tail,
            size: ring.size,
        }
    }

    fn pop(&mut self) -> Option<Record> {
        let mut ring = self.0.lock();
        let record = ring.records.pop_front()?;
        ring.tail += record.size() as u64;
        Some(record)
    }
}

pub fn sample(addr: u64, time: u64) -> Record {
    Sample {
        ip: 0x40_1000,
        task: Task { pid: 1, tid: 1 },
        time,
        addr,
    }
    .into()
}

/// Operations a [`MockSource`] can be told to refuse.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    Open,
    Enable,
    Disable,
    SetPeriod,
    Period,
}

#[derive(Debug)]
struct State {
    periods: PerClass<u64>,
    enabled: PerClass<bool>,
    writes: Vec<(EventClass, u64)>,
    failing: HashSet<(EventClass, Op)>,
    missing: HashSet<EventClass>,
    rings: HashMap<(u32, EventClass), MockStream>,
}

pub struct MockSource {
    cpus: Vec<u32>,
    ring_size: u64,
    state: Mutex<State>,
}

impl MockSource {
    pub fn new(cpus: u32) -> Self {
        Self {
            cpus: (0..cpus).collect(),
            ring_size: 4096,
            state: Mutex::new(State {
                periods: PerClass::from_fn(|_| 0),
                enabled: PerClass::from_fn(|_| false),
                writes: Vec::new(),
                failing: HashSet::new(),
                missing: HashSet::new(),
                rings: HashMap::new(),
            }),
        }
    }

    pub fn fail(&self, class: EventClass, op: Op) {
        self.state.lock().failing.insert((class, op));
    }

    pub fn heal(&self, class: EventClass, op: Op) {
        self.state.lock().failing.remove(&(class, op));
    }

    /// Makes `class` unavailable on every CPU.
    pub fn unavailable(&self, class: EventClass) {
        self.state.lock().missing.insert(class);
    }

    /// The ring of `class` on `cpu`, created on first use.
    pub fn ring(&self, cpu: u32, class: EventClass) -> MockStream {
        self.state
            .lock()
            .rings
            .entry((cpu, class))
            .or_insert_with(|| MockStream::new(self.ring_size))
            .clone()
    }

    pub fn is_enabled(&self, class: EventClass) -> bool {
        self.state.lock().enabled[class]
    }

    pub fn current(&self, class: EventClass) -> u64 {
        self.state.lock().periods[class]
    }

    /// Successful period writes, oldest first.
    pub fn writes(&self) -> Vec<(EventClass, u64)> {
        self.state.lock().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state.lock().writes.clear();
    }

    fn check(state: &State, class: EventClass, op: Op) -> Result<()> {
        if state.failing.contains(&(class, op)) {
            Err(Error::new(ErrorKind::PermissionDenied, "mock failure"))
        } else {
            Ok(())
        }
    }
}

impl EventSource for MockSource {
    type Stream = MockStream;

    fn cpus(&self) -> Vec<u32> {
        self.cpus.clone()
    }

    fn open(&self, cpu: u32, class: EventClass) -> Result<Option<MockStream>> {
        {
            let state = self.state.lock();
            Self::check(&state, class, Op::Open)?;
            if state.missing.contains(&class) {
                return Ok(None);
            }
        }
        Ok(Some(self.ring(cpu, class)))
    }

    fn enable(&self, class: EventClass) -> Result<()> {
        let mut state = self.state.lock();
        Self::check(&state, class, Op::Enable)?;
        state.enabled[class] = true;
        Ok(())
    }

    fn disable(&self, class: EventClass) -> Result<()> {
        let mut state = self.state.lock();
        Self::check(&state, class, Op::Disable)?;
        state.enabled[class] = false;
        Ok(())
    }

    fn set_period(&self, class: EventClass, period: u64) -> Result<()> {
        let mut state = self.state.lock();
        Self::check(&state, class, Op::SetPeriod)?;
        state.periods[class] = period;
        state.writes.push((class, period));
        Ok(())
    }

    fn period(&self, class: EventClass) -> Result<u64> {
        let state = self.state.lock();
        Self::check(&state, class, Op::Period)?;
        Ok(state.periods[class])
    }
}

/// Resolves addresses to one item per 4 KiB page.
#[derive(Clone, Default)]
pub struct MapResolver {
    items: Arc<Mutex<HashMap<u64, Arc<TrackedItem>>>>,
    closed: bool,
}

impl MapResolver {
    /// Only resolves pages registered with [`insert`][Self::insert].
    pub fn closed() -> Self {
        Self {
            closed: true,
            ..Default::default()
        }
    }

    pub fn insert(&self, addr: u64) -> Arc<TrackedItem> {
        let page = addr >> 12;
        Arc::clone(
            self.items
                .lock()
                .entry(page)
                .or_insert_with(|| Arc::new(TrackedItem::new(page))),
        )
    }

    pub fn get(&self, addr: u64) -> Option<Arc<TrackedItem>> {
        self.items.lock().get(&(addr >> 12)).cloned()
    }
}

impl Resolver for MapResolver {
    fn resolve(&mut self, addr: u64, _pid: u32, _time: u64) -> Option<Arc<TrackedItem>> {
        if self.closed {
            self.get(addr)
        } else {
            Some(self.insert(addr))
        }
    }
}
