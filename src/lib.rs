//! Adaptive sampling controller for hardware memory-access events.
//!
//! Samples of nine memory-access event classes (cache level hits and misses,
//! DRAM and NVM reads, writes) are drained from per-CPU rings, folded into
//! per-item interval statistics and per-class hot item heaps, and scored.
//! The scores drive the sampling period of every class, within a CPU quota
//! for the drain thread and a global budget on the number of samples.
//!
//! The hardware side and the meaning of a sampled address stay with the
//! host: it provides an [`EventSource`](source::EventSource) and a
//! [`Resolver`](source::Resolver).
//!
//! ## Example
//!
//! Run the controller on top of an event source that never produces a
//! record, then read back the per-class view.
//!
//! ```rust
//! use std::collections::HashMap;
//! use std::io::Result;
//! use std::sync::Arc;
//!
//! use mem_sampler::config::Opts;
//! use mem_sampler::controller::Controller;
//! use mem_sampler::event::EventClass;
//! use mem_sampler::sample::rb::Cursor;
//! use mem_sampler::sample::record::Record;
//! use mem_sampler::source::{EventSource, RecordStream, Resolver};
//! use mem_sampler::stat::TrackedItem;
//!
//! struct Idle;
//!
//! impl RecordStream for Idle {
//!     fn cursor(&self) -> Cursor {
//!         Cursor::default()
//!     }
//!
//!     fn pop(&mut self) -> Option<Record> {
//!         None
//!     }
//! }
//!
//! struct Quiet;
//!
//! impl EventSource for Quiet {
//!     type Stream = Idle;
//!
//!     fn cpus(&self) -> Vec<u32> {
//!         vec![0, 1]
//!     }
//!     fn open(&self, _: u32, _: EventClass) -> Result<Option<Idle>> {
//!         Ok(Some(Idle))
//!     }
//!     fn enable(&self, _: EventClass) -> Result<()> {
//!         Ok(())
//!     }
//!     fn disable(&self, _: EventClass) -> Result<()> {
//!         Ok(())
//!     }
//!     fn set_period(&self, _: EventClass, _: u64) -> Result<()> {
//!         Ok(())
//!     }
//!     fn period(&self, _: EventClass) -> Result<u64> {
//!         Ok(5000)
//!     }
//! }
//!
//! // One tracked item per 4 KiB page.
//! #[derive(Default)]
//! struct Pages(HashMap<u64, Arc<TrackedItem>>);
//!
//! impl Resolver for Pages {
//!     fn resolve(&mut self, addr: u64, _pid: u32, _time: u64) -> Option<Arc<TrackedItem>> {
//!         let page = addr >> 12;
//!         let item = self.0.entry(page).or_insert_with(|| Arc::new(TrackedItem::new(page)));
//!         Some(Arc::clone(item))
//!     }
//! }
//!
//! let sampler = Controller::init(Opts::default(), Arc::new(Quiet), Pages::default()).unwrap();
//! sampler.adapt_now(); // Normally done every 10 seconds.
//!
//! for (class, it) in sampler.snapshot().iter() {
//!     println!("{}: {} items, period {}", class, it.heap_size, it.current_period);
//! }
//! sampler.shutdown();
//! ```
//!
//! ## Logging
//!
//! Everything is reported through [`tracing`]; install a subscriber to see it.

pub mod config;
pub mod controller;
pub mod error;
pub mod event;
mod ffi;
pub mod heap;
pub mod period;
pub mod sample;
pub mod score;
pub mod source;
pub mod stat;

pub use error::{Error, Result};
