//! Collaborators of the controller.
//!
//! The hardware side is an [`EventSource`]: it programs one event per class
//! on every CPU and hands out a [`RecordStream`] per (CPU, class) ring. The
//! item side is a [`Resolver`] that turns a sampled address into the
//! [`TrackedItem`] its statistics belong to.

use std::io::Result;
use std::sync::Arc;

use crate::event::EventClass;
use crate::ffi::user_space_addr;
use crate::sample::rb::Cursor;
use crate::sample::record::Record;
use crate::stat::TrackedItem;

#[cfg(test)]
pub(crate) mod mock;

/// Hardware event source.
///
/// All methods may be called concurrently from the drain thread and the
/// adaptive loop; implementations must be internally synchronized.
pub trait EventSource: Send + Sync + 'static {
    type Stream: RecordStream;

    /// CPUs to sample on.
    fn cpus(&self) -> Vec<u32>;

    /// Opens the ring of `class` on `cpu`.
    ///
    /// `Ok(None)` means the class is not available on that CPU.
    fn open(&self, cpu: u32, class: EventClass) -> Result<Option<Self::Stream>>;

    fn enable(&self, class: EventClass) -> Result<()>;

    fn disable(&self, class: EventClass) -> Result<()>;

    fn set_period(&self, class: EventClass, period: u64) -> Result<()>;

    fn period(&self, class: EventClass) -> Result<u64>;
}

/// A bounded ring of records, consumed by the drain thread only.
pub trait RecordStream: Send + 'static {
    /// Current producer/consumer positions.
    fn cursor(&self) -> Cursor;

    /// Consumes the record at the tail, if any.
    fn pop(&mut self) -> Option<Record>;
}

/// Maps sampled addresses to tracked items.
pub trait Resolver: Send + 'static {
    /// Returns the item `addr` of `pid` belongs to, registering it if needed.
    ///
    /// `None` drops the sample.
    fn resolve(&mut self, addr: u64, pid: u32, time: u64) -> Option<Arc<TrackedItem>>;

    /// Address filter applied before any processing.
    fn is_reportable(&self, addr: u64) -> bool {
        user_space_addr(addr)
    }
}
