//! Bounded hot item heaps.
//!
//! One min-heap per event class, keyed by how often the class sampled an
//! item. A hit only ever sifts its entry up, so an entry that is bumped
//! while sitting at the root stays there; admission into a full heap only
//! looks at the root.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::{Error, Result};
use crate::stat::TrackedItem;


#[derive(Clone, Debug)]
pub struct HeapEntry {
    pub item: Arc<TrackedItem>,
    pub hit_count: u32,
}

/// Outcome of [`EventHeap::record_hit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Hit {
    /// The item was tracked already; carries its new hit count.
    Updated(u32),
    /// The item was appended.
    Inserted,
    /// The heap was full and the item took the place of a zero-hit root.
    Replaced,
    /// The heap was full and the item could not outrank the root.
    Discarded,
}

pub struct EventHeap {
    entries: Mutex<Vec<HeapEntry>>,
    capacity: usize,
}

impl EventHeap {
    pub fn new(capacity: u32) -> Result<Self> {
        let capacity = capacity as usize;
        let mut entries = Vec::new();
        entries
            .try_reserve_exact(capacity)
            .map_err(|_| Error::Alloc { what: "event heap" })?;

        Ok(Self {
            entries: Mutex::new(entries),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counts one sample of `item` against this heap.
    pub fn record_hit(&self, item: &Arc<TrackedItem>) -> Hit {
        let mut entries = self.entries.lock();

        if let Some(idx) = entries.iter().position(|e| Arc::ptr_eq(&e.item, item)) {
            let hit_count = entries[idx].hit_count.saturating_add(1);
            entries[idx].hit_count = hit_count;
            // Only sifted up: a bumped entry never moves towards the leaves.
            sift_up(&mut entries, idx);
            trace!(key = item.key(), hit_count, "heap: update");
            return Hit::Updated(hit_count);
        }

        if entries.len() < self.capacity {
            entries.push(HeapEntry {
                item: Arc::clone(item),
                hit_count: 1,
            });
            let idx = entries.len() - 1;
            sift_up(&mut entries, idx);
            trace!(key = item.key(), size = entries.len(), "heap: insert");
            return Hit::Inserted;
        }

        match entries.first_mut() {
            Some(root) if root.hit_count < 1 => {
                *root = HeapEntry {
                    item: Arc::clone(item),
                    hit_count: 1,
                };
                sift_down(&mut entries, 0);
                trace!(key = item.key(), "heap: replace cold root");
                Hit::Replaced
            }
            root => {
                trace!(
                    key = item.key(),
                    root_hits = root.map(|r| r.hit_count),
                    "heap: full, discard"
                );
                Hit::Discarded
            }
        }
    }

    /// Runs `f` over the entries in heap order while holding the heap lock.
    ///
    /// The guard is scoped to this call, so the lock is released even if `f`
    /// unwinds.
    pub fn with_entries<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&[HeapEntry]) -> R,
    {
        let entries = self.entries.lock();
        f(&entries)
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.clear();
        entries.shrink_to_fit();
    }
}

fn parent(idx: usize) -> usize {
    (idx - 1) / 2
}

fn sift_up(entries: &mut [HeapEntry], mut idx: usize) {
    while idx > 0 {
        let p = parent(idx);
        if entries[idx].hit_count >= entries[p].hit_count {
            break;
        }
        entries.swap(idx, p);
        idx = p;
    }
}

fn sift_down(entries: &mut [HeapEntry], mut idx: usize) {
    let len = entries.len();
    loop {
        let mut child = 2 * idx + 1;
        if child >= len {
            break;
        }
        let right = child + 1;
        if right < len && entries[right].hit_count < entries[child].hit_count {
            child = right;
        }
        if entries[idx].hit_count <= entries[child].hit_count {
            break;
        }
        entries.swap(idx, child);
        idx = child;
    }
}
