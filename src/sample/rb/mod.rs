//! Ring buffer fill tracking.
//!
//! A ring is described by two free-running byte positions: the producer
//! writes at `head`, the drain loop consumes at `tail`. Their difference is
//! the number of bytes waiting, independent of how the ring is laid out in
//! memory.

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cursor {
    pub head: u64,
    pub tail: u64,
    /// Ring capacity in bytes.
    pub size: u64,
}

impl Cursor {
    /// Bytes waiting to be consumed.
    pub fn pending(&self) -> u64 {
        self.head.wrapping_sub(self.tail)
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }
}

/// Hysteresis between the two watermarks of a ring.
///
/// Once a ring fills past the high watermark it is drained in a tight loop
/// until it falls below the low watermark; in between, the previous
/// decision holds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Backpressure {
    draining: bool,
}

impl Backpressure {
    /// Updates the decision from the current fill and returns whether the
    /// ring should be drained again before moving on.
    pub fn update(&mut self, cursor: &Cursor, high_pct: u8, low_pct: u8) -> bool {
        let pending = cursor.pending() as u128;
        let size = cursor.size as u128;
        if pending * 100 > size * high_pct as u128 {
            self.draining = true;
        } else if pending * 100 < size * low_pct as u128 {
            self.draining = false;
        }
        self.draining
    }

    pub fn is_draining(&self) -> bool {
        self.draining
    }
}
