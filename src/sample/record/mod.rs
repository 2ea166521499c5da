//! Records read from a sample ring.
//!
//! Only the kinds the drain loop acts on are decoded; everything else is
//! surfaced as [`Record::Other`] with its raw type and counted.

mod lost;
mod sample;
mod throttle;

pub use lost::*;
pub use sample::*;
pub use throttle::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Task {
    pub pid: u32,
    pub tid: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Record {
    Sample(Box<Sample>),
    Throttle(Throttle),
    Unthrottle(Unthrottle),
    LostSamples(LostSamples),
    /// A record kind the drain loop does not decode, with its raw type.
    Other(u32),
}

impl Record {
    /// Size of the record in the ring, including its header.
    pub fn size(&self) -> u16 {
        // struct perf_event_header { u32 type; u16 misc; u16 size; }
        const HEADER: u16 = 8;
        HEADER
            + match self {
                // ip, pid/tid, time, addr
                Record::Sample(_) => 32,
                // time, id, stream_id
                Record::Throttle(_) | Record::Unthrottle(_) => 24,
                // lost
                Record::LostSamples(_) => 8,
                Record::Other(_) => 0,
            }
    }
}

macro_rules! from {
    ($ty:ident) => {
        impl From<$ty> for super::Record {
            fn from(value: $ty) -> Self {
                Self::$ty(value)
            }
        }
    };
}
use from;
