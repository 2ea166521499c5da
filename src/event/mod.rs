use std::fmt;

pub mod raw;

pub use raw::Raw;


/// Number of event classes.
pub const CLASS_COUNT: usize = 9;

/// Hardware memory-access event class.
///
/// Each class is sampled by its own hardware event on every CPU and owns
/// its own hot item heap, sample counter and adaptive metrics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventClass {
    L1Hit,
    L1Miss,
    L2Hit,
    L2Miss,
    L3Hit,
    L3Miss,
    DramRead,
    /// Read served by the slow (NVM) tier.
    NvmRead,
    MemWrite,
}

/// How the global CPU-quota loop treats a class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Tier {
    /// Follows the base coarse period table.
    Base,
    /// Follows the instruction coarse period table.
    ///
    /// These events fire on almost every memory instruction, so they need
    /// periods about two orders of magnitude above the base tier.
    Instr,
    /// Never retuned by the CPU-quota loop.
    Fixed,
}

impl EventClass {
    pub const ALL: [EventClass; CLASS_COUNT] = [
        EventClass::L1Hit,
        EventClass::L1Miss,
        EventClass::L2Hit,
        EventClass::L2Miss,
        EventClass::L3Hit,
        EventClass::L3Miss,
        EventClass::DramRead,
        EventClass::NvmRead,
        EventClass::MemWrite,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub const fn tier(self) -> Tier {
        match self {
            EventClass::L1Hit | EventClass::L1Miss | EventClass::MemWrite => Tier::Instr,
            EventClass::L2Hit | EventClass::L2Miss => Tier::Fixed,
            EventClass::L3Hit | EventClass::L3Miss | EventClass::DramRead | EventClass::NvmRead => {
                Tier::Base
            }
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            EventClass::L1Hit => "L1_HIT",
            EventClass::L1Miss => "L1_MISS",
            EventClass::L2Hit => "L2_HIT",
            EventClass::L2Miss => "L2_MISS",
            EventClass::L3Hit => "L3_HIT",
            EventClass::L3Miss => "L3_MISS",
            EventClass::DramRead => "DRAM_READ",
            EventClass::NvmRead => "NVM_READ",
            EventClass::MemWrite => "MEM_WRITE",
        }
    }
}

impl fmt::Display for EventClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed-size table indexed by [`EventClass`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PerClass<T>(pub [T; CLASS_COUNT]);

impl<T> PerClass<T> {
    pub fn from_fn(mut f: impl FnMut(EventClass) -> T) -> Self {
        Self(std::array::from_fn(|i| f(EventClass::ALL[i])))
    }

    pub fn iter(&self) -> impl Iterator<Item = (EventClass, &T)> {
        EventClass::ALL.into_iter().zip(self.0.iter())
    }
}

impl<T> std::ops::Index<EventClass> for PerClass<T> {
    type Output = T;

    fn index(&self, class: EventClass) -> &T {
        &self.0[class.index()]
    }
}

impl<T> std::ops::IndexMut<EventClass> for PerClass<T> {
    fn index_mut(&mut self, class: EventClass) -> &mut T {
        &mut self.0[class.index()]
    }
}
