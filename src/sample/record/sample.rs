use super::{Record, Task};

/// A precise memory-access sample.
///
/// Carries the fields the sampler opens its events with:
/// `PERF_SAMPLE_IP | PERF_SAMPLE_TID | PERF_SAMPLE_TIME | PERF_SAMPLE_ADDR`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sample {
    /// Code address (instruction pointer).
    pub ip: u64,
    pub task: Task,
    /// Timestamp of the access.
    pub time: u64,
    /// Data address.
    pub addr: u64,
}

impl From<Sample> for Record {
    fn from(value: Sample) -> Self {
        Self::Sample(Box::new(value))
    }
}
