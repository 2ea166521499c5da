use super::EventClass;

/// A "raw" implementation-specific event, as programmed into the PMU.
///
/// Event sources backed by `perf_event_open` open these with
/// `PERF_TYPE_RAW` and precise sampling enabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Raw {
    /// Event config (umask << 8 | event select).
    pub config: u64,
    /// Event config1.
    pub config1: u64,
}

impl Raw {
    const fn new(config: u64) -> Self {
        Self { config, config1: 0 }
    }
}

// Ice Lake server encodings.
// MEM_LOAD_RETIRED.*
const ICL_L1_HIT: u64 = 0x01d1;
const ICL_L2_HIT: u64 = 0x02d1;
const ICL_L3_HIT: u64 = 0x04d1;
const ICL_L1_MISS: u64 = 0x08d1;
const ICL_L2_MISS: u64 = 0x10d1;
const ICL_L3_MISS: u64 = 0x20d1;
const ICL_LOCAL_PMM: u64 = 0x80d1;
// MEM_LOAD_L3_MISS_RETIRED.LOCAL_DRAM
const ICL_LOCAL_DRAM: u64 = 0x01d3;
// MEM_INST_RETIRED.ALL_STORES
const ICL_ALL_STORES: u64 = 0x82d0;

impl From<EventClass> for Raw {
    fn from(class: EventClass) -> Self {
        let config = match class {
            EventClass::L1Hit => ICL_L1_HIT,
            EventClass::L1Miss => ICL_L1_MISS,
            EventClass::L2Hit => ICL_L2_HIT,
            EventClass::L2Miss => ICL_L2_MISS,
            EventClass::L3Hit => ICL_L3_HIT,
            EventClass::L3Miss => ICL_L3_MISS,
            EventClass::DramRead => ICL_LOCAL_DRAM,
            EventClass::NvmRead => ICL_LOCAL_PMM,
            EventClass::MemWrite => ICL_ALL_STORES,
        };
        Raw::new(config)
    }
}
