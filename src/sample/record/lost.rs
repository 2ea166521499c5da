// Generated when samples were dropped because the ring had no space
// or was paused.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LostSamples {
    pub lost_samples: u64,
}

super::from!(LostSamples);
