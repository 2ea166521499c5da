#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Throttle {
    pub time: u64,
    pub id: u64,
    pub stream_id: u64,
}

super::from!(Throttle);

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Unthrottle {
    pub time: u64,
    pub id: u64,
    pub stream_id: u64,
}

super::from!(Unthrottle);
