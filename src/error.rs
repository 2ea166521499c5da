use std::io;

use thiserror::Error;

use crate::event::EventClass;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Heap or per-CPU structures could not be allocated.
    #[error("failed to allocate {what}")]
    Alloc { what: &'static str },

    /// The event source rejected an operation on a class.
    #[error("event source rejected `{op}` for {class}")]
    EventSource {
        class: EventClass,
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("invalid option: {0}")]
    InvalidOpts(&'static str),

    #[error("failed to spawn `{name}` thread")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn source_op(class: EventClass, op: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::EventSource { class, op, source }
    }
}
