use thiserror::Error;

use crate::runtime::state::RunState;

/// Problems with the job list itself. Detected while building the queue,
/// before any hook fires.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("malformed block path '{path}': {reason}")]
    MalformedPath { path: String, reason: String },

    #[error("block '{path}' declares parent '{declared}' but its path implies '{expected}'")]
    ParentMismatch {
        path: String,
        declared: String,
        expected: String,
    },

    #[error("block '{path}' references parent '{parent}' which has no jobs")]
    MissingParent { path: String, parent: String },

    #[error("duplicate job for block '{path}' composition {index}")]
    DuplicateJob { path: String, index: u64 },

    #[error("composition {index} of block '{path}' is outside the space of {cardinality}")]
    CompositionOutOfRange {
        path: String,
        index: u64,
        cardinality: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("unknown wildcard dimension '{0}'")]
    UnknownDimension(String),

    #[error("composition space does not fit in a 64-bit ID")]
    Overflow,
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error("cannot resume a run that is {0}")]
    NotPaused(RunState),
}
