use thiserror::Error;
use tracing::error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine-level errors. Read/write outcomes that are part of normal MVCC
/// operation (abort, no-version-visible, write-write conflict) are NOT
/// represented here — they flow through [`crate::mvcc::ReadStat`] and
/// [`crate::storage::graph::ProcessStat`] so callers can distinguish an
/// expected abort from a genuine engine fault.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("plan decode error: {0}")]
    InvalidPlan(String),
    #[error("unknown expert type at step {0}")]
    UnknownExpert(usize),
    #[error("corruption detected: {0}")]
    Corruption(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("resource exhausted: {0}")]
    ResourceExhausted(&'static str),
    #[error("validation conflict for {trx}: {reason}")]
    ValidationConflict { trx: String, reason: String },
}

/// Mirrors the teacher's `acquire_lock` helper: poisoned locks are a fatal
/// corruption signal in an in-memory engine, not a recoverable condition.
pub fn lock_poisoned(what: &'static str) -> EngineError {
    error!(%what, "lock poisoned - fatal error");
    EngineError::Corruption(format!("{what} lock poisoned"))
}
