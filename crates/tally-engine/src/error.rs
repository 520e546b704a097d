//! Error types for the store seam and the engine.

use std::fmt;

use tally_ledger::ValidationError;

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

/// Errors a [`crate::LedgerStore`] implementation may return.
#[derive(Debug)]
pub enum StoreError {
    /// The balance document moved since it was read (optimistic concurrency).
    Conflict { uid: String },
    /// An event with this id is already recorded.
    DuplicateEvent { id: String },
    /// The commit would push a stored total out of range.
    Invalid(ValidationError),
    /// Anything else: connectivity, decode, schema.
    Backend(anyhow::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Conflict { uid } => write!(f, "balance document for '{uid}' changed concurrently"),
            StoreError::DuplicateEvent { id } => write!(f, "event '{id}' already recorded"),
            StoreError::Invalid(err) => write!(f, "rejected by store: {err}"),
            StoreError::Backend(err) => write!(f, "store backend error: {err:#}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        StoreError::Backend(err)
    }
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

/// Errors surfaced by [`crate::Engine`] operations.
#[derive(Debug)]
pub enum EngineError {
    /// Rejected before any transaction started.
    Invalid(ValidationError),
    /// Every attempt lost the optimistic-concurrency race.
    Conflict { uid: String, attempts: u32 },
    /// Resubmission of an already recorded event.
    DuplicateEvent { id: String },
    Store(anyhow::Error),
}

impl EngineError {
    /// Whether the caller may resubmit unchanged and reasonably expect success.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Conflict { .. })
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Invalid(err) => write!(f, "invalid input: {err}"),
            EngineError::Conflict { uid, attempts } => write!(
                f,
                "transaction conflict for '{uid}' after {attempts} attempts; retry later"
            ),
            EngineError::DuplicateEvent { id } => write!(f, "duplicate event '{id}'"),
            EngineError::Store(err) => write!(f, "store error: {err:#}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Invalid(err)
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { uid } => EngineError::Conflict { uid, attempts: 1 },
            StoreError::DuplicateEvent { id } => EngineError::DuplicateEvent { id },
            StoreError::Invalid(err) => EngineError::Invalid(err),
            StoreError::Backend(err) => EngineError::Store(err),
        }
    }
}
