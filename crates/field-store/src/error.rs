//! Error types for the store collaborator

use thiserror::Error;

/// Errors reported by a [`Store`](crate::Store) implementation
///
/// A duplicate dedupe key is *not* an error; it is reported as
/// [`CreateOutcome::Duplicate`](crate::CreateOutcome::Duplicate).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Referenced record does not exist
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Record kind (e.g. "station")
        kind: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// A uniqueness constraint other than the log entry dedupe key failed
    #[error("unique constraint violated: {0}")]
    Conflict(String),

    /// The backing store is unavailable or rejected the write
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
