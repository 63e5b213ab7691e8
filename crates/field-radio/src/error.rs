//! Error types for radio sessions

use field_store::{RadioId, StoreError};
use thiserror::Error;

/// Errors from session manager operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// No radio connection with this id exists
    #[error("unknown radio connection {0}")]
    UnknownRadio(RadioId),

    /// The radio connection is disabled
    #[error("radio connection {0} is disabled")]
    Disabled(RadioId),

    /// Store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
