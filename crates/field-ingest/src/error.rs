//! Error types for contact ingestion

use std::io;

use field_store::StoreError;
use thiserror::Error;

/// Errors from ingesting a datagram or running the listener
///
/// A contact rejected for missing fields is not an error; see
/// [`IngestOutcome::Rejected`](crate::IngestOutcome::Rejected).
#[derive(Debug, Error)]
pub enum IngestError {
    /// Persisting the contact failed for a reason other than a duplicate
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The listen address could not be bound
    #[error("failed to bind UDP listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("UDP I/O error: {0}")]
    Io(#[from] io::Error),
}
