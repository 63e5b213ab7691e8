//! Error types for the relay server

use std::io;

use thiserror::Error;

/// Errors that stop the relay server
#[derive(Debug, Error)]
pub enum RelayError {
    /// The listen address could not be bound
    #[error("failed to bind relay listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("relay I/O error: {0}")]
    Io(#[from] io::Error),
}
