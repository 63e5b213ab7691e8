//! Error types for radio control

use thiserror::Error;

/// Errors returned by [`Rig`](crate::Rig) operations
#[derive(Debug, Error)]
pub enum RigError {
    /// No connection is open
    #[error("not connected")]
    NotConnected,

    /// The connection closed before the command resolved
    #[error("connection closed before `{0}` completed")]
    Disconnected(String),

    /// The daemon never finished answering the command
    #[error("`{command}` timed out after {after_ms}ms")]
    Timeout {
        /// Wire command that timed out
        command: String,
        /// Configured timeout
        after_ms: u64,
    },

    /// The daemon answered with a non-zero `RPRT` code
    #[error("`{command}` failed with daemon code {code}")]
    Daemon {
        /// Wire command that failed
        command: String,
        /// Status code (negative Hamlib error number)
        code: i32,
    },

    /// A data line could not be interpreted
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Socket-level failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RigError {
    /// True if the error means the link is gone rather than the command failed
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Disconnected(_) | Self::Io(_))
    }
}
