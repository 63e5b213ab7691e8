//! The radio-control abstraction shared by real and simulated rigs

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::RigError;
use crate::protocol::CapabilityKind;

/// Mode and passband as reported by a rig
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeSetting {
    pub mode: String,
    /// Passband in Hz, `0` when the rig did not report one
    pub passband_hz: u32,
}

/// Capability lists enumerated from a rig
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RigCapabilities {
    pub modes: Vec<String>,
    pub levels: Vec<String>,
    pub functions: Vec<String>,
    pub parameters: Vec<String>,
}

impl RigCapabilities {
    /// Mutable list for a capability kind
    pub fn list_mut(&mut self, kind: CapabilityKind) -> &mut Vec<String> {
        match kind {
            CapabilityKind::Modes => &mut self.modes,
            CapabilityKind::Levels => &mut self.levels,
            CapabilityKind::Functions => &mut self.functions,
            CapabilityKind::Parameters => &mut self.parameters,
        }
    }
}

/// State read in one polling pass
///
/// Each field is independent: a failed read leaves it `None` and records the
/// first failure in `error`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RigSnapshot {
    pub frequency_hz: Option<u64>,
    pub mode: Option<ModeSetting>,
    pub power_pct: Option<u8>,
    pub error: Option<String>,
}

impl RigSnapshot {
    /// True if no field could be read
    pub fn is_empty(&self) -> bool {
        self.frequency_hz.is_none() && self.mode.is_none() && self.power_pct.is_none()
    }

    fn take<T>(&mut self, result: Result<T, RigError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                if self.error.is_none() {
                    self.error = Some(e.to_string());
                }
                None
            }
        }
    }
}

/// Split a capability reply line into tokens
pub fn capability_tokens(line: &str) -> Vec<String> {
    line.split_whitespace()
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Radio-control operations
///
/// Every method takes `&self`; implementations serialise access internally so
/// a rig can be shared between a poller and other callers.
pub trait Rig: Send + Sync + 'static {
    /// Open the connection; `false` if it could not be established
    fn connect(&self) -> impl Future<Output = bool> + Send;

    /// Close the connection and abandon queued commands
    fn disconnect(&self) -> impl Future<Output = ()> + Send;

    /// Whether the connection is currently usable
    fn is_connected(&self) -> bool;

    fn frequency(&self) -> impl Future<Output = Result<u64, RigError>> + Send;

    fn set_frequency(&self, hz: u64) -> impl Future<Output = Result<(), RigError>> + Send;

    fn mode(&self) -> impl Future<Output = Result<ModeSetting, RigError>> + Send;

    fn set_mode(
        &self,
        mode: &str,
        passband_hz: u32,
    ) -> impl Future<Output = Result<(), RigError>> + Send;

    /// RF power as a percentage
    fn power(&self) -> impl Future<Output = Result<u8, RigError>> + Send;

    /// Set RF power from a percentage (clamped to 0-100)
    fn set_power(&self, percent: f64) -> impl Future<Output = Result<(), RigError>> + Send;

    fn ptt(&self) -> impl Future<Output = Result<bool, RigError>> + Send;

    fn set_ptt(&self, on: bool) -> impl Future<Output = Result<(), RigError>> + Send;

    fn vfo(&self) -> impl Future<Output = Result<String, RigError>> + Send;

    fn set_vfo(&self, vfo: &str) -> impl Future<Output = Result<(), RigError>> + Send;

    /// Rig identification string
    fn info(&self) -> impl Future<Output = Result<String, RigError>> + Send;

    /// Enumerate supported modes, levels, functions and parameters
    fn capabilities(&self) -> impl Future<Output = Result<RigCapabilities, RigError>> + Send;

    /// Send a command verbatim and return its data lines
    fn raw(
        &self,
        command: &str,
        expected_lines: usize,
        silent_ok: bool,
    ) -> impl Future<Output = Result<Vec<String>, RigError>> + Send;

    /// Read frequency, mode and power concurrently
    fn snapshot(&self) -> impl Future<Output = RigSnapshot> + Send {
        async move {
            let (frequency, mode, power) = tokio::join!(self.frequency(), self.mode(), self.power());
            let mut snapshot = RigSnapshot::default();
            snapshot.frequency_hz = snapshot.take(frequency);
            snapshot.mode = snapshot.take(mode);
            snapshot.power_pct = snapshot.take(power);
            snapshot
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_keeps_first_error() {
        let mut snapshot = RigSnapshot::default();
        assert_eq!(snapshot.take::<u64>(Err(RigError::NotConnected)), None);
        assert_eq!(
            snapshot.take::<u8>(Err(RigError::InvalidResponse("x".into()))),
            None
        );
        assert_eq!(snapshot.error.as_deref(), Some("not connected"));
        assert!(snapshot.is_empty());
    }

    #[test]
    fn capability_lines_split_on_whitespace() {
        assert_eq!(
            capability_tokens(" AM CW  USB\tLSB "),
            vec!["AM", "CW", "USB", "LSB"]
        );
    }
}
