//! Records exchanged with the store

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a station record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StationId(pub u64);

impl StationId {
    /// Get the raw identifier value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for StationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a radio connection record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RadioId(pub String);

impl RadioId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RadioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a persisted log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogEntryId(pub u64);

/// A station (operating position) known to the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    pub id: StationId,
    /// Callsign as announced by the station
    pub callsign: String,
    /// Display name (defaults to the callsign)
    pub name: String,
}

/// How the gateway reaches a radio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    /// A `rigctld` daemon over TCP
    #[default]
    Rigctld,
    /// The in-memory simulator (no network I/O)
    Simulated,
}

/// Live state snapshot of a radio, as last observed
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RadioState {
    /// Dial frequency in Hz
    pub frequency_hz: Option<u64>,
    /// Mode token reported by the daemon (e.g. "USB", "PKTUSB")
    pub mode: Option<String>,
    /// Passband width in Hz
    pub passband_hz: Option<u32>,
    /// RF power as a percentage (0-100)
    pub power_pct: Option<u8>,
    /// Whether the gateway currently holds a working connection
    pub connected: bool,
    /// Last failure, cleared on the next successful poll
    pub last_error: Option<String>,
    /// When the radio last answered
    pub last_seen: Option<DateTime<Utc>>,
}

/// A configured radio connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadioConnection {
    pub id: RadioId,
    /// Human-readable name
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub kind: ConnectionKind,
    /// Disabled connections are never started
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Last persisted state
    #[serde(default)]
    pub state: RadioState,
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl RadioConnection {
    /// Create an enabled `rigctld` connection with the default poll interval
    pub fn rigctld(id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        let id = RadioId::new(id);
        Self {
            name: id.0.clone(),
            id,
            host: host.into(),
            port,
            kind: ConnectionKind::Rigctld,
            enabled: true,
            poll_interval_ms: default_poll_interval_ms(),
            state: RadioState::default(),
        }
    }

    /// Create an enabled simulated connection
    pub fn simulated(id: impl Into<String>) -> Self {
        Self {
            kind: ConnectionKind::Simulated,
            ..Self::rigctld(id, "simulator", 0)
        }
    }

    /// Remote address as `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Band/mode (plus optional radio detail) to record for a station
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BandActivityUpdate {
    pub band: String,
    pub mode: String,
    pub frequency_hz: Option<u64>,
    pub power_pct: Option<u8>,
}

impl BandActivityUpdate {
    pub fn new(band: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            band: band.into(),
            mode: mode.into(),
            ..Default::default()
        }
    }
}

/// A persisted band activity row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandActivity {
    pub id: u64,
    pub station_id: StationId,
    pub band: String,
    pub mode: String,
    pub frequency_hz: Option<u64>,
    pub power_pct: Option<u8>,
    pub recorded_at: DateTime<Utc>,
}

/// Network reachability of a station
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub station_id: StationId,
    pub connected: bool,
    /// Last known peer address
    pub ip: Option<String>,
    /// Last time the station was seen connected
    pub last_connected: Option<DateTime<Utc>>,
}

/// Operator-to-operator message relayed between logging clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorMessage {
    pub from_station: StationId,
    pub from_call: String,
    /// Recipient callsign, `ALL` for broadcasts
    pub to_call: String,
    pub content: String,
}

/// Severity of a context event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContextLevel {
    Info,
    Warn,
    Error,
}

/// Operational event attached to a station's timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEvent {
    /// Station the event concerns, if any
    pub station_id: Option<StationId>,
    pub level: ContextLevel,
    /// Category such as `NETWORK`, `BAND_CHANGE` or `UDP`
    pub category: String,
    pub message: String,
}

impl ContextEvent {
    pub fn new(
        station_id: Option<StationId>,
        level: ContextLevel,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            station_id,
            level,
            category: category.into(),
            message: message.into(),
        }
    }
}

/// A log entry to persist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLogEntry {
    pub station_id: StationId,
    /// Contacted callsign
    pub callsign: String,
    pub band: String,
    pub mode: String,
    pub qso_date: NaiveDate,
    /// Time of day as `HH:MM:SS`
    pub qso_time: String,
    pub frequency: Option<String>,
    pub rst_sent: Option<String>,
    pub rst_rcvd: Option<String>,
    pub power: Option<f64>,
    pub points: u32,
    pub name: Option<String>,
    pub state: Option<String>,
    pub grid: Option<String>,
    /// Where the entry came from (e.g. "udp")
    pub source: String,
    /// Uniqueness key; a second entry with the same key is a duplicate
    pub dedupe_key: String,
    /// Original payload, truncated
    pub raw_payload: Option<String>,
}

/// A persisted log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: LogEntryId,
    #[serde(flatten)]
    pub entry: NewLogEntry,
    pub created_at: DateTime<Utc>,
}

/// Result of [`Store::create_log_entry`](crate::Store::create_log_entry)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// A new entry was written
    Created(LogEntryId),
    /// An entry with the same dedupe key already exists; nothing was written
    Duplicate,
}

impl CreateOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate)
    }
}
