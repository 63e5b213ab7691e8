//! Simulated radio
//!
//! State lives behind a shared mutex so clones observe the same radio; tests
//! keep one handle to turn the dial or cut the link while another is driven by
//! the session manager.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use field_rigctl::protocol::{fraction_to_percent, percent_to_fraction, RF_POWER_LEVEL};
use field_rigctl::{normalize_mode, ModeSetting, Rig, RigCapabilities, RigError};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Hamlib "feature not available"
const CODE_NOT_AVAILABLE: i32 = -11;
/// Hamlib "invalid parameter"
const CODE_INVALID_PARAM: i32 = -1;
/// Hamlib "communication timed out"
const CODE_TIMEOUT: i32 = -5;

const MODES: &[&str] = &["AM", "CW", "USB", "LSB", "RTTY", "FM", "PKTUSB", "PKTLSB"];
const LEVELS: &[&str] = &["RFPOWER", "AF", "RF", "SQL"];
const FUNCTIONS: &[&str] = &["NB", "COMP", "VOX"];

/// Configuration for creating a simulated radio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Display name/identifier
    pub id: String,
    /// Value reported by the info command
    pub model: String,
    pub initial_frequency_hz: u64,
    pub initial_mode: String,
    pub initial_passband_hz: u32,
    pub initial_power_pct: u8,
    /// Artificial delay applied to every operation
    pub latency_ms: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            id: "Simulated Radio".to_string(),
            model: "Hamlib Dummy".to_string(),
            initial_frequency_hz: 14_250_000, // 20m
            initial_mode: "USB".to_string(),
            initial_passband_hz: 3000,
            initial_power_pct: 50,
            latency_ms: 0,
        }
    }
}

#[derive(Debug)]
struct SimState {
    frequency_hz: u64,
    mode: String,
    passband_hz: u32,
    power_pct: u8,
    ptt: bool,
    vfo: String,
    connected: bool,
    fail_connect: bool,
    fail_reads: bool,
    connect_count: u32,
}

/// A simulated radio implementing [`Rig`]
#[derive(Debug, Clone)]
pub struct SimulatedRig {
    id: String,
    model: String,
    latency: Duration,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedRig {
    /// Create a simulated radio with default settings
    pub fn new(id: impl Into<String>) -> Self {
        Self::from_config(SimConfig {
            id: id.into(),
            ..Default::default()
        })
    }

    /// Create a simulated radio from configuration
    pub fn from_config(config: SimConfig) -> Self {
        Self {
            id: config.id,
            model: config.model,
            latency: Duration::from_millis(config.latency_ms),
            state: Arc::new(Mutex::new(SimState {
                frequency_hz: config.initial_frequency_hz,
                mode: normalize_mode(&config.initial_mode),
                passband_hz: config.initial_passband_hz,
                power_pct: config.initial_power_pct.min(100),
                ptt: false,
                vfo: "VFOA".to_string(),
                connected: false,
                fail_connect: false,
                fail_reads: false,
                connect_count: 0,
            })),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Change frequency and mode as if from the front panel
    pub fn tune(&self, hz: u64, mode: &str) {
        let mut state = self.state();
        state.frequency_hz = hz;
        state.mode = normalize_mode(mode);
    }

    /// Make subsequent `connect` calls fail
    pub fn set_fail_connect(&self, fail: bool) {
        self.state().fail_connect = fail;
    }

    /// Make every read answer with a daemon timeout code
    pub fn set_fail_reads(&self, fail: bool) {
        self.state().fail_reads = fail;
    }

    /// Lose the link without a disconnect call
    pub fn drop_link(&self) {
        self.state().connected = false;
    }

    /// Number of successful connects so far
    pub fn connect_count(&self) -> u32 {
        self.state().connect_count
    }

    pub fn frequency_hz(&self) -> u64 {
        self.state().frequency_hz
    }

    pub fn power_pct(&self) -> u8 {
        self.state().power_pct
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    /// Guard for operations that need a live link
    fn live(&self, command: &str) -> Result<MutexGuard<'_, SimState>, RigError> {
        let state = self.state();
        if !state.connected {
            return Err(RigError::NotConnected);
        }
        if state.fail_reads {
            return Err(RigError::Daemon {
                command: command.to_string(),
                code: CODE_TIMEOUT,
            });
        }
        Ok(state)
    }

    async fn read<T>(&self, command: &str, f: impl FnOnce(&SimState) -> T) -> Result<T, RigError> {
        self.delay().await;
        let state = self.live(command)?;
        Ok(f(&state))
    }

    async fn write(&self, command: &str, f: impl FnOnce(&mut SimState)) -> Result<(), RigError> {
        self.delay().await;
        let mut state = self.live(command)?;
        debug!("SIM({}) {}", self.id, command);
        f(&mut state);
        Ok(())
    }

    /// Interpret one rigctld command line against the simulated state
    fn interpret(&self, state: &mut SimState, line: &str) -> Result<Vec<String>, RigError> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let invalid = || RigError::Daemon {
            command: line.to_string(),
            code: CODE_INVALID_PARAM,
        };

        let lines = match parts.as_slice() {
            ["f"] => vec![state.frequency_hz.to_string()],
            ["F", hz] => {
                state.frequency_hz = hz.parse().map_err(|_| invalid())?;
                Vec::new()
            }
            ["m"] => vec![state.mode.clone(), state.passband_hz.to_string()],
            ["M", "?"] => vec![MODES.join(" ")],
            ["M", mode, passband] => {
                state.passband_hz = passband.parse().map_err(|_| invalid())?;
                state.mode = normalize_mode(mode);
                Vec::new()
            }
            ["l", level] if *level == RF_POWER_LEVEL => {
                vec![format!("{:.2}", f64::from(state.power_pct) / 100.0)]
            }
            ["L", "?"] => vec![LEVELS.join(" ")],
            ["L", level, value] if *level == RF_POWER_LEVEL => {
                let value: f64 = value.parse().map_err(|_| invalid())?;
                state.power_pct = fraction_to_percent(value);
                Vec::new()
            }
            ["t"] => vec![u8::from(state.ptt).to_string()],
            ["T", on] => {
                state.ptt = *on != "0";
                Vec::new()
            }
            ["v"] => vec![state.vfo.clone()],
            ["V", vfo] => {
                state.vfo = vfo.to_ascii_uppercase();
                Vec::new()
            }
            ["_"] => vec![self.model.clone()],
            ["U", "?"] => vec![FUNCTIONS.join(" ")],
            ["P", "?"] => vec![String::new()],
            _ => {
                return Err(RigError::Daemon {
                    command: line.to_string(),
                    code: CODE_NOT_AVAILABLE,
                })
            }
        };
        Ok(lines)
    }
}

impl Rig for SimulatedRig {
    async fn connect(&self) -> bool {
        self.delay().await;
        let mut state = self.state();
        if state.fail_connect {
            debug!("SIM({}) refusing connection", self.id);
            return false;
        }
        if !state.connected {
            state.connected = true;
            state.connect_count += 1;
        }
        true
    }

    async fn disconnect(&self) {
        self.state().connected = false;
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }

    async fn frequency(&self) -> Result<u64, RigError> {
        self.read("f", |s| s.frequency_hz).await
    }

    async fn set_frequency(&self, hz: u64) -> Result<(), RigError> {
        self.write("F", |s| s.frequency_hz = hz).await
    }

    async fn mode(&self) -> Result<ModeSetting, RigError> {
        self.read("m", |s| ModeSetting {
            mode: s.mode.clone(),
            passband_hz: s.passband_hz,
        })
        .await
    }

    async fn set_mode(&self, mode: &str, passband_hz: u32) -> Result<(), RigError> {
        let mode = normalize_mode(mode);
        self.write("M", |s| {
            s.mode = mode;
            s.passband_hz = passband_hz;
        })
        .await
    }

    async fn power(&self) -> Result<u8, RigError> {
        self.read("l RFPOWER", |s| s.power_pct).await
    }

    async fn set_power(&self, percent: f64) -> Result<(), RigError> {
        let pct = fraction_to_percent(percent_to_fraction(percent));
        self.write("L RFPOWER", |s| s.power_pct = pct).await
    }

    async fn ptt(&self) -> Result<bool, RigError> {
        self.read("t", |s| s.ptt).await
    }

    async fn set_ptt(&self, on: bool) -> Result<(), RigError> {
        self.write("T", |s| s.ptt = on).await
    }

    async fn vfo(&self) -> Result<String, RigError> {
        self.read("v", |s| s.vfo.clone()).await
    }

    async fn set_vfo(&self, vfo: &str) -> Result<(), RigError> {
        let vfo = vfo.trim().to_ascii_uppercase();
        self.write("V", |s| s.vfo = vfo).await
    }

    async fn info(&self) -> Result<String, RigError> {
        let model = self.model.clone();
        self.read("_", |_| model).await
    }

    async fn capabilities(&self) -> Result<RigCapabilities, RigError> {
        let to_vec = |list: &[&str]| -> Vec<String> { list.iter().map(|s| s.to_string()).collect() };
        self.read("M ?", |_| RigCapabilities {
            modes: to_vec(MODES),
            levels: to_vec(LEVELS),
            functions: to_vec(FUNCTIONS),
            parameters: Vec::new(),
        })
        .await
    }

    async fn raw(
        &self,
        command: &str,
        _expected_lines: usize,
        _silent_ok: bool,
    ) -> Result<Vec<String>, RigError> {
        self.delay().await;
        let mut state = self.live(command)?;
        let mut lines = self.interpret(&mut state, command.trim())?;
        lines.retain(|l| !l.is_empty());
        Ok(lines)
    }
}
