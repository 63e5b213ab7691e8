//! Gateway settings

use std::path::{Path, PathBuf};

use field_ingest::{parse_targets, IngestConfig};
use field_radio::SessionConfig;
use field_relay::RelayConfig;
use field_rigctl::RigctlConfig;
use field_store::RadioConnection;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Environment variable naming an explicit settings file
pub const SETTINGS_ENV: &str = "FIELD_GATEWAY_SETTINGS";

/// Gateway settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub relay: RelayConfig,
    pub ingest: IngestConfig,
    /// Timeouts shared by every rigctld connection
    pub rigctl: RigctlConfig,
    pub sessions: SessionConfig,
    /// Radio connections to seed and start
    pub radios: Vec<RadioConnection>,
}

impl Settings {
    /// Get the config directory for the gateway
    /// Uses $XDG_CONFIG_HOME/field-gateway, falls back to ~/.config/field-gateway
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("field-gateway"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("field-gateway"))
    }

    /// Get the settings file path
    pub fn settings_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(SETTINGS_ENV) {
            return Some(PathBuf::from(path));
        }
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from disk and apply environment overrides
    ///
    /// A missing file gives the defaults; an unreadable one is logged and
    /// also gives the defaults.
    pub fn load() -> Self {
        let mut settings = match Self::settings_path() {
            Some(path) if path.exists() => Self::load_from(&path).unwrap_or_else(|e| {
                warn!("Ignoring settings file: {}", e);
                Self::default()
            }),
            _ => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok());
        settings
    }

    /// Load settings from a JSON file
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let settings = serde_json::from_str(&text)
            .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Apply `RELAY_HOST`, `RELAY_PORT`, `UDP_HOST`, `UDP_PORT` and
    /// `UDP_TARGETS` overrides
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("RELAY_HOST") {
            self.relay.host = host;
        }
        if let Some(port) = lookup("RELAY_PORT") {
            match port.parse() {
                Ok(port) => self.relay.port = port,
                Err(_) => warn!("Ignoring invalid RELAY_PORT {:?}", port),
            }
        }
        if let Some(host) = lookup("UDP_HOST") {
            self.ingest.host = host;
        }
        if let Some(port) = lookup("UDP_PORT") {
            match port.parse() {
                Ok(port) => self.ingest.port = port,
                Err(_) => warn!("Ignoring invalid UDP_PORT {:?}", port),
            }
        }
        if let Some(targets) = lookup("UDP_TARGETS") {
            self.ingest.targets = parse_targets(&targets);
        }
    }
}
