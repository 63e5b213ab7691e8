//! rigctld line protocol
//!
//! Requests are single lines terminated by `\n`. The daemon answers with zero
//! or more data lines followed by a status line `RPRT <code>`, where `0` means
//! success and a negative code is a Hamlib error number.
//!
//! Set commands usually produce only the status line. Get commands produce
//! their data lines and, with extended response mode off, some daemons omit
//! the status line entirely; the command queue's timeout path covers that.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RigError;

/// Default rigctld TCP port
pub const DEFAULT_PORT: u16 = 4532;

/// Prefix of the status line
pub const STATUS_PREFIX: &str = "RPRT";

/// Name of the RF power level
pub const RF_POWER_LEVEL: &str = "RFPOWER";

/// Mode aliases applied before sending a mode to the daemon
const MODE_ALIASES: &[(&str, &str)] = &[("DIGU", "PKTUSB"), ("DIGL", "PKTLSB")];

/// One parsed line from the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyLine {
    /// A data line
    Data(String),
    /// The terminating status line with its code
    Status(i32),
}

impl ReplyLine {
    /// Parse a line with the terminator and any `\r` already removed
    ///
    /// Returns `None` for blank lines. A status line with a missing code counts
    /// as success; an unparseable code becomes `-1`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        match line.strip_prefix(STATUS_PREFIX) {
            Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => {
                let code = rest.trim();
                let code = if code.is_empty() {
                    0
                } else {
                    code.parse().unwrap_or(-1)
                };
                Some(Self::Status(code))
            }
            _ => Some(Self::Data(line.to_string())),
        }
    }
}

/// Capability lists a daemon can enumerate with `<letter> ?`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CapabilityKind {
    Modes,
    Levels,
    Functions,
    Parameters,
}

impl CapabilityKind {
    pub const ALL: [CapabilityKind; 4] = [
        CapabilityKind::Modes,
        CapabilityKind::Levels,
        CapabilityKind::Functions,
        CapabilityKind::Parameters,
    ];

    /// Set-command letter used for the query
    pub fn letter(&self) -> char {
        match self {
            Self::Modes => 'M',
            Self::Levels => 'L',
            Self::Functions => 'U',
            Self::Parameters => 'P',
        }
    }
}

/// A typed rigctld command
#[derive(Debug, Clone, PartialEq)]
pub enum RigCommand {
    GetFrequency,
    SetFrequency(u64),
    GetMode,
    SetMode { mode: String, passband_hz: u32 },
    GetPower,
    /// Power as a percentage; clamped and converted to a fraction on the wire
    SetPower(f64),
    GetPtt,
    SetPtt(bool),
    GetVfo,
    SetVfo(String),
    GetInfo,
    ListCapabilities(CapabilityKind),
}

impl RigCommand {
    /// Command line as sent to the daemon, without the terminator
    pub fn wire(&self) -> String {
        match self {
            Self::GetFrequency => "f".to_string(),
            Self::SetFrequency(hz) => format!("F {}", hz),
            Self::GetMode => "m".to_string(),
            Self::SetMode { mode, passband_hz } => {
                format!("M {} {}", normalize_mode(mode), passband_hz)
            }
            Self::GetPower => format!("l {}", RF_POWER_LEVEL),
            Self::SetPower(percent) => {
                format!("L {} {:.2}", RF_POWER_LEVEL, percent_to_fraction(*percent))
            }
            Self::GetPtt => "t".to_string(),
            Self::SetPtt(on) => format!("T {}", u8::from(*on)),
            Self::GetVfo => "v".to_string(),
            Self::SetVfo(vfo) => format!("V {}", vfo.trim().to_ascii_uppercase()),
            Self::GetInfo => "_".to_string(),
            Self::ListCapabilities(kind) => format!("{} ?", kind.letter()),
        }
    }

    /// Number of data lines the daemon sends before the status line
    pub fn expected_lines(&self) -> usize {
        match self {
            Self::GetMode => 2,
            Self::GetFrequency
            | Self::GetPower
            | Self::GetPtt
            | Self::GetVfo
            | Self::GetInfo
            | Self::ListCapabilities(_) => 1,
            Self::SetFrequency(_)
            | Self::SetMode { .. }
            | Self::SetPower(_)
            | Self::SetPtt(_)
            | Self::SetVfo(_) => 0,
        }
    }
}

impl fmt::Display for RigCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.wire())
    }
}

/// Upper-case a mode token and apply the alias table
pub fn normalize_mode(mode: &str) -> String {
    let upper = mode.trim().to_ascii_uppercase();
    MODE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == upper)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(upper)
}

/// Convert a power percentage to the fraction rigctld expects
///
/// The percentage is clamped to `0..=100` and rounded to a whole percent.
pub fn percent_to_fraction(percent: f64) -> f64 {
    let percent = if percent.is_nan() {
        0.0
    } else {
        percent.clamp(0.0, 100.0).round()
    };
    percent / 100.0
}

/// Convert a power level read from the daemon to a percentage
///
/// Values above 1 are taken to be a percentage already.
pub fn fraction_to_percent(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    let percent = if value > 1.0 { value } else { value * 100.0 };
    percent.clamp(0.0, 100.0).round() as u8
}

/// Parse a frequency line, accepting integral or decimal Hz
pub fn parse_frequency(line: &str) -> Result<u64, RigError> {
    let line = line.trim();
    if let Ok(hz) = line.parse::<u64>() {
        return Ok(hz);
    }
    match line.parse::<f64>() {
        Ok(hz) if hz.is_finite() && hz >= 0.0 => Ok(hz.round() as u64),
        _ => Err(RigError::InvalidResponse(format!("frequency `{}`", line))),
    }
}

/// Parse a level line as a float
pub fn parse_level(line: &str) -> Result<f64, RigError> {
    line.trim()
        .parse::<f64>()
        .map_err(|_| RigError::InvalidResponse(format!("level `{}`", line.trim())))
}

/// Parse a PTT line (`0` or non-zero)
pub fn parse_ptt(line: &str) -> Result<bool, RigError> {
    line.trim()
        .parse::<i32>()
        .map(|v| v != 0)
        .map_err(|_| RigError::InvalidResponse(format!("ptt `{}`", line.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_status_lines() {
        assert_eq!(ReplyLine::parse("RPRT 0"), Some(ReplyLine::Status(0)));
        assert_eq!(ReplyLine::parse("RPRT -11"), Some(ReplyLine::Status(-11)));
        assert_eq!(ReplyLine::parse("RPRT"), Some(ReplyLine::Status(0)));
        assert_eq!(ReplyLine::parse("RPRT x"), Some(ReplyLine::Status(-1)));
        assert_eq!(ReplyLine::parse("   "), None);
    }

    #[test]
    fn data_line_that_starts_like_status() {
        assert_eq!(
            ReplyLine::parse("RPRTX"),
            Some(ReplyLine::Data("RPRTX".to_string()))
        );
        assert_eq!(
            ReplyLine::parse("14250000"),
            Some(ReplyLine::Data("14250000".to_string()))
        );
    }

    #[test]
    fn command_wire_format() {
        assert_eq!(RigCommand::GetFrequency.wire(), "f");
        assert_eq!(RigCommand::SetFrequency(14_074_000).wire(), "F 14074000");
        assert_eq!(
            RigCommand::SetMode {
                mode: "digu".into(),
                passband_hz: 3000
            }
            .wire(),
            "M PKTUSB 3000"
        );
        assert_eq!(RigCommand::GetPower.wire(), "l RFPOWER");
        assert_eq!(RigCommand::SetPower(50.0).wire(), "L RFPOWER 0.50");
        assert_eq!(RigCommand::SetPower(150.0).wire(), "L RFPOWER 1.00");
        assert_eq!(RigCommand::SetPower(-3.0).wire(), "L RFPOWER 0.00");
        assert_eq!(RigCommand::SetPtt(true).wire(), "T 1");
        assert_eq!(RigCommand::SetVfo("vfob".into()).wire(), "V VFOB");
        assert_eq!(
            RigCommand::ListCapabilities(CapabilityKind::Functions).wire(),
            "U ?"
        );
    }

    #[test]
    fn expected_lines_per_command() {
        assert_eq!(RigCommand::GetMode.expected_lines(), 2);
        assert_eq!(RigCommand::GetFrequency.expected_lines(), 1);
        assert_eq!(RigCommand::SetFrequency(7_000_000).expected_lines(), 0);
    }

    #[test]
    fn mode_normalization() {
        assert_eq!(normalize_mode("usb"), "USB");
        assert_eq!(normalize_mode("DIGL"), "PKTLSB");
        assert_eq!(normalize_mode(" cw "), "CW");
    }

    #[test]
    fn power_conversions() {
        assert_eq!(percent_to_fraction(49.6), 0.5);
        assert_eq!(fraction_to_percent(0.5), 50);
        assert_eq!(fraction_to_percent(50.0), 50);
        assert_eq!(fraction_to_percent(1.0), 100);
        assert_eq!(fraction_to_percent(250.0), 100);
    }

    #[test]
    fn frequency_parsing() {
        assert_eq!(parse_frequency("14250000").unwrap(), 14_250_000);
        assert_eq!(parse_frequency("7074000.000000").unwrap(), 7_074_000);
        assert!(parse_frequency("abc").is_err());
    }
}
