//! Band plan and mode categories

use std::fmt;

use serde::{Deserialize, Serialize};

/// Amateur band edges in Hz (inclusive)
const BANDS: &[(u64, u64, &str)] = &[
    (1_800_000, 2_000_000, "160"),
    (3_500_000, 4_000_000, "80"),
    (5_330_500, 5_403_500, "60"),
    (7_000_000, 7_300_000, "40"),
    (10_100_000, 10_150_000, "30"),
    (14_000_000, 14_350_000, "20"),
    (18_068_000, 18_168_000, "17"),
    (21_000_000, 21_450_000, "15"),
    (24_890_000, 24_990_000, "12"),
    (28_000_000, 29_700_000, "10"),
    (50_000_000, 54_000_000, "6"),
    (144_000_000, 148_000_000, "2"),
    (222_000_000, 225_000_000, "1.25"),
    (420_000_000, 450_000_000, "70cm"),
];

/// Band name for a dial frequency, `None` outside the band plan
pub fn frequency_to_band(hz: u64) -> Option<&'static str> {
    BANDS
        .iter()
        .find(|(low, high, _)| (*low..=*high).contains(&hz))
        .map(|(_, _, band)| *band)
}

/// Contest mode category of a radio mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModeCategory {
    Cw,
    Digital,
    Phone,
}

const PHONE_MARKERS: &[&str] = &["USB", "LSB", "SSB", "FM", "AM"];

const DIGITAL_MARKERS: &[&str] = &[
    "FT8", "FT4", "RTTY", "PSK", "PKT", "DIG", "DATA", "JT", "OLIVIA",
];

impl ModeCategory {
    /// Categorise a mode token by substring
    ///
    /// CW wins, then sideband and FM/AM markers, so packet modes riding on a
    /// sideband (`PKTUSB`) count as phone. Anything unmatched is phone too.
    pub fn from_mode(mode: &str) -> Self {
        let upper = mode.to_ascii_uppercase();
        if upper.contains("CW") {
            Self::Cw
        } else if PHONE_MARKERS.iter().any(|m| upper.contains(m)) {
            Self::Phone
        } else if DIGITAL_MARKERS.iter().any(|m| upper.contains(m)) {
            Self::Digital
        } else {
            Self::Phone
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cw => "CW",
            Self::Digital => "DIGITAL",
            Self::Phone => "PHONE",
        }
    }
}

impl fmt::Display for ModeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
