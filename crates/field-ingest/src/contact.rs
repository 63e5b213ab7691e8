//! Mapping parsed fields onto a contact record

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::parser::FieldMap;

/// Station recorded for contacts that do not name their logging station
pub const UNKNOWN_STATION: &str = "UDP-UNKNOWN";

const CALLSIGN_KEYS: &[&str] = &["CALL", "FLDCALL", "CALLSIGN", "DXCALL"];
const STATION_KEYS: &[&str] = &["STATION", "FLDSTATION", "MYCALL", "OPERATOR", "FLDOPERATOR"];
const BAND_KEYS: &[&str] = &["BAND", "FLDBAND"];
const MODE_KEYS: &[&str] = &["MODE", "FLDMODE", "MODECONTEST", "FLDMODECONTEST"];
const FREQUENCY_KEYS: &[&str] = &["FREQ", "FREQUENCY", "FLDFREQ"];
const RST_SENT_KEYS: &[&str] = &["RST_SENT", "FLDRSTS", "RST_S"];
const RST_RCVD_KEYS: &[&str] = &["RST_RCVD", "FLDRSTR", "RST_R"];
const POWER_KEYS: &[&str] = &["POWER", "TX_PWR", "FLDPOWER"];
const POINTS_KEYS: &[&str] = &["POINTS", "FLDPOINTS"];
const NAME_KEYS: &[&str] = &["NAME", "FLDNAME"];
const STATE_KEYS: &[&str] = &["STATE", "FLDSTATE"];
const GRID_KEYS: &[&str] = &["GRID", "GRIDSQUARE", "FLDGRID"];
const DATE_KEYS: &[&str] = &["QSO_DATE", "FLDDATESTR", "DATE"];
const TIME_KEYS: &[&str] = &["TIME_ON", "FLDTIMEONSTR", "TIME"];

/// A contact decoded from one datagram
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedContact {
    /// Logging station
    pub station_call: String,
    /// Contacted station
    pub callsign: String,
    pub band: String,
    pub mode: String,
    pub qso_date: NaiveDate,
    /// `HH:MM:SS`
    pub qso_time: String,
    pub frequency: Option<String>,
    pub rst_sent: Option<String>,
    pub rst_rcvd: Option<String>,
    pub power: Option<f64>,
    pub points: Option<u32>,
    pub name: Option<String>,
    pub state: Option<String>,
    pub grid: Option<String>,
}

/// First non-empty value among `keys`
fn field(fields: &FieldMap, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| fields.get(*key))
        .find(|value| !value.is_empty())
        .cloned()
}

impl NormalizedContact {
    /// Build a contact from parsed fields
    ///
    /// Returns `None` when the callsign, band or mode is missing. A missing
    /// or unreadable date/time falls back to `now`.
    pub fn from_fields(fields: &FieldMap, now: DateTime<Utc>) -> Option<Self> {
        let callsign = field(fields, CALLSIGN_KEYS)?;
        let band = field(fields, BAND_KEYS)?;
        let mode = field(fields, MODE_KEYS)?;

        Some(Self {
            station_call: field(fields, STATION_KEYS)
                .unwrap_or_else(|| UNKNOWN_STATION.to_string()),
            callsign,
            band,
            mode,
            qso_date: normalize_date(field(fields, DATE_KEYS).as_deref(), now),
            qso_time: normalize_time(field(fields, TIME_KEYS).as_deref(), now),
            frequency: field(fields, FREQUENCY_KEYS),
            rst_sent: field(fields, RST_SENT_KEYS),
            rst_rcvd: field(fields, RST_RCVD_KEYS),
            power: field(fields, POWER_KEYS).and_then(|p| p.parse().ok()),
            points: field(fields, POINTS_KEYS).and_then(|p| p.parse().ok()),
            name: field(fields, NAME_KEYS),
            state: field(fields, STATE_KEYS),
            grid: field(fields, GRID_KEYS),
        })
    }

    /// Uniqueness key for the log entry
    ///
    /// `contest|club|STATION|CALL|BAND|MODE|YYYY-MM-DD|HH:MM:SS`, with `none`
    /// standing in for a missing contest or club.
    pub fn dedupe_key(&self, contest_id: Option<&str>, club_id: Option<&str>) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}|{}|{}",
            contest_id.filter(|c| !c.is_empty()).unwrap_or("none"),
            club_id.filter(|c| !c.is_empty()).unwrap_or("none"),
            self.station_call.to_uppercase(),
            self.callsign.to_uppercase(),
            self.band.to_uppercase(),
            self.mode.to_uppercase(),
            self.qso_date.format("%Y-%m-%d"),
            self.qso_time,
        )
    }
}

/// Accepts `YYYYMMDD`, `YYYY-MM-DD` and `YYYY/MM/DD`
pub fn normalize_date(date: Option<&str>, now: DateTime<Utc>) -> NaiveDate {
    date.map(|d| d.trim().replace('/', "-"))
        .and_then(|d| {
            NaiveDate::parse_from_str(&d, "%Y-%m-%d")
                .ok()
                .or_else(|| compact_date(&d))
        })
        .unwrap_or_else(|| now.date_naive())
}

fn compact_date(date: &str) -> Option<NaiveDate> {
    if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::from_ymd_opt(
        date[..4].parse().ok()?,
        date[4..6].parse().ok()?,
        date[6..].parse().ok()?,
    )
}

/// Accepts 2, 4 or 6 digits, with or without `:` separators
pub fn normalize_time(time: Option<&str>, now: DateTime<Utc>) -> String {
    time.and_then(parse_time)
        .unwrap_or_else(|| now.time())
        .format("%H:%M:%S")
        .to_string()
}

fn parse_time(time: &str) -> Option<NaiveTime> {
    let digits: String = time.trim().chars().filter(|c| *c != ':').collect();
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let part = |i: usize| digits.get(i..i + 2).and_then(|p| p.parse::<u32>().ok());
    match digits.len() {
        2 => NaiveTime::from_hms_opt(part(0)?, 0, 0),
        4 => NaiveTime::from_hms_opt(part(0)?, part(2)?, 0),
        6 => NaiveTime::from_hms_opt(part(0)?, part(2)?, part(4)?),
        _ => None,
    }
}
