//! Relay message bodies
//!
//! Bodies are tag soup rather than XML: a message is recognised by the
//! presence of its outer tag and fields are pulled out by name.

/// Reply to a roster query, sent before the per-peer announcements
pub const WHO_ACK: &str = "<WHO></WHO>";

/// Reply to `<NTWK><CHECK>`
pub const NTWK_CHECK_ACK: &str = "<NTWK><CHECK></CHECK></NTWK>";

/// Reply to `<NTWK><OPEN>`
pub const NTWK_OPEN_ACK: &str = "<NTWK><OPEN></OPEN></NTWK>";

/// Recipient used for broadcast messages
pub const BROADCAST_RECIPIENT: &str = "ALL";

/// Placeholder for an unknown roster band or mode
pub const UNKNOWN_FIELD: &str = "?";

/// A decoded relay message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// Band/mode announcement (`BAMS`)
    Announcement {
        station: String,
        band: String,
        mode: String,
    },
    /// Operator message to one station (`MESG`)
    DirectMessage {
        from: String,
        to: String,
        text: String,
    },
    /// Operator message to everyone (`BMSG`)
    Broadcast { from: String, text: String },
    /// Roster query (`WHO`)
    RosterQuery,
    /// Network check handshake
    NetworkCheck,
    /// Network open handshake
    NetworkOpen,
    /// Anything else; relayed but otherwise ignored
    Other,
}

impl RelayMessage {
    /// Classify a decoded frame body
    ///
    /// An announcement without a station is not an announcement; it falls
    /// through to [`RelayMessage::Other`].
    pub fn parse(body: &str) -> Self {
        if body.contains("<BAMS>") {
            if let Some(station) = tag_value(body, "STATION") {
                return Self::Announcement {
                    station: station.to_string(),
                    band: tag_value(body, "BAND").unwrap_or_default().to_string(),
                    mode: tag_value(body, "MODE").unwrap_or_default().to_string(),
                };
            }
        } else if body.contains("<MESG>") {
            return Self::DirectMessage {
                from: tag_value(body, "FROM").unwrap_or_default().to_string(),
                to: tag_value(body, "TO").unwrap_or_default().to_string(),
                text: tag_value(body, "MSGTXT").unwrap_or_default().to_string(),
            };
        } else if body.contains("<BMSG>") {
            return Self::Broadcast {
                from: tag_value(body, "FROM").unwrap_or_default().to_string(),
                text: tag_value(body, "MSGTXT").unwrap_or_default().to_string(),
            };
        } else if body.contains("<WHO>") {
            return Self::RosterQuery;
        } else if body.contains("<NTWK>") {
            if body.contains("<CHECK>") {
                return Self::NetworkCheck;
            }
            if body.contains("<OPEN>") {
                return Self::NetworkOpen;
            }
        }
        Self::Other
    }
}

/// Text between `<TAG>` and `</TAG>`, trimmed
///
/// Returns `None` if the tag is missing, unclosed or holds only whitespace.
pub fn tag_value<'a>(body: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = body.find(&open)? + open.len();
    let len = body[start..].find(&close)?;
    let value = body[start..start + len].trim();
    (!value.is_empty()).then_some(value)
}

/// Build an announcement body
pub fn announcement(station: &str, band: &str, mode: &str) -> String {
    format!(
        "<BAMS><STATION>{}</STATION><BAND>{}</BAND><MODE>{}</MODE></BAMS>",
        station, band, mode
    )
}
