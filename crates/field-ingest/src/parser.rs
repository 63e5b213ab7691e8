//! Payload format detection and field extraction
//!
//! Logging programs push contacts in one of three encodings:
//!
//! - length-prefixed (ADIF): `<CALL:4>K1LI<BAND:3>20M`
//! - tag-delimited: `<CALL>K1LI</CALL><BAND>20M</BAND>`
//! - key/value pairs: `CALL=K1LI BAND=20M`
//!
//! The first format whose marker appears wins. Keys come out upper-cased and
//! values trimmed.

use std::collections::BTreeMap;

/// Field name to value, keys upper-cased
pub type FieldMap = BTreeMap<String, String>;

/// Encoding of a contact payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    LengthPrefixed,
    Tagged,
    KeyValue,
    Unknown,
}

/// Pick the payload encoding
pub fn detect_format(payload: &str) -> PayloadFormat {
    let payload = payload.trim();
    if has_length_prefixed_field(payload) {
        PayloadFormat::LengthPrefixed
    } else if payload.contains('<') && payload.contains("</") {
        PayloadFormat::Tagged
    } else if payload.contains('=') {
        PayloadFormat::KeyValue
    } else {
        PayloadFormat::Unknown
    }
}

/// Detect the encoding and extract every field
pub fn parse_payload(payload: &str) -> FieldMap {
    let payload = payload.trim();
    match detect_format(payload) {
        PayloadFormat::LengthPrefixed => parse_length_prefixed(payload),
        PayloadFormat::Tagged => parse_tagged(payload),
        PayloadFormat::KeyValue => parse_key_value(payload),
        PayloadFormat::Unknown => FieldMap::new(),
    }
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Length of the field name at the start of `bytes`
fn name_len(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| is_name_byte(**b)).count()
}

/// A length-prefixed field header `<NAME:LEN[:TYPE]>`
struct FieldHeader {
    name_end: usize,
    len: usize,
    /// Offset just past the closing `>`
    end: usize,
}

/// Parse a header starting at `start`, which must point at `<`
fn field_header(bytes: &[u8], start: usize) -> Option<FieldHeader> {
    let name_start = start + 1;
    let name_end = name_start + name_len(&bytes[name_start..]);
    if name_end == name_start || bytes.get(name_end) != Some(&b':') {
        return None;
    }

    let digits_start = name_end + 1;
    let digits = bytes[digits_start..]
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits == 0 {
        return None;
    }
    let len: usize = std::str::from_utf8(&bytes[digits_start..digits_start + digits])
        .ok()?
        .parse()
        .ok()?;

    // Optional `:TYPE` before the closing bracket
    let close = bytes[digits_start + digits..].iter().position(|b| *b == b'>')?;
    let header_rest = &bytes[digits_start + digits..digits_start + digits + close];
    if !header_rest.is_empty() && (header_rest[0] != b':' || header_rest.contains(&b'<')) {
        return None;
    }

    Some(FieldHeader {
        name_end,
        len,
        end: digits_start + digits + close + 1,
    })
}

fn has_length_prefixed_field(payload: &str) -> bool {
    let bytes = payload.as_bytes();
    bytes.iter().enumerate().any(|(i, b)| {
        if *b != b'<' {
            return false;
        }
        let name = name_len(&bytes[i + 1..]);
        name > 0
            && bytes.get(i + 1 + name) == Some(&b':')
            && bytes.get(i + 2 + name).is_some_and(|d| d.is_ascii_digit())
    })
}

/// Parse `<NAME:LEN>value` fields; each value is exactly LEN bytes
pub fn parse_length_prefixed(payload: &str) -> FieldMap {
    let bytes = payload.as_bytes();
    let mut fields = FieldMap::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }
        let Some(header) = field_header(bytes, i) else {
            i += 1;
            continue;
        };

        let value_end = header.end.saturating_add(header.len).min(bytes.len());
        let value = String::from_utf8_lossy(&bytes[header.end..value_end]);
        let key = String::from_utf8_lossy(&bytes[i + 1..header.name_end]).to_ascii_uppercase();
        fields.insert(key, value.trim().to_string());
        i = value_end;
    }

    fields
}

/// Parse `<NAME>value</NAME>` fields; values cannot contain `<`
pub fn parse_tagged(payload: &str) -> FieldMap {
    let bytes = payload.as_bytes();
    let mut fields = FieldMap::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }
        let name_start = i + 1;
        let name_end = name_start + name_len(&bytes[name_start..]);
        if name_end == name_start || bytes.get(name_end) != Some(&b'>') {
            i += 1;
            continue;
        }

        let value_start = name_end + 1;
        let value_end = bytes[value_start..]
            .iter()
            .position(|b| *b == b'<')
            .map_or(bytes.len(), |p| value_start + p);
        let name = &payload[name_start..name_end];
        let close = format!("</{}>", name);
        if !payload[value_end..].starts_with(&close) {
            i += 1;
            continue;
        }

        fields.insert(
            name.to_ascii_uppercase(),
            payload[value_start..value_end].trim().to_string(),
        );
        i = value_end + close.len();
    }

    fields
}

/// Parse `KEY=value` pairs separated by whitespace, `,` or `;`
pub fn parse_key_value(payload: &str) -> FieldMap {
    payload
        .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .filter_map(|token| token.split_once('='))
        .filter(|(key, value)| {
            !key.is_empty() && !value.is_empty() && key.bytes().all(is_name_byte)
        })
        .map(|(key, value)| (key.to_ascii_uppercase(), value.trim().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn detection_order() {
        assert_eq!(detect_format("<CALL:4>K1LI"), PayloadFormat::LengthPrefixed);
        assert_eq!(
            detect_format("<CALL:4>K1LI<X>y</X>"),
            PayloadFormat::LengthPrefixed
        );
        assert_eq!(detect_format("<CALL>A=B</CALL>"), PayloadFormat::Tagged);
        assert_eq!(detect_format("CALL=K1LI"), PayloadFormat::KeyValue);
        assert_eq!(detect_format("<CALL>K1LI"), PayloadFormat::Unknown);
        assert_eq!(detect_format("hello"), PayloadFormat::Unknown);
        assert_eq!(detect_format(""), PayloadFormat::Unknown);
    }

    #[test]
    fn key_value_payload() {
        let fields = parse_payload("CALL=K1LI BAND=20 MODE=CW QSO_DATE=20250131 TIME_ON=123456");
        assert_eq!(fields["CALL"], "K1LI");
        assert_eq!(fields["BAND"], "20");
        assert_eq!(fields["MODE"], "CW");
        assert_eq!(fields["TIME_ON"], "123456");
    }

    #[test]
    fn key_value_separators_and_case() {
        let fields = parse_payload("call=K1LI,band=40;mode=SSB\nname=Joe =x y=");
        assert_eq!(fields["CALL"], "K1LI");
        assert_eq!(fields["BAND"], "40");
        assert_eq!(fields["MODE"], "SSB");
        assert_eq!(fields["NAME"], "Joe");
        assert_eq!(fields.len(), 4);
    }

    #[test]
    fn length_prefixed_payload() {
        let fields =
            parse_payload("<CALL:4>K1LI<BAND:2>20<MODE:2>CW<qso_date:8>20250131<time_on:6>123456<EOR>");
        assert_eq!(fields["CALL"], "K1LI");
        assert_eq!(fields["BAND"], "20");
        assert_eq!(fields["MODE"], "CW");
        assert_eq!(fields["QSO_DATE"], "20250131");
        assert_eq!(fields["TIME_ON"], "123456");
    }

    #[test]
    fn length_prefixed_value_is_exact() {
        let fields = parse_payload("<CALL:4>K1LIW1AW and more");
        assert_eq!(fields["CALL"], "K1LI");
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn length_prefixed_type_and_short_value() {
        let fields = parse_payload("<QSO_DATE:8:D>20250131 <NAME:10>Jo");
        assert_eq!(fields["QSO_DATE"], "20250131");
        assert_eq!(fields["NAME"], "Jo");
    }

    #[test]
    fn length_prefixed_value_may_look_like_a_tag() {
        let fields = parse_payload("<COMMENT:8><BAND:2><CALL:4>K1LI");
        assert_eq!(fields["COMMENT"], "<BAND:2>");
        assert_eq!(fields["CALL"], "K1LI");
        assert!(!fields.contains_key("BAND"));
    }

    #[test]
    fn tagged_payload() {
        let fields = parse_payload("<LOG><CALL>K1LI</CALL><BAND>40</BAND><MODE>PH</MODE></LOG>");
        assert_eq!(fields["CALL"], "K1LI");
        assert_eq!(fields["BAND"], "40");
        assert_eq!(fields["MODE"], "PH");
        assert!(!fields.contains_key("LOG"));
    }

    #[test]
    fn tagged_n3fjp_names() {
        let fields = parse_payload(
            "<CMD><ADDDIRECT><FLDCALL> w1aw </FLDCALL><fldband>20</fldband><BAD>x</OTHER></CMD>",
        );
        assert_eq!(fields["FLDCALL"], "w1aw");
        assert_eq!(fields["FLDBAND"], "20");
        assert!(!fields.contains_key("BAD"));
    }

    #[test]
    fn unknown_payload_is_empty() {
        assert!(parse_payload("just some text").is_empty());
    }

    proptest! {
        #[test]
        fn length_prefix_extracts_declared_bytes(
            value in "[ -~]{1,30}",
            trailer in "[ -~]{0,20}",
        ) {
            let payload = format!("<CALL:{}>{}{}", value.len(), value, trailer);
            let fields = parse_length_prefixed(&payload);
            prop_assert_eq!(fields.get("CALL").map(String::as_str), Some(value.trim()));
        }
    }
}
