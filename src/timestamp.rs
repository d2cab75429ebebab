//! Conversion of stored UTC creation times into the sheet's display format.

use chrono::{DateTime, NaiveDateTime};
use chrono_tz::Tz;
use thiserror::Error;

const STORED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";
const DISPLAY_FORMAT: &str = "%d %b, %Y %H:%M:%S";

/// Layout of `YYYY-MM-DDTHH:MM:SS.ffffffZ`; `None` marks a digit position.
const STORED_LAYOUT: [Option<u8>; 27] = {
    let mut layout = [None; 27];
    layout[4] = Some(b'-');
    layout[7] = Some(b'-');
    layout[10] = Some(b'T');
    layout[13] = Some(b':');
    layout[16] = Some(b':');
    layout[19] = Some(b'.');
    layout[26] = Some(b'Z');
    layout
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("timestamp {value:?} does not match {expected}")]
pub struct FormatError {
    pub value: String,
    pub expected: &'static str,
}

impl FormatError {
    fn stored(value: &str) -> Self {
        Self {
            value: value.to_owned(),
            expected: "YYYY-MM-DDTHH:MM:SS.ffffffZ",
        }
    }
}

fn matches_stored_layout(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() == STORED_LAYOUT.len()
        && bytes
            .iter()
            .zip(STORED_LAYOUT.iter())
            .all(|(b, expected)| match expected {
                Some(c) => b == c,
                None => b.is_ascii_digit(),
            })
}

/// Parses a stored `createdAt` value as a naive UTC instant. No other layouts are accepted.
pub fn parse_stored(raw: &str) -> Result<NaiveDateTime, FormatError> {
    if !matches_stored_layout(raw) {
        return Err(FormatError::stored(raw));
    }
    NaiveDateTime::parse_from_str(raw, STORED_FORMAT).map_err(|_| FormatError::stored(raw))
}

/// The instant a stored UTC `createdAt` names, expressed in `tz`.
pub fn localize(raw: &str, tz: Tz) -> Result<DateTime<Tz>, FormatError> {
    Ok(parse_stored(raw)?.and_utc().with_timezone(&tz))
}

pub fn display(local: &DateTime<Tz>) -> String {
    local.format(DISPLAY_FORMAT).to_string()
}

/// Converts a stored UTC `createdAt` into `DD Mon, YYYY HH:MM:SS` in `tz`.
pub fn normalize(raw: &str, tz: Tz) -> Result<String, FormatError> {
    localize(raw, tz).map(|local| display(&local))
}
