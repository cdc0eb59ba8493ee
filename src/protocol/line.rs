use crate::prelude::*;

use chrono::{NaiveDateTime, SubsecRound};

/// Wire timestamp layout. Parsing accepts 1 to 9 fraction digits, encoding
/// always writes microseconds.
pub const TIMESTAMP_FORMAT: &str = "%Y.%m.%d %H:%M:%S%.6f";
const TIMESTAMP_PARSE_FORMAT: &str = "%Y.%m.%d %H:%M:%S%.f";

const FIELD_SEPARATOR: char = '\t';
const MAX_FRACTION_DIGITS: usize = 9;

/// One decoded `<device_id>\t<timestamp>\t<value>` line.
#[derive(Clone, Debug, PartialEq)]
pub struct Reading {
    pub device_id: String,
    pub timestamp: NaiveDateTime,
    pub value: f64,
}

impl Reading {
    pub fn new(device_id: &str, timestamp: NaiveDateTime, value: f64) -> Self {
        Self {
            device_id: device_id.to_string(),
            timestamp,
            value,
        }
    }

    pub fn decode(line: &[u8]) -> Result<Self, DecodeError> {
        let line = std::str::from_utf8(line).map_err(|_| DecodeError::Encoding)?;
        line.parse()
    }

    pub fn encode(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}\n",
            self.device_id,
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.value,
            sep = FIELD_SEPARATOR
        )
    }
}

impl std::str::FromStr for Reading {
    type Err = DecodeError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.trim().split(FIELD_SEPARATOR).collect();
        let [device_id, timestamp, value] = fields.as_slice() else {
            return Err(DecodeError::FieldCount(fields.len()));
        };

        let timestamp = parse_timestamp(timestamp)
            .ok_or_else(|| DecodeError::Timestamp(timestamp.to_string()))?;
        let value: f64 = value
            .trim()
            .parse()
            .map_err(|_| DecodeError::Value(value.to_string()))?;

        Ok(Self::new(device_id, timestamp, value))
    }
}

/// Requires a `.` and 1 to 9 fraction digits after the seconds. Precision is
/// cut to microseconds.
fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let (_, fraction) = text.rsplit_once('.')?;
    if fraction.is_empty()
        || fraction.len() > MAX_FRACTION_DIGITS
        || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    NaiveDateTime::parse_from_str(text, TIMESTAMP_PARSE_FORMAT)
        .ok()
        .map(|ts| ts.trunc_subsecs(6))
}
