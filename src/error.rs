use thiserror::Error;

/// Creates an anyhow error tagged with the current file and line number
#[macro_export]
macro_rules! file_error {
    ($($arg:tt)*) => {
        anyhow::anyhow!(
            "[{}:{}] {}",
            std::path::Path::new(file!())
                .file_name()
                .map(|n| n.to_string_lossy())
                .unwrap_or_default(),
            line!(),
            format!($($arg)*)
        )
    };
}

/// Creates an anyhow error tagged with the current file and line number, and includes a source error
#[macro_export]
macro_rules! file_error_with_source {
    ($source:expr, $($arg:tt)*) => {
        anyhow::anyhow!(
            "[{}:{}] {}: {}",
            std::path::Path::new(file!())
                .file_name()
                .map(|n| n.to_string_lossy())
                .unwrap_or_default(),
            line!(),
            format!($($arg)*),
            $source
        )
    };
}

/// A registry row that could not be turned into a meter spec.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("registry line {line}: {reason}")]
pub struct MalformedEntry {
    pub line: u64,
    pub reason: String,
}

/// A protocol line that could not be decoded into a reading.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("expected 3 tab-separated fields, got {0}")]
    FieldCount(usize),
    #[error("invalid timestamp {0:?}")]
    Timestamp(String),
    #[error("invalid value {0:?}")]
    Value(String),
    #[error("line is not valid UTF-8")]
    Encoding,
}

/// Why a decoded reading was refused by the validator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("unknown device {0}")]
    UnknownDevice(String),
    #[error("unit mismatch for {device_id}: expected {expected}, got {actual}")]
    UnitMismatch {
        device_id: String,
        expected: crate::registry::Unit,
        actual: crate::registry::Unit,
    },
    #[error("value {value} out of range for {device_id} ({range_start} - {range_stop})")]
    OutOfRange {
        device_id: String,
        value: f64,
        range_start: f64,
        range_stop: f64,
    },
}

/// Transport-level failure that ends a single connection.
#[derive(Debug, Error)]
pub enum ConnectionFault {
    #[error("connection reset by peer: {0}")]
    Reset(std::io::Error),
    #[error("read error: {0}")]
    Io(std::io::Error),
    #[error("no data received for {0} seconds")]
    Timeout(u64),
}

impl From<std::io::Error> for ConnectionFault {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind::*;

        match err.kind() {
            ConnectionReset | ConnectionAborted | BrokenPipe => Self::Reset(err),
            _ => Self::Io(err),
        }
    }
}
