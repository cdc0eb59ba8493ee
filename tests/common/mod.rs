#![allow(dead_code)]

pub use meterlink::prelude::*;

use chrono::{NaiveDate, NaiveDateTime};
use meterlink::power_log::PowerLog;
use std::io::Write;
use tempfile::TempDir;

pub fn common_setup() {
    meterlink::init_logging("debug");
}

pub struct Factory();

impl Factory {
    /// `10.0.0.1` volts 0..110 and `10.0.0.2` amps 0..1.
    pub fn registry() -> Registry {
        [
            ("10.0.0.1".to_string(), MeterSpec::new(0.0, 110.0, Unit::Volts)),
            ("10.0.0.2".to_string(), MeterSpec::new(0.0, 1.0, Unit::Amps)),
        ]
        .into_iter()
        .collect()
    }

    /// A store logging into a fresh temporary directory. Keep the `TempDir`
    /// alive for as long as the store is used.
    pub fn store() -> Result<(Store, TempDir)> {
        let dir = tempfile::tempdir()?;
        let log = PowerLog::new(dir.path().join("power.txt"))?;
        Ok((Store::new(log), dir))
    }

    pub fn store_with_history_limit(limit: usize) -> Result<(Store, TempDir)> {
        let dir = tempfile::tempdir()?;
        let log = PowerLog::new(dir.path().join("power.txt"))?;
        Ok((Store::with_history_limit(log, limit), dir))
    }

    /// 2024-03-05 at the given wall clock time.
    pub fn timestamp(hour: u32, min: u32, sec: u32, micro: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_micro_opt(hour, min, sec, micro)
            .unwrap()
    }

    pub fn registry_file(contents: &str) -> Result<tempfile::NamedTempFile> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(contents.as_bytes())?;
        file.flush()?;
        Ok(file)
    }
}
