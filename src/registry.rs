use crate::prelude::*;

use serde::Serialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

// Unit {{{
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum Unit {
    Amps,
    Volts,
}

impl Unit {
    /// Registry files use the Cyrillic initials "А" and "В"; Latin letters and
    /// the full words are accepted as well.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_lowercase().as_str() {
            "а" | "a" | "amps" => Some(Self::Amps),
            "в" | "v" | "volts" => Some(Self::Volts),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Amps => "A",
            Self::Volts => "V",
        }
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
} // }}}

// MeterSpec {{{
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct MeterSpec {
    pub range_start: f64,
    pub range_stop: f64,
    pub unit: Unit,
}

impl MeterSpec {
    pub fn new(range_start: f64, range_stop: f64, unit: Unit) -> Self {
        Self {
            range_start,
            range_stop,
            unit,
        }
    }

    /// Inclusive on both ends; NaN is never in range.
    pub fn contains(&self, value: f64) -> bool {
        self.range_start <= value && value <= self.range_stop
    }

    pub fn is_unit(&self, unit: Unit) -> bool {
        self.unit == unit
    }
} // }}}

/// Immutable device id -> meter spec map, built once before the listener starts.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    meters: HashMap<String, MeterSpec>,
}

impl Registry {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Reading device registry from {}", path.display());

        let file = std::fs::File::open(path)
            .with_context(|| format!("registry.rs:error reading {}", path.display()))?;
        let registry = Self::from_reader(file);

        if registry.is_empty() {
            warn!("Device registry {} contains no usable meters", path.display());
        } else {
            info!("Device registry loaded: {} meters", registry.len());
        }

        Ok(registry)
    }

    /// Parses tab-separated `device_id, range_start, range_stop, unit` rows.
    /// Malformed rows are logged and skipped.
    pub fn from_reader<R: Read>(reader: R) -> Self {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut meters = HashMap::new();

        for (index, record) in reader.records().enumerate() {
            let line = record
                .as_ref()
                .ok()
                .and_then(|r| r.position())
                .map(|p| p.line())
                .unwrap_or(index as u64 + 1);

            let parsed = record
                .map_err(|e| MalformedEntry {
                    line,
                    reason: e.to_string(),
                })
                .and_then(|record| Self::parse_record(line, &record));

            match parsed {
                Ok((device_id, spec)) => {
                    debug!(
                        "Meter added: id={}, range=({}, {}), unit={}",
                        device_id, spec.range_start, spec.range_stop, spec.unit
                    );
                    if meters.insert(device_id.clone(), spec).is_some() {
                        warn!("registry line {}: duplicate device {}, later entry wins", line, device_id);
                    }
                }
                Err(e) => warn!("Skipping malformed registry entry: {}", e),
            }
        }

        Self { meters }
    }

    fn parse_record(
        line: u64,
        record: &csv::StringRecord,
    ) -> std::result::Result<(String, MeterSpec), MalformedEntry> {
        let malformed = |reason: String| MalformedEntry { line, reason };

        if record.len() != 4 {
            return Err(malformed(format!("expected 4 fields, got {}", record.len())));
        }

        let device_id = record[0].trim();
        if device_id.is_empty() {
            return Err(malformed("empty device id".to_string()));
        }

        let range_start: f64 = record[1]
            .trim()
            .parse()
            .map_err(|_| malformed(format!("invalid range start {:?}", &record[1])))?;
        let range_stop: f64 = record[2]
            .trim()
            .parse()
            .map_err(|_| malformed(format!("invalid range stop {:?}", &record[2])))?;
        let unit = Unit::from_token(&record[3])
            .ok_or_else(|| malformed(format!("unknown unit {:?}", &record[3])))?;

        if range_start > range_stop {
            return Err(malformed(format!(
                "range start {} exceeds range stop {}",
                range_start, range_stop
            )));
        }

        Ok((device_id.to_string(), MeterSpec::new(range_start, range_stop, unit)))
    }

    pub fn lookup(&self, device_id: &str) -> Option<&MeterSpec> {
        self.meters.get(device_id)
    }

    pub fn len(&self) -> usize {
        self.meters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meters.is_empty()
    }
}

impl FromIterator<(String, MeterSpec)> for Registry {
    fn from_iter<I: IntoIterator<Item = (String, MeterSpec)>>(iter: I) -> Self {
        Self {
            meters: iter.into_iter().collect(),
        }
    }
}
