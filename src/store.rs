use crate::power_log::PowerLog;
use crate::prelude::*;

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

pub fn default_max_time_diff() -> Duration {
    Duration::milliseconds(500)
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoredEntry {
    pub device_id: String,
    pub timestamp: NaiveDateTime,
    pub value: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PowerSample {
    pub timestamp: NaiveDateTime,
    pub power: f64,
}

impl PowerSample {
    pub fn to_log_line(&self) -> String {
        // {:?} keeps the decimal point on whole numbers (50.0, not 50)
        format!(
            "{:?}|{}\n",
            self.power,
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.6f")
        )
    }
}

#[derive(Debug, Default)]
struct State {
    entries_voltage: Vec<StoredEntry>,
    entries_current: Vec<StoredEntry>,
    derived_power: VecDeque<PowerSample>,
    dirty: bool,
}

/// Validated readings plus the derived power history, all behind one lock.
///
/// Cloning is cheap and every clone shares the same state and power log.
#[derive(Clone, Debug)]
pub struct Store {
    state: Arc<Mutex<State>>,
    power_log: PowerLog,
    history_limit: usize,
}

impl Store {
    pub fn new(power_log: PowerLog) -> Self {
        Self::with_history_limit(power_log, DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(power_log: PowerLog, history_limit: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            power_log,
            history_limit,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn append_validated(&self, device_id: &str, timestamp: NaiveDateTime, value: f64, unit: Unit) {
        let entry = StoredEntry {
            device_id: device_id.to_string(),
            timestamp,
            value,
        };

        let mut state = self.lock();
        match unit {
            Unit::Volts => state.entries_voltage.push(entry),
            Unit::Amps => state.entries_current.push(entry),
        }
        state.dirty = true;
    }

    /// One derivation pass.
    ///
    /// The anchor is the most recently appended voltage entry. Current entries
    /// are scanned newest first and the closest one within `max_time_diff`
    /// wins; on equal distance the newer entry is kept. Current entries are not
    /// consumed and may pair with later anchors again.
    pub fn derive_power(&self, max_time_diff: Duration) -> Option<PowerSample> {
        let mut state = self.lock();

        if !state.dirty {
            return None;
        }

        let (anchor, closest) = {
            let anchor = state.entries_voltage.last()?;
            if state.entries_current.is_empty() {
                return None;
            }

            let mut closest: Option<(&StoredEntry, Duration)> = None;
            for candidate in state.entries_current.iter().rev() {
                let diff = abs_diff(anchor.timestamp, candidate.timestamp);
                if diff > max_time_diff {
                    continue;
                }
                if closest.map_or(true, |(_, best)| diff < best) {
                    closest = Some((candidate, diff));
                }
            }

            (anchor.clone(), closest.map(|(entry, _)| entry.clone()))
        };

        let sample = closest.as_ref().map(|current| PowerSample {
            timestamp: anchor.timestamp,
            power: anchor.value * current.value,
        });

        if let Some(sample) = sample {
            debug!(
                "Power derived: {} W at {} ({} x {})",
                sample.power, sample.timestamp, anchor.device_id, current_id(&closest)
            );

            state.derived_power.push_back(sample);
            if let Err(e) = self.power_log.write_sample(&sample) {
                error!("Failed to persist power sample: {}", e);
            }
            while state.derived_power.len() > self.history_limit {
                state.derived_power.pop_front();
            }
        } else {
            debug!(
                "No current reading within {} ms of voltage at {}",
                max_time_diff.num_milliseconds(),
                anchor.timestamp
            );
        }

        state.dirty = false;
        sample
    }

    /// Copy of the derived power series, oldest first.
    pub fn snapshot_power(&self) -> Vec<PowerSample> {
        self.lock().derived_power.iter().copied().collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.lock().dirty
    }

    pub fn voltage_count(&self) -> usize {
        self.lock().entries_voltage.len()
    }

    pub fn current_count(&self) -> usize {
        self.lock().entries_current.len()
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    pub fn power_log(&self) -> &PowerLog {
        &self.power_log
    }
}

fn abs_diff(a: NaiveDateTime, b: NaiveDateTime) -> Duration {
    if a >= b {
        a - b
    } else {
        b - a
    }
}

fn current_id(entry: &Option<StoredEntry>) -> &str {
    entry.as_ref().map(|e| e.device_id.as_str()).unwrap_or_default()
}
