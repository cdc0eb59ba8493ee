use crate::prelude::*;

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default, Debug, Clone)]
pub struct IngestStats {
    // Connection stats
    pub connections_accepted: u64,
    pub connections_closed: u64,
    pub connection_faults: u64,
    pub accept_errors: u64,
    // Line stats
    pub lines_received: u64,
    pub readings_stored: u64,
    pub decode_errors: u64,
    pub unknown_device: u64,
    pub unit_mismatch: u64,
    pub out_of_range: u64,
    // Derivation stats
    pub derivation_passes: u64,
    pub samples_derived: u64,
    // Stored readings per device
    pub readings_by_device: HashMap<String, u64>,
}

impl IngestStats {
    /// Locks shared counters, recovering them if a holder panicked.
    pub fn lock(shared: &Mutex<Self>) -> MutexGuard<'_, Self> {
        shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_accepted(&mut self) {
        self.connections_accepted += 1;
    }

    /// Every accepted connection ends up here exactly once.
    pub fn record_connection_end<E>(&mut self, result: &std::result::Result<(), E>) {
        match result {
            Ok(()) => self.connections_closed += 1,
            Err(_) => self.connection_faults += 1,
        }
    }

    /// Accepted connections that have not ended yet.
    pub fn open_connections(&self) -> u64 {
        self.connections_accepted
            .saturating_sub(self.connections_closed + self.connection_faults)
    }

    pub fn record_rejection(&mut self, rejection: &Rejection) {
        match rejection {
            Rejection::UnknownDevice(_) => self.unknown_device += 1,
            Rejection::UnitMismatch { .. } => self.unit_mismatch += 1,
            Rejection::OutOfRange { .. } => self.out_of_range += 1,
        }
    }

    pub fn record_stored(&mut self, device_id: &str) {
        self.readings_stored += 1;
        *self.readings_by_device.entry(device_id.to_string()).or_default() += 1;
    }

    pub fn print_summary(&self) {
        info!("Ingest Statistics:");
        info!("  Connections:");
        info!("    Accepted: {}", self.connections_accepted);
        info!("    Closed: {}", self.connections_closed);
        info!("    Faulted: {}", self.connection_faults);
        info!("    Still open: {}", self.open_connections());
        info!("    Accept errors: {}", self.accept_errors);
        info!("  Lines:");
        info!("    Received: {}", self.lines_received);
        info!("    Stored: {}", self.readings_stored);
        info!("    Decode errors: {}", self.decode_errors);
        info!("    Unknown device: {}", self.unknown_device);
        info!("    Unit mismatch: {}", self.unit_mismatch);
        info!("    Out of range: {}", self.out_of_range);
        info!("  Power derivation:");
        info!("    Passes: {}", self.derivation_passes);
        info!("    Samples derived: {}", self.samples_derived);
        info!("  Stored readings by device:");
        let mut devices: Vec<_> = self.readings_by_device.iter().collect();
        devices.sort();
        for (device_id, count) in devices {
            info!("    {}: {}", device_id, count);
        }
    }
}
