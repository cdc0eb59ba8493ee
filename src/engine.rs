use crate::channels::ChannelData;
use crate::prelude::*;

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Runs a power derivation pass on the store at a fixed interval.
pub struct PowerEngine {
    store: Store,
    interval: Duration,
    max_time_diff: chrono::Duration,
    channels: Channels,
    stats: Arc<Mutex<IngestStats>>,
}

impl PowerEngine {
    pub fn new(
        power: &config::Power,
        store: Store,
        channels: Channels,
        stats: Arc<Mutex<IngestStats>>,
    ) -> Self {
        Self {
            store,
            interval: power.interval(),
            max_time_diff: power.max_time_diff(),
            channels,
            stats,
        }
    }

    pub async fn start(&self) -> Result<()> {
        let mut rx = self.channels.to_engine.subscribe();
        let mut interval = tokio::time::interval(self.interval);
        // an overrunning pass is followed straight away by the next, not by a burst
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Power engine started (interval {}ms, window {}ms)",
            self.interval.as_millis(),
            self.max_time_diff.num_milliseconds()
        );

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Ok(ChannelData::Shutdown) | Err(broadcast::error::RecvError::Closed) => break,
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    }
                }
                _ = interval.tick() => self.pass(),
            }
        }

        info!("Power engine stopped");
        Ok(())
    }

    pub fn stop(&self) {
        let _ = self.channels.to_engine.send(ChannelData::Shutdown);
    }

    fn pass(&self) {
        let sample = self.store.derive_power(self.max_time_diff);

        let mut stats = IngestStats::lock(&self.stats);
        stats.derivation_passes += 1;
        if sample.is_some() {
            stats.samples_derived += 1;
        }
    }
}
