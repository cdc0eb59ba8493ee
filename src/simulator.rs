use crate::channels::ChannelData;
use crate::prelude::*;

pub use crate::config::SimDevice;

use chrono::{NaiveDateTime, SubsecRound};
use rand::Rng;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::MissedTickBehavior;

/// A uniformly random reading for `device`, rounded to two decimals and
/// stamped with `now` at microsecond precision.
pub fn generate_reading<R: Rng + ?Sized>(
    device: &SimDevice,
    now: NaiveDateTime,
    rng: &mut R,
) -> Reading {
    let value = if device.range_start < device.range_stop {
        rng.gen_range(device.range_start..=device.range_stop)
    } else {
        device.range_start
    };
    let value = ((value * 100.0).round() / 100.0).clamp(device.range_start, device.range_stop);

    Reading::new(&device.device_id, now.trunc_subsecs(6), value)
}

/// Synthetic client streaming readings for a set of devices to the server.
pub struct Simulator {
    config: config::Simulator,
    channels: Channels,
}

impl Simulator {
    pub fn new(config: config::Simulator, channels: Channels) -> Self {
        Self { config, channels }
    }

    /// Connects once and sends one line per device right away, then every
    /// `delay` until shutdown. A write failure ends the run with an error.
    pub async fn run(&self) -> Result<()> {
        let mut rx = self.channels.to_simulator.subscribe();
        let address = self.config.address();
        let mut stream = TcpStream::connect(&address)
            .await
            .map_err(|e| file_error_with_source!(e, "cannot connect to {}", address))?;
        info!("Connected to {}", address);

        let mut lines_sent: u64 = 0;
        // first tick fires immediately
        let mut ticker = tokio::time::interval(self.config.delay());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Ok(ChannelData::Shutdown) | Err(broadcast::error::RecvError::Closed) => break,
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    }
                }
                _ = ticker.tick() => {
                    let batch = self.batch();
                    stream
                        .write_all(batch.as_bytes())
                        .await
                        .map_err(|e| anyhow!("simulator.rs:write to {} failed: {}", address, e))?;
                    lines_sent += self.config.devices().len() as u64;
                    trace!("{}", batch.trim_end());
                }
            }
        }

        info!("Simulator stopped after {} lines", lines_sent);
        Ok(())
    }

    pub fn stop(&self) {
        let _ = self.channels.to_simulator.send(ChannelData::Shutdown);
    }

    fn batch(&self) -> String {
        let now = chrono::Local::now().naive_local();
        let mut rng = rand::thread_rng();

        self.config
            .devices()
            .iter()
            .map(|device| generate_reading(device, now, &mut rng).encode())
            .collect()
    }
}
