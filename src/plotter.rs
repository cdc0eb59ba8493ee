use crate::channels::ChannelData;
use crate::prelude::*;

use chrono::{Duration as ChronoDuration, NaiveDateTime};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// One render of the derived power series with its axis bounds.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlotFrame {
    pub samples: Vec<PowerSample>,
    pub x_range: (NaiveDateTime, NaiveDateTime),
    pub y_range: (f64, f64),
}

impl PlotFrame {
    /// x spans the first sample to one second past the last, y is padded by
    /// 10% on each side. `None` for an empty series.
    pub fn from_samples(samples: Vec<PowerSample>) -> Option<Self> {
        let first = samples.first()?.timestamp;
        let last = samples.last()?.timestamp;

        let (min, max) = samples
            .iter()
            .map(|s| s.power)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
                (lo.min(p), hi.max(p))
            });

        let (low, high) = (min * 0.9, max * 1.1);
        let y_range = if low <= high { (low, high) } else { (high, low) };

        Some(Self {
            samples,
            x_range: (first, last + ChronoDuration::seconds(1)),
            y_range,
        })
    }
}

/// Read-only consumer of the store's power history.
pub struct PlotFeed {
    store: Store,
    interval: Duration,
    snapshot_file: Option<PathBuf>,
    channels: Channels,
}

impl PlotFeed {
    pub fn new(plot: &config::Plot, store: Store, channels: Channels) -> Self {
        Self {
            store,
            interval: plot.interval(),
            snapshot_file: plot.snapshot_file().map(PathBuf::from),
            channels,
        }
    }

    pub async fn start(&self) -> Result<()> {
        let mut rx = self.channels.to_plot_feed.subscribe();

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Ok(ChannelData::Shutdown) | Err(broadcast::error::RecvError::Closed) => break,
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    }
                }
                _ = tokio::time::sleep(self.interval) => {
                    if let Some(frame) = self.frame() {
                        if let Err(e) = self.publish(&frame) {
                            warn!("Failed to write plot snapshot: {}", e);
                        }
                    }
                }
            }
        }

        info!("Plot feed stopped");
        Ok(())
    }

    pub fn stop(&self) {
        let _ = self.channels.to_plot_feed.send(ChannelData::Shutdown);
    }

    pub fn frame(&self) -> Option<PlotFrame> {
        PlotFrame::from_samples(self.store.snapshot_power())
    }

    fn publish(&self, frame: &PlotFrame) -> Result<()> {
        debug!(
            "Plot frame: {} samples, y {:.2}..{:.2}",
            frame.samples.len(),
            frame.y_range.0,
            frame.y_range.1
        );

        if let Some(path) = &self.snapshot_file {
            let json = serde_json::to_vec(frame)?;
            std::fs::write(path, json)
                .with_context(|| format!("plotter.rs:cannot write {}", path.display()))?;
        }

        Ok(())
    }
}
