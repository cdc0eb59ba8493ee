use crate::prelude::*;

use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds};
use std::time::Duration;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default = "Config::default_server")]
    pub server: Server,

    #[serde(default = "Config::default_registry_file")]
    pub registry_file: String,

    #[serde(default = "Config::default_log_path")]
    pub log_path: String,

    #[serde(default = "Config::default_power")]
    pub power: Power,

    #[serde(default = "Config::default_plot")]
    pub plot: Plot,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,

    #[serde(default = "Config::default_simulator")]
    pub simulator: Simulator,
}

// Server {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Server {
    #[serde(default = "Config::default_host")]
    pub host: String,
    #[serde(default = "Config::default_port")]
    pub port: u16,

    pub read_timeout: Option<u64>,
    pub tcp_keepalive: Option<u64>,
    pub max_connections: Option<usize>,
}
impl Server {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Seconds of silence before a connection is dropped, 0 disables.
    pub fn read_timeout(&self) -> u64 {
        self.read_timeout.unwrap_or(0)
    }

    pub fn tcp_keepalive(&self) -> u64 {
        self.tcp_keepalive.unwrap_or(60)
    }

    pub fn max_connections(&self) -> Option<usize> {
        self.max_connections
    }
} // }}}

// Power {{{
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct Power {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "interval_ms", default = "Config::default_interval")]
    pub interval: Duration,

    #[serde(default = "Config::default_max_time_diff_ms")]
    pub max_time_diff_ms: i64,

    #[serde(default = "Config::default_history_limit")]
    pub history_limit: usize,
}
impl Power {
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_time_diff(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.max_time_diff_ms)
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }
} // }}}

// Plot {{{
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct Plot {
    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "interval_ms", default = "Config::default_interval")]
    pub interval: Duration,

    pub snapshot_file: Option<String>,
}
impl Plot {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn snapshot_file(&self) -> Option<&str> {
        self.snapshot_file.as_deref()
    }
} // }}}

// Simulator {{{
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct Simulator {
    #[serde(default = "Config::default_sim_host")]
    pub host: String,
    #[serde(default = "Config::default_port")]
    pub port: u16,

    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "delay_ms", default = "Config::default_sim_delay")]
    pub delay: Duration,

    #[serde(default = "Config::default_sim_devices")]
    pub devices: Vec<SimDevice>,
}
impl Simulator {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn devices(&self) -> &[SimDevice] {
        &self.devices
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SimDevice {
    pub device_id: String,
    pub range_start: f64,
    pub range_stop: f64,
}
impl SimDevice {
    pub fn new(device_id: &str, range_start: f64, range_stop: f64) -> Self {
        Self {
            device_id: device_id.to_string(),
            range_start,
            range_stop,
        }
    }
} // }}}

impl Config {
    pub fn new(file: String) -> Result<Self> {
        info!("Reading configuration from {}", file);
        let content = std::fs::read_to_string(&file)
            .map_err(|err| anyhow!("config.rs:error reading {}: {}", file, err))?;

        Self::from_yaml(&content)
    }

    /// Logs the effective settings. Called once logging is up.
    pub fn log_summary(&self) {
        info!("Configuration loaded successfully:");
        info!("  Server:");
        info!("    Listen: {}", self.server.bind_address());
        info!("    Read Timeout: {}s", self.server.read_timeout());
        info!("    TCP Keepalive: {}s", self.server.tcp_keepalive());
        match self.server.max_connections {
            Some(max) => info!("    Max Connections: {}", max),
            None => info!("    Max Connections: unbounded"),
        }
        info!("  Registry File: {}", self.registry_file);
        info!("  Log Path: {}", self.log_path);
        info!("  Power:");
        info!("    Interval: {}ms", self.power.interval.as_millis());
        info!("    Max Time Diff: {}ms", self.power.max_time_diff_ms);
        info!("    History Limit: {}", self.power.history_limit);
        info!("  Plot Feed: {}", if self.plot.enabled { "enabled" } else { "disabled" });
        if self.plot.enabled {
            info!("    Interval: {}ms", self.plot.interval.as_millis());
            if let Some(file) = &self.plot.snapshot_file {
                info!("    Snapshot File: {}", file);
            }
        }
        info!("  Log Level: {}", self.loglevel);
    }

    /// Parses and validates a YAML document without touching the filesystem.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|err| anyhow!("config.rs:error parsing config: {}", err))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("server.port must be between 1 and 65535");
        }
        if self.server.host.is_empty() {
            return Err(anyhow!("config.rs:server host cannot be empty"));
        }
        if self.server.max_connections == Some(0) {
            return Err(anyhow!("config.rs:server.max_connections must be at least 1"));
        }

        if self.registry_file.is_empty() {
            return Err(anyhow!("config.rs:registry_file cannot be empty"));
        }

        if self.power.interval.is_zero() {
            bail!("power.interval_ms must be greater than 0");
        }
        if self.power.max_time_diff_ms < 0 {
            bail!("power.max_time_diff_ms cannot be negative");
        }
        if self.power.history_limit == 0 {
            bail!("power.history_limit must be greater than 0");
        }

        if self.plot.enabled && self.plot.interval.is_zero() {
            bail!("plot.interval_ms must be greater than 0");
        }

        if self.simulator.delay.is_zero() {
            bail!("simulator.delay_ms must be greater than 0");
        }
        for device in &self.simulator.devices {
            if device.range_start > device.range_stop {
                bail!(
                    "simulator device {} has range_start {} above range_stop {}",
                    device.device_id,
                    device.range_start,
                    device.range_stop
                );
            }
        }

        Ok(())
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn registry_file(&self) -> &str {
        &self.registry_file
    }

    pub fn log_path(&self) -> &str {
        &self.log_path
    }

    pub fn power(&self) -> &Power {
        &self.power
    }

    pub fn plot(&self) -> &Plot {
        &self.plot
    }

    pub fn loglevel(&self) -> &str {
        &self.loglevel
    }

    pub fn simulator(&self) -> &Simulator {
        &self.simulator
    }

    fn default_server() -> Server {
        Server {
            host: Self::default_host(),
            port: Self::default_port(),
            read_timeout: None,
            tcp_keepalive: None,
            max_connections: None,
        }
    }

    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_port() -> u16 {
        44444
    }

    fn default_registry_file() -> String {
        "ip_mapping.txt".to_string()
    }

    fn default_log_path() -> String {
        "logs".to_string()
    }

    fn default_power() -> Power {
        Power {
            interval: Self::default_interval(),
            max_time_diff_ms: Self::default_max_time_diff_ms(),
            history_limit: Self::default_history_limit(),
        }
    }

    fn default_interval() -> Duration {
        Duration::from_millis(1000)
    }

    fn default_max_time_diff_ms() -> i64 {
        crate::store::default_max_time_diff().num_milliseconds()
    }

    fn default_history_limit() -> usize {
        crate::store::DEFAULT_HISTORY_LIMIT
    }

    fn default_plot() -> Plot {
        Plot {
            enabled: Self::default_enabled(),
            interval: Self::default_interval(),
            snapshot_file: None,
        }
    }

    fn default_enabled() -> bool {
        true
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }

    fn default_simulator() -> Simulator {
        Simulator {
            host: Self::default_sim_host(),
            port: Self::default_port(),
            delay: Self::default_sim_delay(),
            devices: Self::default_sim_devices(),
        }
    }

    fn default_sim_host() -> String {
        "127.0.0.1".to_string()
    }

    fn default_sim_delay() -> Duration {
        Duration::from_millis(1000)
    }

    fn default_sim_devices() -> Vec<SimDevice> {
        vec![
            SimDevice::new("10.0.0.1", 0.0, 110.0),
            SimDevice::new("10.0.0.2", 0.0, 0.5),
            SimDevice::new("10.0.0.3", 0.2, 1.0),
            SimDevice::new("10.0.0.4", 1.0, 5.0),
            SimDevice::new("10.0.0.8", 3.0, 10.0),
        ]
    }
}
