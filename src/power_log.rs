use crate::prelude::*;

use chrono::NaiveDateTime;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Append-only file of derived power samples, one `<power>|<timestamp>` line each.
#[derive(Debug, Clone)]
pub struct PowerLog {
    file: Arc<Mutex<std::fs::File>>,
    path: PathBuf,
    samples_written: Arc<Mutex<u64>>,
}

impl PowerLog {
    /// Opens `<dir>/<YYYY-MM-DD-HH-MM-SS>.txt` named after the run's start time.
    pub fn for_run<P: AsRef<Path>>(dir: P, started: NaiveDateTime) -> Result<Self> {
        let name = format!("{}.txt", started.format("%Y-%m-%d-%H-%M-%S"));
        Self::new(dir.as_ref().join(name))
    }

    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening power log at {}", path.display());

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("power_log.rs:cannot create log directory {}", parent.display())
                })?;
            }
        }

        let file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => f,
            Err(e) => {
                error!("Failed to open power log {}: {}", path.display(), e);
                return Err(e.into());
            }
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644)) {
                warn!("Failed to set permissions on power log {}: {}", path.display(), e);
            }
        }

        Ok(Self {
            file: Arc::new(Mutex::new(file)),
            path: path.to_path_buf(),
            samples_written: Arc::new(Mutex::new(0)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_sample(&self, sample: &PowerSample) -> Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| anyhow!("power_log.rs:failed to lock power log"))?;

        if let Err(e) = file.write_all(sample.to_log_line().as_bytes()) {
            error!("Failed to write to power log {}: {}", self.path.display(), e);
            return Err(e.into());
        }
        if let Err(e) = file.flush() {
            error!("Failed to flush power log {}: {}", self.path.display(), e);
            return Err(e.into());
        }

        let mut written = self
            .samples_written
            .lock()
            .map_err(|_| anyhow!("power_log.rs:failed to lock sample counter"))?;
        *written += 1;
        trace!("Total samples stored in power log: {}", *written);

        Ok(())
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written.lock().map(|n| *n).unwrap_or_default()
    }
}
