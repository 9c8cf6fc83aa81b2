//! Geiger pulse counting and raw pulse logging.
//!
//! Pulses are tallied per reporting interval and, when a log file could be
//! opened, appended to it as the big-endian `i64` nanoseconds elapsed since
//! the counter was created:
//!
//! ```text
//! radiation-<unix-seconds>.data
//! ┌──────────────┬──────────────┬─────
//! │ i64 BE nanos │ i64 BE nanos │ ...
//! └──────────────┴──────────────┴─────
//! ```

use crate::config::RadiationConfig;
use crate::error::Result;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Append-only raw pulse timestamp log
pub struct PulseLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl PulseLog {
    /// Create `radiation-<unix-seconds>.data` inside `directory`
    pub fn create_in(directory: &Path) -> Result<Self> {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let path = directory.join(format!("radiation-{}.data", stamp));
        let file = File::create(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    /// Open a log in the configured directory, else the home directory
    ///
    /// Returns `None` (counting continues without a log) if neither works.
    pub fn open(config: &RadiationConfig) -> Option<Self> {
        let mut candidates = Vec::new();
        if !config.save_directory.is_empty() {
            candidates.push(PathBuf::from(&config.save_directory));
        }
        if let Some(home) = std::env::var_os("HOME") {
            candidates.push(PathBuf::from(home));
        }

        for dir in candidates {
            match Self::create_in(&dir) {
                Ok(log) => {
                    log::info!("Radiation pulses logged to {}", log.path.display());
                    return Some(log);
                }
                Err(e) => log::warn!("Cannot create radiation log in {}: {}", dir.display(), e),
            }
        }
        log::warn!("Radiation pulse log disabled");
        None
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&mut self, nanos: i64) -> Result<()> {
        self.writer.write_all(&nanos.to_be_bytes())?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Per-interval pulse tally shared between the pulse source and the sampler
pub struct RadiationCounter {
    count: AtomicU32,
    total: AtomicU32,
    started: Instant,
    log: Mutex<Option<PulseLog>>,
}

impl RadiationCounter {
    pub fn new(log: Option<PulseLog>) -> Self {
        Self {
            count: AtomicU32::new(0),
            total: AtomicU32::new(0),
            started: Instant::now(),
            log: Mutex::new(log),
        }
    }

    pub fn from_config(config: &RadiationConfig) -> Self {
        Self::new(PulseLog::open(config))
    }

    /// Count one pulse observed at `at`
    pub fn record_pulse(&self, at: Instant) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);

        let mut guard = self.log.lock();
        if let Some(log) = guard.as_mut() {
            let nanos = at.saturating_duration_since(self.started).as_nanos();
            let nanos = i64::try_from(nanos).unwrap_or(i64::MAX);
            if let Err(e) = log.record(nanos) {
                log::error!("Radiation log write failed, disabling log: {}", e);
                *guard = None;
            }
        }
    }

    /// Return the pulses counted since the last call and reset to zero
    pub fn take_count(&self) -> u32 {
        self.count.swap(0, Ordering::Relaxed)
    }

    /// Pulses in the current interval so far
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    /// Pulses since creation
    pub fn total(&self) -> u32 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn log_path(&self) -> Option<PathBuf> {
        self.log.lock().as_ref().map(|l| l.path().to_path_buf())
    }

    pub fn flush(&self) {
        if let Some(log) = self.log.lock().as_mut()
            && let Err(e) = log.flush()
        {
            log::warn!("Radiation log flush failed: {}", e);
        }
    }
}

impl Drop for RadiationCounter {
    fn drop(&mut self) {
        self.flush();
    }
}
