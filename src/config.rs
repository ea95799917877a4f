use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::limits::{DEFAULT_HORIZON_DAYS, MAX_HORIZON_DAYS};

/// Daemon settings, read from `MEDSLOT_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    /// Journal appends before the compactor rewrites the file.
    pub compact_threshold: u64,
    pub reminder_interval: Duration,
    pub horizon_days: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            compact_threshold: 1000,
            reminder_interval: Duration::from_secs(24 * 60 * 60),
            horizon_days: DEFAULT_HORIZON_DAYS,
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("ignoring unparsable {key}={raw:?}");
            None
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unset or unparsable values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: lookup("MEDSLOT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            metrics_port: parsed(&lookup, "MEDSLOT_METRICS_PORT"),
            compact_threshold: parsed(&lookup, "MEDSLOT_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            reminder_interval: parsed(&lookup, "MEDSLOT_REMINDER_INTERVAL_SECS")
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.reminder_interval),
            horizon_days: parsed(&lookup, "MEDSLOT_HORIZON_DAYS")
                .map(|d: u32| d.min(MAX_HORIZON_DAYS))
                .unwrap_or(defaults.horizon_days),
        }
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join("medslot.journal")
    }
}
