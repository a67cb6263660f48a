use std::path::PathBuf;
use std::str::FromStr;

use tracing::{info, warn};

use crate::engine::BookingError;
use crate::model::LocalCalendar;

pub const WAL_FILE_NAME: &str = "roomdesk.wal";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Requesters' local calendar, minutes east of UTC.
    pub utc_offset_minutes: i32,
    pub metrics_port: Option<u16>,
    pub compact_threshold: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            utc_offset_minutes: 0,
            metrics_port: None,
            compact_threshold: 1000,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; missing or unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: lookup("ROOMDESK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            utc_offset_minutes: parse_or(&lookup, "ROOMDESK_UTC_OFFSET_MINUTES", defaults.utc_offset_minutes),
            metrics_port: lookup("ROOMDESK_METRICS_PORT").and_then(|s| match s.parse() {
                Ok(port) => Some(port),
                Err(e) => {
                    warn!("ignoring ROOMDESK_METRICS_PORT={s}: {e}");
                    None
                }
            }),
            compact_threshold: parse_or(&lookup, "ROOMDESK_COMPACT_THRESHOLD", defaults.compact_threshold),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(WAL_FILE_NAME)
    }

    pub fn calendar(&self) -> Result<LocalCalendar, BookingError> {
        LocalCalendar::from_offset_minutes(self.utc_offset_minutes)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => {
            info!("{key} not set, using default: {default}");
            default
        }
        Some(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("invalid {key}={raw} ({e}), using default: {default}");
            default
        }),
    }
}
