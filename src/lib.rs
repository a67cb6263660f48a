pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod reaper;
pub mod wal;

use std::sync::Arc;

use crate::config::Config;
use crate::engine::{BookingError, BookingService, Ledger};

/// Open the durable ledger described by `config`, start its compactor and
/// return a booking service over it. Installs the Prometheus listener when
/// `metrics_port` is set, which can happen once per process.
/// Must run inside a tokio runtime.
pub async fn start(config: &Config) -> Result<BookingService<Ledger>, BookingError> {
    let calendar = config.calendar()?;
    observability::init(config.metrics_port).map_err(|e| BookingError::Startup(e.to_string()))?;
    std::fs::create_dir_all(&config.data_dir)?;
    let ledger = Arc::new(Ledger::open(&config.wal_path())?);

    metrics::gauge!(observability::ROOMS_ACTIVE).set(ledger.active_room_count().await as f64);

    let compactor = ledger.clone();
    let threshold = config.compact_threshold;
    tokio::spawn(async move {
        reaper::run_compactor(compactor, threshold).await;
    });

    tracing::info!(
        "roomdesk ready: data_dir={} utc_offset_minutes={}",
        config.data_dir.display(),
        config.utc_offset_minutes
    );
    Ok(BookingService::new(ledger, calendar))
}
