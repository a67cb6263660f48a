use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking submissions. Labels: outcome (`accepted` or an error kind).
pub const BOOKING_SUBMISSIONS_TOTAL: &str = "roomdesk_booking_submissions_total";

/// Counter: reservation status changes. Labels: to.
pub const STATUS_TRANSITIONS_TOTAL: &str = "roomdesk_status_transitions_total";

/// Histogram: time spent in the conflict check, in seconds.
pub const CONFLICT_CHECK_DURATION_SECONDS: &str = "roomdesk_conflict_check_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: rooms currently accepting bookings.
pub const ROOMS_ACTIVE: &str = "roomdesk_rooms_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "roomdesk_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "roomdesk_wal_flush_batch_size";

/// Install the fmt subscriber. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().try_init();
}

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
