use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

// ── Booking flow ────────────────────────────────────────────────

/// Counter: reservation writes. Labels: op (create/update/delete), status.
pub const RESERVATIONS_TOTAL: &str = "innkeep_reservations_total";

/// Counter: bookings rejected for date conflicts.
pub const RESERVATION_CONFLICTS_TOTAL: &str = "innkeep_reservation_conflicts_total";

/// Gauge: accommodations currently loaded.
pub const ACCOMMODATIONS: &str = "innkeep_accommodations";

// ── SSO ─────────────────────────────────────────────────────────

/// Counter: SSO callback outcomes. Labels: outcome.
pub const SSO_LOGINS_TOTAL: &str = "innkeep_sso_logins_total";

/// Counter: key-set fetches. Labels: outcome (ok/error/stale).
pub const JWKS_FETCHES_TOTAL: &str = "innkeep_jwks_fetches_total";

// ── Storage ─────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "innkeep_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (records per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "innkeep_wal_flush_batch_size";

/// Install the fmt subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init_metrics(port: Option<u16>) -> anyhow::Result<()> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
