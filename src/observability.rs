use std::net::SocketAddr;

use crate::model::Role;

// ── Request-driven ──────────────────────────────────────────────

/// Counter: booking attempts. Labels: outcome.
pub const BOOKINGS_TOTAL: &str = "medslot_bookings_total";

/// Counter: single-appointment cancellations. Labels: by.
pub const CANCELLATIONS_TOTAL: &str = "medslot_cancellations_total";

/// Counter: unavailability reports. Labels: scope.
pub const UNAVAILABILITY_REPORTS_TOTAL: &str = "medslot_unavailability_reports_total";

/// Histogram: appointments cancelled by one cascade.
pub const CASCADE_SIZE: &str = "medslot_cascade_size";

/// Counter: notification deliveries. Labels: status.
pub const NOTIFICATIONS_TOTAL: &str = "medslot_notifications_total";

// ── Storage ─────────────────────────────────────────────────────

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "medslot_journal_flush_duration_seconds";

/// Histogram: events per journal flush.
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "medslot_journal_flush_batch_size";

/// Counter: completed journal compactions.
pub const JOURNAL_COMPACTIONS_TOTAL: &str = "medslot_journal_compactions_total";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

pub fn role_label(role: Role) -> &'static str {
    match role {
        Role::Patient => "patient",
        Role::Doctor => "doctor",
        Role::Admin => "admin",
    }
}
