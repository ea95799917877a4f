use std::sync::Arc;
use std::time::Duration;

use chrono::Days;
use tracing::{debug, error, info};

use crate::engine::Engine;
use crate::notify::{DispatchReport, Notifier, dispatch};

/// Send reminders for every Pending appointment dated tomorrow.
pub async fn send_reminders(engine: &Engine, notifier: &dyn Notifier) -> DispatchReport {
    let Some(tomorrow) = engine.clock().today().checked_add_days(Days::new(1)) else {
        return DispatchReport::default();
    };
    let reminders = engine.upcoming_reminders(tomorrow).await;
    if reminders.is_empty() {
        debug!(%tomorrow, "no reminders due");
        return DispatchReport::default();
    }
    let report = dispatch(notifier, &reminders).await;
    info!(%tomorrow, sent = report.sent, failed = report.failed, "reminder sweep");
    report
}

/// Periodic reminder sweep. The first tick fires immediately.
pub async fn run_reminder_sweep(engine: Arc<Engine>, notifier: Arc<dyn Notifier>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        send_reminders(&engine, notifier.as_ref()).await;
    }
}

/// Compacts the journal once enough appends have piled up since the last one.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let appends = engine.journal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_journal().await {
            Ok(()) => info!(appends, "journal compaction done"),
            Err(e) => error!("journal compaction failed: {e}"),
        }
    }
}
