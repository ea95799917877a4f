use std::sync::Arc;

use tracing::info;

use medslot::clock::SystemClock;
use medslot::config::Config;
use medslot::engine::Engine;
use medslot::notify::{Notifier, TracingNotifier};
use medslot::sweep;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    medslot::observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;
    let journal_path = config.journal_path();
    let engine = Arc::new(
        Engine::new(journal_path.clone(), Arc::new(SystemClock))?.with_horizon_days(config.horizon_days),
    );

    info!("medslot started");
    info!("  journal: {}", journal_path.display());
    info!("  compact_threshold: {}", config.compact_threshold);
    info!("  reminder_interval: {}s", config.reminder_interval.as_secs());
    info!("  horizon_days: {}", config.horizon_days);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    // Email transport lives outside the engine; the daemon logs payloads.
    let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier);
    let reminders = tokio::spawn(sweep::run_reminder_sweep(
        engine.clone(),
        notifier,
        config.reminder_interval,
    ));
    let compactor = tokio::spawn(sweep::run_compactor(engine.clone(), config.compact_threshold));

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }

    info!("shutdown signal received, stopping background tasks");
    reminders.abort();
    compactor.abort();

    // Every acknowledged write is already fsynced; compact so the next start replays less.
    if let Err(e) = engine.compact_journal().await {
        tracing::warn!("final compaction skipped: {e}");
    }

    info!("medslot stopped");
    Ok(())
}
