use {
    super::correlator::Correlator,
    std::{sync::Arc, time::Duration},
    tokio::sync::watch,
};

/// Periodically expire overdue transactions and evict stale registry entries.
pub async fn run_sweeper(
    correlator: Arc<Correlator>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(interval_ms = interval.as_millis() as u64, "correlation sweeper started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("correlation sweeper shutting down");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        let report = correlator.sweep();
        if report.expired + report.evicted + report.orphans_dropped > 0 {
            tracing::debug!(
                expired = report.expired,
                evicted = report.evicted,
                orphans_dropped = report.orphans_dropped,
                "sweep"
            );
        }
    }
}
