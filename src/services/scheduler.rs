use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::info;

use crate::AppState;

use super::cycle::{self, CycleOptions};
use super::notifier::Notifier;
use super::sources::SourceRegistry;
use super::store::AlertStore;

pub fn spawn_price_alert_monitor(state: AppState, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    let opts = CycleOptions {
        fetch_concurrency: state.settings.fetch_concurrency,
        deadline: Duration::from_secs(state.settings.cycle_deadline_secs),
    };
    let period = Duration::from_secs(state.settings.poll_interval_secs);

    tokio::spawn(run_loop(
        state.store.clone(),
        state.sources.clone(),
        state.notifier.clone(),
        period,
        opts,
        shutdown,
    ))
}

/// Periodic driver. Cycles are awaited inline, so at most one is ever in
/// flight; ticks that fire during a long cycle are skipped, not queued.
/// Shutdown is only observed between cycles, which lets an in-flight cycle
/// finish its claim and notify pairs.
pub async fn run_loop<S>(
    store: S,
    sources: SourceRegistry,
    notifier: Arc<dyn Notifier>,
    period: Duration,
    opts: CycleOptions,
    mut shutdown: watch::Receiver<bool>,
) where
    S: AlertStore + 'static,
{
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            changed = shutdown.changed() => {
                // A dropped sender counts as shutdown too.
                if changed.is_err() || *shutdown.borrow() {
                    info!("price alert monitor stopping");
                    return;
                }
                continue;
            }
        }

        let report = cycle::run_cycle(&store, &sources, notifier.as_ref(), &opts).await;

        info!(
            keys = report.keys_total,
            quoted = report.keys_quoted,
            fetch_failures = report.fetch_failures,
            store_failures = report.store_failures,
            evaluated = report.alerts_evaluated,
            claimed = report.claimed,
            conflicts = report.already_triggered,
            notify_failures = report.notify_failures,
            deadline_hit = report.deadline_hit,
            "alert cycle finished"
        );

        if *shutdown.borrow() {
            info!("price alert monitor stopping after in-flight cycle");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::models::Condition;
    use crate::services::cycle::testing::{RecordingNotifier, StaticSource};
    use crate::services::store::testing::{make_alert, InMemoryAlertStore};

    use super::*;

    #[tokio::test]
    async fn monitor_claims_alerts_and_stops_on_shutdown() {
        let store = InMemoryAlertStore::new();
        let alert = make_alert("finnhub", "AAPL", Condition::Above, 100.0);
        let id = alert.id;
        store.insert(alert);

        let mut sources = SourceRegistry::new();
        sources.register(Arc::new(StaticSource {
            market: "finnhub",
            price: 150.0,
        }));

        let notifier = Arc::new(RecordingNotifier::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let notifier_handle: Arc<dyn Notifier> = notifier.clone();
        let handle = tokio::spawn(run_loop(
            store.clone(),
            sources,
            notifier_handle,
            Duration::from_millis(10),
            CycleOptions::default(),
            shutdown_rx,
        ));

        // Several ticks worth of time, then ask it to stop.
        time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(store.get(id).unwrap().triggered_at.is_some());
        // Re-scans after the claim must not have re-notified.
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn monitor_stops_when_the_shutdown_sender_is_dropped() {
        let store = InMemoryAlertStore::new();
        let sources = SourceRegistry::new();
        let notifier: Arc<dyn Notifier> = Arc::new(RecordingNotifier::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(run_loop(
            store,
            sources,
            notifier,
            Duration::from_secs(3600),
            CycleOptions::default(),
            shutdown_rx,
        ));

        drop(shutdown_tx);
        handle.await.unwrap();
    }
}
