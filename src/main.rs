use std::sync::Arc;
use std::time::Duration;

use mongodb::Client;
use tokio::sync::{broadcast, watch};

use pricewatch::services::binance::BinanceSource;
use pricewatch::services::finnhub::FinnhubSource;
use pricewatch::services::notifier::{EventBusNotifier, Notifier};
use pricewatch::services::sources::SourceRegistry;
use pricewatch::services::store::MongoAlertStore;
use pricewatch::{config, services, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let settings = config::load();

    // Mongo connection
    let client = Client::with_uri_str(&settings.mongodb_uri)
        .await
        .expect("Failed to connect to MongoDB");
    let db = client.database(&settings.mongodb_db);

    services::db_init::ensure_indexes(&db)
        .await
        .expect("Failed to create MongoDB indexes");

    let store = MongoAlertStore::new(db);

    let fetch_timeout = Duration::from_millis(settings.fetch_timeout_ms);
    let mut sources = SourceRegistry::new();
    sources.register(Arc::new(FinnhubSource::new(
        settings.finnhub_api_key.clone(),
        fetch_timeout,
    )));
    sources.register(Arc::new(BinanceSource::new(fetch_timeout)));

    let (events_tx, _events_rx) = broadcast::channel::<String>(64);
    let notifier: Arc<dyn Notifier> = Arc::new(EventBusNotifier::new(events_tx.clone()));

    let state = AppState {
        settings,
        store,
        sources,
        notifier,
        events_tx,
    };

    tracing::info!(
        markets = ?state.sources.markets(),
        interval_secs = state.settings.poll_interval_secs,
        "price alert monitor starting"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = services::scheduler::spawn_price_alert_monitor(state, shutdown_rx);

    tokio::signal::ctrl_c().await.expect("ctrl-c handler");

    // Signal shutdown, then wait so an in-flight cycle can finish its
    // claim and notify pairs.
    let _ = shutdown_tx.send(true);
    let _ = monitor.await;
}
