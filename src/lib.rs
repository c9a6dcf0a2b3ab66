//! Library entrypoint for PriceWatch.
//!
//! This file exists mainly to make engine tests easy (integration tests
//! under `tests/` can import the app state, models, and services).

pub mod config;
pub mod models;
pub mod services;

#[derive(Clone)]
pub struct AppState {
    pub settings: config::Settings,
    pub store: services::store::MongoAlertStore,
    pub sources: services::sources::SourceRegistry,
    pub notifier: std::sync::Arc<dyn services::notifier::Notifier>,
    pub events_tx: tokio::sync::broadcast::Sender<String>,
}
