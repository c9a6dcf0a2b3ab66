use std::env;

#[derive(Debug, Clone)]
pub struct Settings {
    pub mongodb_uri: String,
    pub mongodb_db: String,

    pub poll_interval_secs: u64,
    pub fetch_timeout_ms: u64,
    pub fetch_concurrency: usize,
    pub cycle_deadline_secs: u64,

    pub finnhub_api_key: String,
}

pub fn load() -> Settings {
    // Loads .env if present (no crash if missing)
    dotenvy::dotenv().ok();

    let mongodb_uri = env::var("MONGODB_URI")
        .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());

    let mongodb_db = env::var("MONGODB_DB")
        .unwrap_or_else(|_| "pricewatch".to_string());

    let poll_interval_secs = env::var("ALERT_POLL_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(5);

    let fetch_timeout_ms = env::var("QUOTE_FETCH_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(3_000);

    let fetch_concurrency = env::var("QUOTE_FETCH_CONCURRENCY")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(4);

    let cycle_deadline_secs = env::var("ALERT_CYCLE_DEADLINE_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(30);

    let finnhub_api_key = env::var("FINNHUB_API_KEY").unwrap_or_default();

    Settings {
        mongodb_uri,
        mongodb_db,
        poll_interval_secs,
        fetch_timeout_ms,
        fetch_concurrency,
        cycle_deadline_secs,
        finnhub_api_key,
    }
}
