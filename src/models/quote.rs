use serde::{Deserialize, Serialize};

/// A price observation for one (market, symbol). Lives for a single
/// evaluation cycle, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceQuote {
    pub market: String,
    pub symbol: String,
    pub price: f64,
    pub observed_at: i64,
}

/// The (market, symbol) pair a quote is fetched for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteKey {
    pub market: String,
    pub symbol: String,
}
