use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::PriceQuote;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("quote request timed out")]
    Timeout,
}

/// Live price feed for one market. Each call must finish under the
/// adapter's own timeout; retry policy belongs to the caller.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Market identifier this adapter serves, e.g. "finnhub".
    fn market(&self) -> &'static str;

    async fn fetch_price(&self, symbol: &str) -> Result<PriceQuote, SourceError>;
}

/// Maps a market identifier to its adapter.
#[derive(Clone)]
pub struct SourceRegistry {
    adapters: HashMap<String, Arc<dyn PriceSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub fn register(&mut self, source: Arc<dyn PriceSource>) {
        self.adapters.insert(source.market().to_string(), source);
    }

    pub fn get(&self, market: &str) -> Option<Arc<dyn PriceSource>> {
        self.adapters.get(market).cloned()
    }

    pub fn markets(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn map_reqwest_error(e: reqwest::Error) -> SourceError {
    if e.is_timeout() {
        SourceError::Timeout
    } else {
        SourceError::Unavailable(e.to_string())
    }
}
