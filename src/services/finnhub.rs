use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;

use crate::models::PriceQuote;

use super::sources::{map_reqwest_error, PriceSource, SourceError};

pub const MARKET: &str = "finnhub";

/// Stock quotes from the Finnhub REST API.
#[derive(Clone)]
pub struct FinnhubSource {
    http: Client,
    api_key: String,
}

impl FinnhubSource {
    pub fn new(api_key: String, timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client");

        Self { http, api_key }
    }

    fn has_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

#[async_trait]
impl PriceSource for FinnhubSource {
    fn market(&self) -> &'static str {
        MARKET
    }

    async fn fetch_price(&self, symbol: &str) -> Result<PriceQuote, SourceError> {
        if !self.has_key() {
            return Err(SourceError::Unavailable(
                "FINNHUB_API_KEY is missing in .env".to_string(),
            ));
        }

        let url = "https://finnhub.io/api/v1/quote";
        let res = self
            .http
            .get(url)
            .query(&[("symbol", symbol), ("token", &self.api_key)])
            .send()
            .await
            .map_err(map_reqwest_error)?;

        if !res.status().is_success() {
            let status = res.status();
            return Err(SourceError::Unavailable(format!(
                "Finnhub quote failed: {status}"
            )));
        }

        let quote = res
            .json::<QuoteResponse>()
            .await
            .map_err(map_reqwest_error)?;

        // Finnhub answers unknown symbols with an all-zero quote.
        if !quote.c.is_finite() || quote.c <= 0.0 {
            return Err(SourceError::InvalidSymbol(symbol.to_string()));
        }

        Ok(PriceQuote {
            market: MARKET.to_string(),
            symbol: symbol.to_string(),
            price: quote.c,
            observed_at: if quote.t > 0 {
                quote.t
            } else {
                Utc::now().timestamp()
            },
        })
    }
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    // current
    c: f64,
    // timestamp
    t: i64,
}
