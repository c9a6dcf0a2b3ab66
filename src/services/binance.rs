use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::models::PriceQuote;

use super::sources::{map_reqwest_error, PriceSource, SourceError};

pub const MARKET: &str = "binance";

/// Spot pair tickers from the Binance REST API. No API key needed for
/// public ticker data.
#[derive(Clone)]
pub struct BinanceSource {
    http: Client,
}

impl BinanceSource {
    pub fn new(timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client");

        Self { http }
    }
}

#[async_trait]
impl PriceSource for BinanceSource {
    fn market(&self) -> &'static str {
        MARKET
    }

    async fn fetch_price(&self, symbol: &str) -> Result<PriceQuote, SourceError> {
        let url = "https://api.binance.com/api/v3/ticker/price";
        let res = self
            .http
            .get(url)
            .query(&[("symbol", symbol)])
            .send()
            .await
            .map_err(map_reqwest_error)?;

        // Binance rejects unknown pairs with 400 (code -1121).
        if res.status() == StatusCode::BAD_REQUEST {
            return Err(SourceError::InvalidSymbol(symbol.to_string()));
        }
        if !res.status().is_success() {
            let status = res.status();
            return Err(SourceError::Unavailable(format!(
                "Binance ticker failed: {status}"
            )));
        }

        let ticker = res
            .json::<TickerResponse>()
            .await
            .map_err(map_reqwest_error)?;

        let price: f64 = ticker
            .price
            .parse()
            .map_err(|_| SourceError::Unavailable(format!("bad ticker price: {}", ticker.price)))?;

        if !price.is_finite() || price <= 0.0 {
            return Err(SourceError::InvalidSymbol(symbol.to_string()));
        }

        Ok(PriceQuote {
            market: MARKET.to_string(),
            symbol: symbol.to_string(),
            price,
            observed_at: Utc::now().timestamp(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TickerResponse {
    price: String,
}
