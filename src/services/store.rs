use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::options::FindOptions;
use mongodb::{Collection, Database};
use regex::Regex;
use thiserror::Error;

use crate::models::{Alert, Condition, QuoteKey};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("invalid alert: {0}")]
    InvalidAlert(String),
}

/// Outcome of a trigger claim. `AlreadyTriggered` is not an error, it is
/// the expected result when another evaluator won the race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    AlreadyTriggered,
}

/// What the evaluation cycle needs from persistence. The Mongo store is
/// the real one; tests run against the in-memory double below.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// The minimal (market, symbol) set that needs a quote this cycle.
    async fn list_distinct_active_keys(&self) -> Result<Vec<QuoteKey>, StoreError>;

    async fn list_active_alerts(
        &self,
        market: &str,
        symbol: &str,
    ) -> Result<Vec<Alert>, StoreError>;

    /// Sets `triggered_at` iff it is still unset, as one conditional
    /// update. Safe under concurrent callers and across processes.
    async fn try_claim(
        &self,
        alert_id: ObjectId,
        triggered_at: i64,
    ) -> Result<ClaimOutcome, StoreError>;
}

#[derive(Clone)]
pub struct MongoAlertStore {
    db: Database,
    market_format: Regex,
    symbol_format: Regex,
}

impl MongoAlertStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            market_format: Regex::new(r"^[a-z][a-z0-9_-]{1,31}$").unwrap(),
            symbol_format: Regex::new(r"^[A-Z0-9][A-Z0-9.:_-]{0,31}$").unwrap(),
        }
    }

    fn alerts(&self) -> Collection<Alert> {
        self.db.collection::<Alert>("alerts")
    }

    /// Creates an active alert. `base_price` marks it as a "since you
    /// bought" alert; it changes the notification message, not the trigger.
    pub async fn create_alert(
        &self,
        user_id: ObjectId,
        market: &str,
        symbol: &str,
        condition: Condition,
        target_price: f64,
        base_price: Option<f64>,
    ) -> Result<Alert, StoreError> {
        let market = market.to_lowercase();
        let symbol = symbol.to_uppercase();

        if !self.market_format.is_match(&market) {
            return Err(StoreError::InvalidAlert(format!(
                "bad market identifier: {market}"
            )));
        }
        if !self.symbol_format.is_match(&symbol) {
            return Err(StoreError::InvalidAlert(format!("bad symbol: {symbol}")));
        }
        if !target_price.is_finite() || target_price <= 0.0 {
            return Err(StoreError::InvalidAlert(
                "target price must be positive".to_string(),
            ));
        }
        if let Some(base) = base_price {
            if !base.is_finite() || base <= 0.0 {
                return Err(StoreError::InvalidAlert(
                    "base price must be positive".to_string(),
                ));
            }
        }

        let alert = Alert {
            id: ObjectId::new(),
            user_id,
            market,
            symbol,
            condition,
            target_price,
            base_price,
            created_at: Utc::now().timestamp(),
            triggered_at: None,
        };

        self.alerts().insert_one(&alert, None).await?;

        Ok(alert)
    }

    pub async fn get_alert(&self, alert_id: ObjectId) -> Result<Option<Alert>, StoreError> {
        let alert = self.alerts().find_one(doc! { "_id": alert_id }, None).await?;
        Ok(alert)
    }

    pub async fn list_user_alerts(&self, user_id: ObjectId) -> Result<Vec<Alert>, StoreError> {
        let find_opts = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .build();

        let mut cursor = self
            .alerts()
            .find(doc! { "user_id": user_id }, find_opts)
            .await?;

        let mut items: Vec<Alert> = Vec::new();
        while let Some(res) = cursor.next().await {
            items.push(res?);
        }

        Ok(items)
    }
}

#[async_trait]
impl AlertStore for MongoAlertStore {
    async fn list_distinct_active_keys(&self) -> Result<Vec<QuoteKey>, StoreError> {
        let pipeline = vec![
            doc! { "$match": { "triggered_at": null } },
            doc! { "$group": { "_id": { "market": "$market", "symbol": "$symbol" } } },
        ];

        let mut cursor = self.alerts().aggregate(pipeline, None).await?;

        let mut keys: Vec<QuoteKey> = Vec::new();
        while let Some(item) = cursor.next().await {
            let group = item?;
            let Ok(id) = group.get_document("_id") else {
                continue;
            };

            let market = id.get_str("market").unwrap_or_default();
            let symbol = id.get_str("symbol").unwrap_or_default();
            if !market.is_empty() && !symbol.is_empty() {
                keys.push(QuoteKey {
                    market: market.to_string(),
                    symbol: symbol.to_string(),
                });
            }
        }

        Ok(keys)
    }

    async fn list_active_alerts(
        &self,
        market: &str,
        symbol: &str,
    ) -> Result<Vec<Alert>, StoreError> {
        let mut cursor = self
            .alerts()
            .find(
                doc! { "market": market, "symbol": symbol, "triggered_at": null },
                None,
            )
            .await?;

        let mut items: Vec<Alert> = Vec::new();
        while let Some(res) = cursor.next().await {
            items.push(res?);
        }

        Ok(items)
    }

    async fn try_claim(
        &self,
        alert_id: ObjectId,
        triggered_at: i64,
    ) -> Result<ClaimOutcome, StoreError> {
        let res = self
            .alerts()
            .update_one(
                doc! { "_id": alert_id, "triggered_at": null },
                doc! { "$set": { "triggered_at": triggered_at } },
                None,
            )
            .await?;

        if res.matched_count > 0 {
            Ok(ClaimOutcome::Claimed)
        } else {
            Ok(ClaimOutcome::AlreadyTriggered)
        }
    }
}

#[cfg(test)]
pub mod testing {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Mutex-backed stand-in with the same conditional-claim semantics as
    /// the Mongo store.
    #[derive(Clone, Default)]
    pub struct InMemoryAlertStore {
        alerts: Arc<Mutex<HashMap<ObjectId, Alert>>>,
    }

    impl InMemoryAlertStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, alert: Alert) {
            self.alerts.lock().unwrap().insert(alert.id, alert);
        }

        pub fn get(&self, id: ObjectId) -> Option<Alert> {
            self.alerts.lock().unwrap().get(&id).cloned()
        }
    }

    #[async_trait]
    impl AlertStore for InMemoryAlertStore {
        async fn list_distinct_active_keys(&self) -> Result<Vec<QuoteKey>, StoreError> {
            let alerts = self.alerts.lock().unwrap();

            let mut keys: Vec<QuoteKey> = Vec::new();
            for a in alerts.values().filter(|a| a.is_active()) {
                let key = QuoteKey {
                    market: a.market.clone(),
                    symbol: a.symbol.clone(),
                };
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }

            Ok(keys)
        }

        async fn list_active_alerts(
            &self,
            market: &str,
            symbol: &str,
        ) -> Result<Vec<Alert>, StoreError> {
            let alerts = self.alerts.lock().unwrap();

            Ok(alerts
                .values()
                .filter(|a| a.is_active() && a.market == market && a.symbol == symbol)
                .cloned()
                .collect())
        }

        async fn try_claim(
            &self,
            alert_id: ObjectId,
            triggered_at: i64,
        ) -> Result<ClaimOutcome, StoreError> {
            let mut alerts = self.alerts.lock().unwrap();

            match alerts.get_mut(&alert_id) {
                Some(a) if a.triggered_at.is_none() => {
                    a.triggered_at = Some(triggered_at);
                    Ok(ClaimOutcome::Claimed)
                }
                _ => Ok(ClaimOutcome::AlreadyTriggered),
            }
        }
    }

    pub fn make_alert(market: &str, symbol: &str, condition: Condition, target_price: f64) -> Alert {
        Alert {
            id: ObjectId::new(),
            user_id: ObjectId::new(),
            market: market.to_string(),
            symbol: symbol.to_string(),
            condition,
            target_price,
            base_price: None,
            created_at: 0,
            triggered_at: None,
        }
    }
}
