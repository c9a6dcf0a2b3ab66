use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::{future, stream, StreamExt};
use tracing::{debug, warn};

use crate::models::{PriceQuote, QuoteKey};

use super::evaluator;
use super::notifier::Notifier;
use super::sources::{SourceError, SourceRegistry};
use super::store::{AlertStore, ClaimOutcome};

#[derive(Debug, Clone)]
pub struct CycleOptions {
    /// Quote fetches in flight at once, per market.
    pub fetch_concurrency: usize,

    /// Time allowed for one whole pass. Work past it waits for the next tick.
    pub deadline: Duration,
}

impl Default for CycleOptions {
    fn default() -> Self {
        Self {
            fetch_concurrency: 4,
            deadline: Duration::from_secs(30),
        }
    }
}

/// What one evaluation pass did, for the monitor log line.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub keys_total: usize,
    pub keys_quoted: usize,
    pub fetch_failures: usize,
    pub store_failures: usize,
    pub alerts_evaluated: usize,
    pub claimed: usize,
    pub already_triggered: usize,
    pub notify_failures: usize,
    pub deadline_hit: bool,
}

/// One evaluation pass: distinct active keys, one quote per key, evaluate
/// every active alert on that key against that single quote, claim the
/// satisfied ones, notify the claimed ones.
pub async fn run_cycle<S: AlertStore>(
    store: &S,
    sources: &SourceRegistry,
    notifier: &dyn Notifier,
    opts: &CycleOptions,
) -> CycleReport {
    let started = Instant::now();
    let mut report = CycleReport::default();

    let keys = match store.list_distinct_active_keys().await {
        Ok(keys) => keys,
        Err(e) => {
            warn!(error = %e, "could not list active alert keys, cycle skipped");
            report.store_failures += 1;
            return report;
        }
    };

    report.keys_total = keys.len();
    if keys.is_empty() {
        return report;
    }

    let quotes = fetch_quotes(sources, keys, opts.fetch_concurrency, &mut report).await;
    report.keys_quoted = quotes.len();

    'keys: for (key, quote) in quotes {
        if started.elapsed() >= opts.deadline {
            warn!(
                market = %key.market,
                "cycle deadline reached, remaining keys wait for the next tick"
            );
            report.deadline_hit = true;
            break;
        }

        let alerts = match store.list_active_alerts(&key.market, &key.symbol).await {
            Ok(alerts) => alerts,
            Err(e) => {
                warn!(
                    market = %key.market,
                    symbol = %key.symbol,
                    error = %e,
                    "loading active alerts failed, key skipped"
                );
                report.store_failures += 1;
                continue;
            }
        };

        for alert in alerts {
            report.alerts_evaluated += 1;

            let Some(payload) = evaluator::evaluate(&alert, &quote) else {
                continue;
            };

            match store.try_claim(alert.id, Utc::now().timestamp()).await {
                Ok(ClaimOutcome::Claimed) => {
                    report.claimed += 1;

                    if let Err(e) = notifier.notify(alert.user_id, &payload).await {
                        warn!(
                            alert_id = %alert.id,
                            error = %e,
                            "notification failed, alert stays triggered"
                        );
                        report.notify_failures += 1;
                    }
                }
                Ok(ClaimOutcome::AlreadyTriggered) => {
                    // Another evaluator won the race, nothing left to do.
                    debug!(alert_id = %alert.id, "claim conflict");
                    report.already_triggered += 1;
                }
                Err(e) => {
                    warn!(
                        alert_id = %alert.id,
                        error = %e,
                        "claim failed, alert stays active for the next cycle"
                    );
                    report.store_failures += 1;
                }
            }

            // The deadline only ends a cycle on a claim boundary; an
            // awaited claim or notify is never cancelled midway.
            if started.elapsed() >= opts.deadline {
                warn!("cycle deadline reached, remaining alerts wait for the next tick");
                report.deadline_hit = true;
                break 'keys;
            }
        }
    }

    report
}

/// Fetches one quote per key. Markets run concurrently and independently,
/// each with its own bounded in-flight limit, so a slow or broken market
/// cannot starve the others. A failed key is skipped for this cycle.
async fn fetch_quotes(
    sources: &SourceRegistry,
    keys: Vec<QuoteKey>,
    concurrency: usize,
    report: &mut CycleReport,
) -> Vec<(QuoteKey, PriceQuote)> {
    let mut by_market: HashMap<String, Vec<QuoteKey>> = HashMap::new();
    for key in keys {
        by_market.entry(key.market.clone()).or_default().push(key);
    }

    let market_fetches: Vec<_> = by_market
        .into_iter()
        .map(|(market, market_keys)| {
            let source = sources.get(&market);
            async move {
                let Some(source) = source else {
                    warn!(
                        market = %market,
                        keys = market_keys.len(),
                        "no price source registered for market"
                    );
                    return (Vec::new(), market_keys.len());
                };

                let results: Vec<Result<(QuoteKey, PriceQuote), (QuoteKey, SourceError)>> =
                    stream::iter(market_keys)
                        .map(|key| {
                            let source = Arc::clone(&source);
                            async move {
                                match source.fetch_price(&key.symbol).await {
                                    Ok(quote) => Ok((key, quote)),
                                    Err(e) => Err((key, e)),
                                }
                            }
                        })
                        .buffer_unordered(concurrency.max(1))
                        .collect()
                        .await;

                let mut quotes = Vec::new();
                let mut failures = 0;
                for res in results {
                    match res {
                        Ok(pair) => quotes.push(pair),
                        Err((key, e)) => {
                            warn!(
                                market = %key.market,
                                symbol = %key.symbol,
                                error = %e,
                                "quote fetch failed, key skipped this cycle"
                            );
                            failures += 1;
                        }
                    }
                }

                (quotes, failures)
            }
        })
        .collect();

    let mut quotes = Vec::new();
    for (market_quotes, failures) in future::join_all(market_fetches).await {
        quotes.extend(market_quotes);
        report.fetch_failures += failures;
    }

    quotes
}

#[cfg(test)]
pub mod testing {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use mongodb::bson::oid::ObjectId;

    use crate::models::PriceQuote;
    use crate::services::evaluator::AlertNotification;
    use crate::services::notifier::{Notifier, NotifyError};
    use crate::services::sources::{PriceSource, SourceError};

    /// Answers every symbol with the same price.
    pub struct StaticSource {
        pub market: &'static str,
        pub price: f64,
    }

    #[async_trait]
    impl PriceSource for StaticSource {
        fn market(&self) -> &'static str {
            self.market
        }

        async fn fetch_price(&self, symbol: &str) -> Result<PriceQuote, SourceError> {
            Ok(PriceQuote {
                market: self.market.to_string(),
                symbol: symbol.to_string(),
                price: self.price,
                observed_at: 1,
            })
        }
    }

    /// Fails every call, like a market that is down.
    pub struct BrokenSource {
        pub market: &'static str,
    }

    #[async_trait]
    impl PriceSource for BrokenSource {
        fn market(&self) -> &'static str {
            self.market
        }

        async fn fetch_price(&self, _symbol: &str) -> Result<PriceQuote, SourceError> {
            Err(SourceError::Unavailable("connection refused".to_string()))
        }
    }

    #[derive(Clone, Default)]
    pub struct RecordingNotifier {
        sent: Arc<Mutex<Vec<AlertNotification>>>,
    }

    impl RecordingNotifier {
        pub fn sent(&self) -> Vec<AlertNotification> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(
            &self,
            _user_id: ObjectId,
            payload: &AlertNotification,
        ) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(payload.clone());
            Ok(())
        }
    }

    pub struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(
            &self,
            _user_id: ObjectId,
            _payload: &AlertNotification,
        ) -> Result<(), NotifyError> {
            Err(NotifyError::ChannelUnavailable("bus is down".to_string()))
        }
    }
}
