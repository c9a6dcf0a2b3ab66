use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::models::{Alert, Condition, PriceQuote};

/// Everything the notifier needs to phrase the message for one claimed
/// alert, without another store read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertNotification {
    pub alert_id: ObjectId,
    pub user_id: ObjectId,
    pub market: String,
    pub symbol: String,
    pub condition: Condition,
    pub target_price: f64,
    pub observed_price: f64,
    pub observed_at: i64,

    // Present only for "since you bought" alerts.
    pub gain_pct: Option<f64>,
}

impl AlertNotification {
    pub fn message(&self) -> String {
        let movement = match self.condition {
            Condition::Above => "rose to",
            Condition::Below => "fell to",
        };

        let mut msg = format!(
            "{} on {} {} {:.2} (target {:.2})",
            self.symbol, self.market, movement, self.observed_price, self.target_price
        );

        if let Some(pct) = self.gain_pct {
            let sign = if pct >= 0.0 { "+" } else { "" };
            msg.push_str(&format!(", {sign}{pct:.2}% since you bought"));
        }

        msg
    }
}

/// Pure trigger check. `None` means the alert stays active. The caller is
/// responsible for handing in the quote that matches the alert's key.
pub fn evaluate(alert: &Alert, quote: &PriceQuote) -> Option<AlertNotification> {
    let hit = match alert.condition {
        Condition::Above => quote.price >= alert.target_price,
        Condition::Below => quote.price <= alert.target_price,
    };

    if !hit {
        return None;
    }

    Some(AlertNotification {
        alert_id: alert.id,
        user_id: alert.user_id,
        market: alert.market.clone(),
        symbol: alert.symbol.clone(),
        condition: alert.condition,
        target_price: alert.target_price,
        observed_price: quote.price,
        observed_at: quote.observed_at,
        gain_pct: alert.base_price.map(|base| percent_delta(base, quote.price)),
    })
}

/// Percentage change from `base` to `observed`, rounded to two decimals.
pub fn percent_delta(base: f64, observed: f64) -> f64 {
    ((observed - base) / base * 100.0 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use crate::services::store::testing::make_alert;

    use super::*;

    fn quote_at(price: f64) -> PriceQuote {
        PriceQuote {
            market: "finnhub".to_string(),
            symbol: "AAPL".to_string(),
            price,
            observed_at: 1,
        }
    }

    #[test]
    fn above_fires_at_and_past_the_target() {
        let alert = make_alert("finnhub", "AAPL", Condition::Above, 100.0);

        assert!(evaluate(&alert, &quote_at(99.99)).is_none());
        assert!(evaluate(&alert, &quote_at(100.0)).is_some());
        assert!(evaluate(&alert, &quote_at(150.0)).is_some());
    }

    #[test]
    fn below_fires_at_and_under_the_target() {
        let alert = make_alert("finnhub", "AAPL", Condition::Below, 100.0);

        assert!(evaluate(&alert, &quote_at(100.01)).is_none());
        assert!(evaluate(&alert, &quote_at(100.0)).is_some());
    }

    #[test]
    fn payload_carries_the_observed_quote() {
        let alert = make_alert("finnhub", "AAPL", Condition::Above, 100.0);

        let note = evaluate(&alert, &quote_at(123.45)).unwrap();
        assert_eq!(note.alert_id, alert.id);
        assert_eq!(note.observed_price, 123.45);
        assert_eq!(note.target_price, 100.0);
        assert_eq!(note.gain_pct, None);
    }

    #[test]
    fn base_price_adds_the_rounded_gain() {
        let mut alert = make_alert("finnhub", "AAPL", Condition::Above, 60.0);
        alert.base_price = Some(50.0);

        let note = evaluate(&alert, &quote_at(75.0)).unwrap();
        assert_eq!(note.gain_pct, Some(50.0));
    }

    #[test]
    fn percent_delta_matches_expected_values() {
        assert_eq!(percent_delta(50.0, 75.0), 50.0);
        assert_eq!(percent_delta(200.0, 150.0), -25.0);
        assert_eq!(percent_delta(3.0, 4.0), 33.33);
    }

    #[test]
    fn message_phrases_gain_and_loss() {
        let mut alert = make_alert("finnhub", "AAPL", Condition::Above, 60.0);
        alert.base_price = Some(50.0);
        let note = evaluate(&alert, &quote_at(75.0)).unwrap();
        assert!(note.message().contains("+50.00% since you bought"));

        let mut alert = make_alert("binance", "BTCUSDT", Condition::Below, 160.0);
        alert.base_price = Some(200.0);
        let note = evaluate(&alert, &quote_at(150.0)).unwrap();
        assert!(note.message().contains("-25.00% since you bought"));
    }
}
