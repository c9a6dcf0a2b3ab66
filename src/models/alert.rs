use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// Trigger direction. `Above` fires once the observed price is at or past
/// the target, `Below` is the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    Above,
    Below,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub user_id: ObjectId,
    pub market: String,
    pub symbol: String,

    pub condition: Condition,
    pub target_price: f64,

    // Acquisition price for "since you bought" alerts. Message rendering
    // only, never part of the trigger check.
    pub base_price: Option<f64>,

    pub created_at: i64,

    // Set exactly once by the claim; an alert with this set is done.
    pub triggered_at: Option<i64>,
}

impl Alert {
    pub fn is_active(&self) -> bool {
        self.triggered_at.is_none()
    }
}
