use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::enums::subscription_plans::SubscriptionPlan;

/// One checkout attempt as seen on the return leg of the redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub session_id: String,
    pub price_id: Option<String>,
    pub expected_plan: Option<SubscriptionPlan>,
}

/// Written by the initiator so the return leg knows which plan was bought.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingCheckout {
    pub price_id: String,
    pub plan: SubscriptionPlan,
    pub started_at: DateTime<Utc>,
}

impl CheckoutSession {
    pub fn new(session_id: String, pending: Option<PendingCheckout>) -> Self {
        match pending {
            Some(pending) => Self {
                session_id,
                price_id: Some(pending.price_id),
                expected_plan: Some(pending.plan),
            },
            None => Self {
                session_id,
                price_id: None,
                expected_plan: None,
            },
        }
    }
}
