use crate::domain::value_objects::enums::{
    subscription_plans::SubscriptionPlan, subscription_statuses::SubscriptionStatus,
};
use crate::domain::value_objects::subscriptions::{SubscriptionRecord, SubscriptionResponse};

pub(crate) fn subscription_response(plan: &str, status: &str) -> SubscriptionResponse {
    SubscriptionResponse {
        subscription: plan.to_string(),
        subscription_status: status.to_string(),
        subscription_id: (plan != "free").then(|| "sub_123".to_string()),
        chat_limit: 100,
        chat_count: 0,
    }
}

pub(crate) fn record(plan: SubscriptionPlan, status: SubscriptionStatus) -> SubscriptionRecord {
    SubscriptionRecord {
        plan,
        status,
        external_subscription_id: plan.is_paid().then(|| "sub_123".to_string()),
        usage_limit: 100,
        usage_count: 0,
    }
}
