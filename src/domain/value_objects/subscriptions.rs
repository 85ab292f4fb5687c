use serde::{Deserialize, Serialize};

use crate::domain::errors::SyncError;
use crate::domain::value_objects::enums::{
    api_statuses::ApiStatus, subscription_plans::SubscriptionPlan,
    subscription_statuses::SubscriptionStatus,
};

/// Authoritative subscription state for one user as last seen by the client.
#[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscriptionRecord {
    pub plan: SubscriptionPlan,
    pub status: SubscriptionStatus,
    pub external_subscription_id: Option<String>,
    pub usage_limit: u32,
    pub usage_count: u32,
}

impl SubscriptionRecord {
    pub fn is_active_paid(&self) -> bool {
        self.plan.is_paid() && self.status == SubscriptionStatus::Active
    }

    /// Whether this record confirms a purchase of `expected` (any paid plan when unknown).
    pub fn satisfies(&self, expected: Option<SubscriptionPlan>) -> bool {
        match expected {
            Some(plan) => self.is_active_paid() && self.plan == plan,
            None => self.is_active_paid(),
        }
    }

    pub fn remaining_usage(&self) -> u32 {
        self.usage_limit.saturating_sub(self.usage_count)
    }
}

/// Body of the subscription read endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub subscription: String,
    #[serde(default)]
    pub subscription_status: String,
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub chat_limit: i64,
    #[serde(default)]
    pub chat_count: i64,
}

impl TryFrom<SubscriptionResponse> for SubscriptionRecord {
    type Error = SyncError;

    fn try_from(value: SubscriptionResponse) -> Result<Self, Self::Error> {
        let plan = SubscriptionPlan::from_str(&value.subscription).ok_or_else(|| {
            SyncError::InvalidResponse(format!("unknown plan {:?}", value.subscription))
        })?;
        let status = SubscriptionStatus::from_str(&value.subscription_status).ok_or_else(|| {
            SyncError::InvalidResponse(format!(
                "unknown subscription status {:?}",
                value.subscription_status
            ))
        })?;

        if status == SubscriptionStatus::Canceling && !plan.is_paid() {
            return Err(SyncError::InvalidResponse(
                "free plan reported as canceling".to_string(),
            ));
        }

        Ok(Self {
            plan,
            status,
            external_subscription_id: value.subscription_id.filter(|id| !id.is_empty()),
            usage_limit: clamp_counter(value.chat_limit),
            usage_count: clamp_counter(value.chat_count),
        })
    }
}

fn clamp_counter(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

/// Local-only mutations the store accepts ahead of server confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimisticMutation {
    MarkCanceling,
}

impl OptimisticMutation {
    /// Applies the mutation, returning `false` when it would break a record invariant.
    pub fn apply(&self, record: &mut SubscriptionRecord) -> bool {
        match self {
            OptimisticMutation::MarkCanceling => {
                if !record.plan.is_paid()
                    || !record
                        .status
                        .can_transition_locally(SubscriptionStatus::Canceling)
                {
                    return false;
                }
                record.status = SubscriptionStatus::Canceling;
                true
            }
        }
    }
}

/// Body of the cancellation endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelSubscriptionResponse {
    pub status: ApiStatus,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(plan: &str, status: &str) -> SubscriptionResponse {
        SubscriptionResponse {
            subscription: plan.to_string(),
            subscription_status: status.to_string(),
            subscription_id: Some("sub_123".to_string()),
            chat_limit: 100,
            chat_count: 7,
        }
    }

    #[test]
    fn converts_wire_response() {
        let record = SubscriptionRecord::try_from(response("tier2", "active")).unwrap();
        assert_eq!(record.plan, SubscriptionPlan::Tier2);
        assert_eq!(record.status, SubscriptionStatus::Active);
        assert_eq!(record.external_subscription_id.as_deref(), Some("sub_123"));
        assert_eq!(record.remaining_usage(), 93);
        assert!(record.is_active_paid());
    }

    #[test]
    fn clamps_negative_usage_counters() {
        let mut wire = response("free", "");
        wire.chat_count = -4;
        let record = SubscriptionRecord::try_from(wire).unwrap();
        assert_eq!(record.usage_count, 0);
        assert_eq!(record.status, SubscriptionStatus::None);
    }

    #[test]
    fn rejects_free_plan_in_canceling_state() {
        let err = SubscriptionRecord::try_from(response("free", "canceling")).unwrap_err();
        assert!(matches!(err, SyncError::InvalidResponse(_)));
    }

    #[test]
    fn rejects_unknown_plan() {
        assert!(SubscriptionRecord::try_from(response("platinum", "active")).is_err());
    }

    #[test]
    fn satisfies_checks_expected_plan() {
        let record = SubscriptionRecord {
            plan: SubscriptionPlan::Tier1,
            status: SubscriptionStatus::Active,
            ..Default::default()
        };
        assert!(record.satisfies(None));
        assert!(record.satisfies(Some(SubscriptionPlan::Tier1)));
        assert!(!record.satisfies(Some(SubscriptionPlan::Tier2)));
    }

    #[test]
    fn mark_canceling_requires_active_paid_plan() {
        let mut free = SubscriptionRecord::default();
        assert!(!OptimisticMutation::MarkCanceling.apply(&mut free));
        assert_eq!(free.status, SubscriptionStatus::None);

        let mut canceled = SubscriptionRecord {
            plan: SubscriptionPlan::Tier3,
            status: SubscriptionStatus::Canceled,
            ..Default::default()
        };
        assert!(!OptimisticMutation::MarkCanceling.apply(&mut canceled));

        let mut active = SubscriptionRecord {
            plan: SubscriptionPlan::Tier3,
            status: SubscriptionStatus::Active,
            ..Default::default()
        };
        assert!(OptimisticMutation::MarkCanceling.apply(&mut active));
        assert_eq!(active.status, SubscriptionStatus::Canceling);
    }
}
