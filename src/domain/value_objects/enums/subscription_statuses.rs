use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    #[default]
    None,
    Active,
    Canceling,
    Canceled,
}

impl Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            SubscriptionStatus::None => "none",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Canceling => "canceling",
            SubscriptionStatus::Canceled => "canceled",
        };
        write!(f, "{}", status)
    }
}

impl SubscriptionStatus {
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            // The read endpoint reports a missing status as an empty string.
            "none" | "" => Some(SubscriptionStatus::None),
            "active" => Some(SubscriptionStatus::Active),
            "canceling" => Some(SubscriptionStatus::Canceling),
            "canceled" => Some(SubscriptionStatus::Canceled),
            _ => None,
        }
    }

    /// Transitions the client is allowed to apply on its own.
    ///
    /// | From      | To        | Allowed |
    /// |-----------|-----------|---------|
    /// | Active    | Canceling | Yes     |
    /// | Canceling | Canceling | Yes     |
    /// | Canceled  | *any*     | No      |
    /// | None      | *any*     | No      |
    ///
    /// Everything else only arrives through an authoritative fetch.
    pub fn can_transition_locally(&self, to: SubscriptionStatus) -> bool {
        matches!(
            (self, to),
            (SubscriptionStatus::Active, SubscriptionStatus::Canceling)
                | (SubscriptionStatus::Canceling, SubscriptionStatus::Canceling)
        )
    }
}
