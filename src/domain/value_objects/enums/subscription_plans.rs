use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Plans in ascending order of value; `Ord` follows declaration order.
#[derive(
    Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionPlan {
    #[default]
    Free,
    Tier1,
    Tier2,
    Tier3,
    Tier4,
}

impl SubscriptionPlan {
    pub const PAID: [SubscriptionPlan; 4] = [
        SubscriptionPlan::Tier1,
        SubscriptionPlan::Tier2,
        SubscriptionPlan::Tier3,
        SubscriptionPlan::Tier4,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionPlan::Free => "free",
            SubscriptionPlan::Tier1 => "tier1",
            SubscriptionPlan::Tier2 => "tier2",
            SubscriptionPlan::Tier3 => "tier3",
            SubscriptionPlan::Tier4 => "tier4",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "free" => Some(SubscriptionPlan::Free),
            "tier1" => Some(SubscriptionPlan::Tier1),
            "tier2" => Some(SubscriptionPlan::Tier2),
            "tier3" => Some(SubscriptionPlan::Tier3),
            "tier4" => Some(SubscriptionPlan::Tier4),
            _ => None,
        }
    }

    pub fn is_paid(&self) -> bool {
        *self != SubscriptionPlan::Free
    }
}

impl Display for SubscriptionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plans_are_ordered_by_value() {
        assert!(SubscriptionPlan::Free < SubscriptionPlan::Tier1);
        assert!(SubscriptionPlan::Tier3 < SubscriptionPlan::Tier4);
        assert_eq!(SubscriptionPlan::PAID.iter().max(), Some(&SubscriptionPlan::Tier4));
    }

    #[test]
    fn parses_case_insensitively_and_rejects_unknown() {
        assert_eq!(SubscriptionPlan::from_str(" Tier2 "), Some(SubscriptionPlan::Tier2));
        assert_eq!(SubscriptionPlan::from_str("enterprise"), None);
        assert!(!SubscriptionPlan::Free.is_paid());
    }
}
