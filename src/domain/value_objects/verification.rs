use serde::{Deserialize, Serialize};

use crate::domain::value_objects::enums::{
    api_statuses::ApiStatus, subscription_plans::SubscriptionPlan,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifySessionRequest {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifySessionResponse {
    pub status: ApiStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
}

impl VerifySessionResponse {
    pub fn is_verified(&self) -> bool {
        self.status.is_success()
    }

    pub fn plan(&self) -> Option<SubscriptionPlan> {
        self.plan.as_deref().and_then(SubscriptionPlan::from_str)
    }

    pub fn rejection_reason(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| "verification endpoint returned status error".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_verified_response_with_plan() {
        let response: VerifySessionResponse =
            serde_json::from_str(r#"{"status":"success","plan":"tier2"}"#).unwrap();
        assert!(response.is_verified());
        assert_eq!(response.plan(), Some(SubscriptionPlan::Tier2));
    }

    #[test]
    fn rejection_reason_falls_back_to_generic_message() {
        let response: VerifySessionResponse =
            serde_json::from_str(r#"{"status":"error"}"#).unwrap();
        assert!(!response.is_verified());
        assert_eq!(
            response.rejection_reason(),
            "verification endpoint returned status error"
        );
    }
}
