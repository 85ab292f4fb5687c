use serde::{Deserialize, Serialize};

use crate::domain::value_objects::enums::api_statuses::ApiStatus;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutRequest {
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutResponse {
    pub status: ApiStatus,
    #[serde(default)]
    pub checkout_url: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl CreateCheckoutResponse {
    /// The redirect target, present only on a well-formed success response.
    pub fn redirect_url(&self) -> Option<&str> {
        if !self.status.is_success() {
            return None;
        }
        self.checkout_url.as_deref().filter(|url| !url.is_empty())
    }
}
