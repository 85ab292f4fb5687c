use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// The `status` discriminator shared by every billing endpoint response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApiStatus {
    Success,
    Error,
}

impl ApiStatus {
    pub fn is_success(&self) -> bool {
        *self == ApiStatus::Success
    }
}

impl Display for ApiStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiStatus::Success => f.write_str("success"),
            ApiStatus::Error => f.write_str("error"),
        }
    }
}
