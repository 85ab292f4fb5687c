use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The live signed-in user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
}

/// Minimal credentials persisted before the browser leaves for the payment page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthSnapshot {
    pub uid: String,
    pub email: Option<String>,
    pub token: String,
    pub captured_at: DateTime<Utc>,
}

impl AuthSnapshot {
    pub fn new(user: &AuthUser, token: String) -> Self {
        Self {
            uid: user.uid.clone(),
            email: user.email.clone(),
            token,
            captured_at: Utc::now(),
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.captured_at
    }

    /// `None` means no bound: any snapshot is considered usable.
    pub fn is_expired(&self, max_age: Option<Duration>, now: DateTime<Utc>) -> bool {
        match max_age {
            Some(max_age) => self.age(now) > max_age,
            None => false,
        }
    }
}
