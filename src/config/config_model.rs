use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::config::stage::Stage;
use crate::domain::value_objects::enums::subscription_plans::SubscriptionPlan;

#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub stage: Stage,
    pub billing_api: BillingApi,
    pub app: AppUrls,
    pub verification: VerificationPolicy,
    pub polling: PollingConfig,
    pub auth_recovery: AuthRecoveryConfig,
    pub storage: Storage,
    pub plans: PlanCatalog,
    pub credentials: Option<StaticCredentials>,
}

#[derive(Debug, Clone)]
pub struct BillingApi {
    pub base_url: Url,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AppUrls {
    pub base_url: Url,
}

/// Extra attempts per verification state after an authentication failure.
pub const AUTH_RETRIES_PER_STATE: u8 = 1;

/// Delays of the verification state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationPolicy {
    /// Wait before retrying a verification call after an authentication failure.
    pub auth_backoff: Duration,
    /// Extra time given to the webhook before the last cache check.
    pub final_delay: Duration,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self {
            auth_backoff: Duration::from_secs(2),
            final_delay: Duration::from_secs(5),
        }
    }
}

impl VerificationPolicy {
    /// Upper bound on subscription fetches plus verification calls in one run:
    /// two cache checks, two verification states with their retries, and the
    /// confirming fetch after a successful verification.
    pub fn max_network_calls(&self) -> u32 {
        let per_verification_state = 1 + u32::from(AUTH_RETRIES_PER_STATE);
        2 + 2 * per_verification_state + 1
    }

    /// Upper bound on time spent waiting in explicit delays.
    pub fn max_backoff_time(&self) -> Duration {
        self.auth_backoff * 2 * u32::from(AUTH_RETRIES_PER_STATE) + self.final_delay
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    pub slow_interval: Duration,
    pub fast_interval: Duration,
    pub burst_window: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            slow_interval: Duration::from_secs(30),
            fast_interval: Duration::from_secs(3),
            burst_window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthRecoveryConfig {
    /// Snapshots older than this are ignored on recovery. `None` disables the bound.
    pub snapshot_max_age: Option<Duration>,
}

impl Default for AuthRecoveryConfig {
    fn default() -> Self {
        Self {
            snapshot_max_age: Some(Duration::from_secs(60 * 60)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Storage {
    pub dir: PathBuf,
}

/// Maps checkout price ids to the plan they purchase.
#[derive(Debug, Clone, Default)]
pub struct PlanCatalog {
    prices: HashMap<String, SubscriptionPlan>,
}

impl PlanCatalog {
    pub fn new(prices: HashMap<String, SubscriptionPlan>) -> Self {
        Self { prices }
    }

    pub fn plan_for_price(&self, price_id: &str) -> Option<SubscriptionPlan> {
        self.prices.get(price_id.trim()).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct StaticCredentials {
    pub uid: String,
    pub email: Option<String>,
    pub token: String,
}
