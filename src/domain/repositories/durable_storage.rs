use anyhow::Result;
use async_trait::async_trait;

/// Client-side key/value storage that survives a full navigation away and back.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DurableStorage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;
}

pub mod keys {
    pub const AUTH_RECOVERY: &str = "subscription_sync.auth_recovery";
    pub const CHECKOUT_SESSION_ID: &str = "subscription_sync.checkout_session_id";
    pub const PENDING_CHECKOUT: &str = "subscription_sync.pending_checkout";
}
