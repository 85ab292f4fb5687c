use async_trait::async_trait;

use crate::domain::errors::SyncResult;
use crate::domain::value_objects::{
    checkout::{CreateCheckoutRequest, CreateCheckoutResponse},
    subscriptions::{CancelSubscriptionResponse, SubscriptionResponse},
    verification::VerifySessionResponse,
};

/// The billing API as reached through the wrapped client, which resolves its
/// own credentials from the identity provider on every call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BillingGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> SyncResult<CreateCheckoutResponse>;

    async fn fetch_subscription(&self) -> SyncResult<SubscriptionResponse>;

    async fn verify_session(&self, session_id: &str) -> SyncResult<VerifySessionResponse>;

    async fn cancel_subscription(&self) -> SyncResult<CancelSubscriptionResponse>;
}

/// Verification that bypasses the wrapped client and sends the given bearer token as-is.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectVerifier: Send + Sync {
    async fn verify_session_with_token(
        &self,
        session_id: &str,
        bearer_token: &str,
    ) -> SyncResult<VerifySessionResponse>;
}
