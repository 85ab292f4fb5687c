use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use url::Url;

use crate::application::usecases::{auth_recovery::AuthRecoveryCache, session_ids::SessionIdResolver};
use crate::config::config_model::PlanCatalog;
use crate::domain::entities::checkout_sessions::PendingCheckout;
use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::repositories::{billing_gateway::BillingGateway, identity_provider::IdentityProvider};
use crate::domain::value_objects::checkout::CreateCheckoutRequest;

/// Path of the success return page, relative to the app base url.
pub const SUCCESS_PATH: &str = "checkout/success";
pub const CANCEL_PATH: &str = "checkout/cancel";

pub struct CheckoutInitiator {
    gateway: Arc<dyn BillingGateway>,
    identity: Arc<dyn IdentityProvider>,
    auth_recovery: Arc<AuthRecoveryCache>,
    sessions: Arc<SessionIdResolver>,
    catalog: PlanCatalog,
    app_base_url: Url,
}

impl CheckoutInitiator {
    pub fn new(
        gateway: Arc<dyn BillingGateway>,
        identity: Arc<dyn IdentityProvider>,
        auth_recovery: Arc<AuthRecoveryCache>,
        sessions: Arc<SessionIdResolver>,
        catalog: PlanCatalog,
        app_base_url: Url,
    ) -> Self {
        Self {
            gateway,
            identity,
            auth_recovery,
            sessions,
            catalog,
            app_base_url,
        }
    }

    /// Creates a hosted checkout session for `price_id` and returns the page to send the
    /// user to. Credentials and the expected plan are persisted first, so the return
    /// leg can still verify if the session does not survive the redirect.
    pub async fn start_checkout(&self, price_id: &str) -> SyncResult<Url> {
        let price_id = price_id.trim();
        let plan = self
            .catalog
            .plan_for_price(price_id)
            .filter(|plan| plan.is_paid())
            .ok_or_else(|| SyncError::InvalidPlan(price_id.to_string()))?;

        let user = self.identity.current_user().await.ok_or_else(|| {
            SyncError::Authentication("sign in before starting checkout".to_string())
        })?;

        let (success_url, cancel_url) = return_urls(&self.app_base_url)
            .map_err(|err| SyncError::CheckoutCreation(format!("invalid app url: {err}")))?;

        let response = self
            .gateway
            .create_checkout_session(CreateCheckoutRequest {
                price_id: price_id.to_string(),
                success_url,
                cancel_url,
            })
            .await
            .map_err(|err| {
                error!(uid = %user.uid, price_id, error = %err, "checkout: session creation failed");
                SyncError::CheckoutCreation(err.to_string())
            })?;

        let redirect = response.redirect_url().ok_or_else(|| {
            let reason = response
                .message
                .clone()
                .unwrap_or_else(|| "no checkout url in response".to_string());
            error!(uid = %user.uid, price_id, reason = %reason, "checkout: rejected by billing api");
            SyncError::CheckoutCreation(reason)
        })?;
        let redirect = Url::parse(redirect)
            .map_err(|err| SyncError::CheckoutCreation(format!("invalid checkout url: {err}")))?;

        self.auth_recovery.capture(&user).await;
        let pending = PendingCheckout {
            price_id: price_id.to_string(),
            plan,
            started_at: Utc::now(),
        };
        if let Err(err) = self.sessions.remember_pending(&pending).await {
            warn!(uid = %user.uid, error = %err, "checkout: failed to persist pending checkout");
        }

        info!(uid = %user.uid, price_id, %plan, "checkout: session created");
        Ok(redirect)
    }
}

/// Success and cancel return urls under `app_base_url`. The success url carries the
/// placeholder the payment provider replaces with the real session id.
pub fn return_urls(app_base_url: &Url) -> Result<(String, String), url::ParseError> {
    let mut base = app_base_url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.set_query(None);
    base.set_fragment(None);

    let success = base.join(SUCCESS_PATH)?;
    let cancel = base.join(CANCEL_PATH)?;
    Ok((
        format!("{success}?session_id={{CHECKOUT_SESSION_ID}}"),
        cancel.to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::config_model::AuthRecoveryConfig;
    use crate::domain::entities::auth_snapshots::AuthUser;
    use crate::domain::repositories::{
        billing_gateway::MockBillingGateway, durable_storage::DurableStorage,
        durable_storage::keys, identity_provider::MockIdentityProvider,
    };
    use crate::domain::value_objects::checkout::CreateCheckoutResponse;
    use crate::domain::value_objects::enums::{
        api_statuses::ApiStatus, subscription_plans::SubscriptionPlan,
    };
    use crate::infrastructure::storages::in_memory::InMemoryStorage;
    use std::collections::HashMap;

    fn catalog() -> PlanCatalog {
        PlanCatalog::new(HashMap::from([
            ("price_t1".to_string(), SubscriptionPlan::Tier1),
            ("price_t3".to_string(), SubscriptionPlan::Tier3),
        ]))
    }

    fn signed_in() -> MockIdentityProvider {
        let mut identity = MockIdentityProvider::new();
        identity.expect_current_user().returning(|| {
            Some(AuthUser {
                uid: "user_1".to_string(),
                email: None,
            })
        });
        identity
            .expect_id_token()
            .returning(|_| Ok("tok_live".to_string()));
        identity
    }

    fn initiator(
        gateway: MockBillingGateway,
        identity: MockIdentityProvider,
        storage: Arc<InMemoryStorage>,
    ) -> CheckoutInitiator {
        let identity: Arc<dyn IdentityProvider> = Arc::new(identity);
        let auth_recovery = Arc::new(AuthRecoveryCache::new(
            storage.clone(),
            identity.clone(),
            AuthRecoveryConfig::default(),
        ));
        CheckoutInitiator::new(
            Arc::new(gateway),
            identity,
            auth_recovery,
            Arc::new(SessionIdResolver::new(storage)),
            catalog(),
            Url::parse("https://app.example.com/billing").unwrap(),
        )
    }

    #[test]
    fn return_urls_keep_base_path_and_placeholder() {
        let (success, cancel) =
            return_urls(&Url::parse("https://app.example.com/billing?tab=plans").unwrap()).unwrap();
        assert_eq!(
            success,
            "https://app.example.com/billing/checkout/success?session_id={CHECKOUT_SESSION_ID}"
        );
        assert_eq!(cancel, "https://app.example.com/billing/checkout/cancel");
    }

    #[tokio::test]
    async fn success_returns_redirect_and_persists_recovery_state() {
        let mut gateway = MockBillingGateway::new();
        gateway
            .expect_create_checkout_session()
            .withf(|request| {
                request.price_id == "price_t3"
                    && request.success_url.ends_with("session_id={CHECKOUT_SESSION_ID}")
            })
            .times(1)
            .returning(|_| {
                Ok(CreateCheckoutResponse {
                    status: ApiStatus::Success,
                    checkout_url: Some("https://pay.example.com/c/cs_1".to_string()),
                    message: None,
                })
            });
        let storage = Arc::new(InMemoryStorage::new());
        storage.set(keys::CHECKOUT_SESSION_ID, "cs_old").await.unwrap();

        let redirect = initiator(gateway, signed_in(), storage.clone())
            .start_checkout(" price_t3 ")
            .await
            .unwrap();

        assert_eq!(redirect.as_str(), "https://pay.example.com/c/cs_1");
        assert!(storage.get(keys::AUTH_RECOVERY).await.unwrap().is_some());
        let pending: PendingCheckout =
            serde_json::from_str(&storage.get(keys::PENDING_CHECKOUT).await.unwrap().unwrap())
                .unwrap();
        assert_eq!(pending.plan, SubscriptionPlan::Tier3);
        assert!(storage.get(keys::CHECKOUT_SESSION_ID).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_or_empty_price_is_rejected_before_any_call() {
        let storage = Arc::new(InMemoryStorage::new());
        let initiator = initiator(MockBillingGateway::new(), MockIdentityProvider::new(), storage);

        for price_id in ["", "   ", "price_unknown"] {
            let err = initiator.start_checkout(price_id).await.unwrap_err();
            assert!(matches!(err, SyncError::InvalidPlan(_)), "{price_id:?}");
        }
    }

    #[tokio::test]
    async fn signed_out_user_cannot_start_checkout() {
        let mut identity = MockIdentityProvider::new();
        identity.expect_current_user().returning(|| None);
        let initiator = initiator(
            MockBillingGateway::new(),
            identity,
            Arc::new(InMemoryStorage::new()),
        );

        let err = initiator.start_checkout("price_t1").await.unwrap_err();
        assert!(err.is_authentication());
    }

    #[tokio::test]
    async fn error_status_and_missing_url_become_checkout_creation() {
        let mut gateway = MockBillingGateway::new();
        gateway
            .expect_create_checkout_session()
            .times(1)
            .returning(|_| {
                Ok(CreateCheckoutResponse {
                    status: ApiStatus::Error,
                    checkout_url: None,
                    message: Some("price archived".to_string()),
                })
            });
        gateway
            .expect_create_checkout_session()
            .times(1)
            .returning(|_| {
                Ok(CreateCheckoutResponse {
                    status: ApiStatus::Success,
                    checkout_url: None,
                    message: None,
                })
            });
        gateway
            .expect_create_checkout_session()
            .times(1)
            .returning(|_| Err(SyncError::Network(anyhow::anyhow!("timed out"))));

        let storage = Arc::new(InMemoryStorage::new());
        let initiator = initiator(gateway, signed_in(), storage.clone());

        let archived = initiator.start_checkout("price_t1").await.unwrap_err();
        assert!(matches!(archived, SyncError::CheckoutCreation(ref reason) if reason == "price archived"));
        let missing = initiator.start_checkout("price_t1").await.unwrap_err();
        assert!(matches!(missing, SyncError::CheckoutCreation(_)));
        let network = initiator.start_checkout("price_t1").await.unwrap_err();
        assert!(matches!(network, SyncError::CheckoutCreation(_)));

        assert!(storage.get(keys::PENDING_CHECKOUT).await.unwrap().is_none());
    }
}
