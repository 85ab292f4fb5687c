use std::sync::Arc;

use tracing::{debug, warn};
use url::Url;

use crate::domain::entities::checkout_sessions::{CheckoutSession, PendingCheckout};
use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::repositories::durable_storage::{DurableStorage, keys};

const SESSION_ID_PARAM: &str = "session_id";
/// The literal the payment provider substitutes. Seeing it means no substitution happened.
const SESSION_ID_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

/// Finds the checkout session id on the return leg and remembers it across reloads.
pub struct SessionIdResolver {
    storage: Arc<dyn DurableStorage>,
}

impl SessionIdResolver {
    pub fn new(storage: Arc<dyn DurableStorage>) -> Self {
        Self { storage }
    }

    /// Query string first, then the fragment, then the cached id from an earlier load.
    /// An id found in the url replaces whatever was cached.
    pub async fn resolve(&self, return_url: &Url) -> SyncResult<String> {
        if let Some(session_id) = session_id_from_url(return_url) {
            if let Err(err) = self
                .storage
                .set(keys::CHECKOUT_SESSION_ID, &session_id)
                .await
            {
                warn!(error = %err, "session_ids: failed to cache session id");
            }
            return Ok(session_id);
        }

        match self.storage.get(keys::CHECKOUT_SESSION_ID).await {
            Ok(Some(cached)) if is_usable(&cached) => {
                debug!("session_ids: using cached session id");
                Ok(cached)
            }
            Ok(_) => Err(SyncError::NoSessionId),
            Err(err) => {
                warn!(error = %err, "session_ids: failed to read cached session id");
                Err(SyncError::NoSessionId)
            }
        }
    }

    /// Resolves the id and pairs it with the plan recorded when checkout started.
    pub async fn checkout_session(&self, return_url: &Url) -> SyncResult<CheckoutSession> {
        let session_id = self.resolve(return_url).await?;
        Ok(CheckoutSession::new(session_id, self.pending_checkout().await))
    }

    pub async fn pending_checkout(&self) -> Option<PendingCheckout> {
        let raw = match self.storage.get(keys::PENDING_CHECKOUT).await {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(error = %err, "session_ids: failed to read pending checkout");
                return None;
            }
        };
        serde_json::from_str(&raw)
            .map_err(|err| warn!(error = %err, "session_ids: discarding unreadable pending checkout"))
            .ok()
    }

    pub async fn remember_pending(&self, pending: &PendingCheckout) -> SyncResult<()> {
        let raw = serde_json::to_string(pending)
            .map_err(|err| SyncError::Storage(anyhow::Error::new(err)))?;
        self.storage
            .set(keys::PENDING_CHECKOUT, &raw)
            .await
            .map_err(SyncError::Storage)?;
        // A new checkout must never be reconciled against an older session id.
        self.storage
            .remove(keys::CHECKOUT_SESSION_ID)
            .await
            .map_err(SyncError::Storage)
    }

    /// Forgets the session once its reconciliation reached a verdict.
    pub async fn consume(&self) {
        for key in [keys::CHECKOUT_SESSION_ID, keys::PENDING_CHECKOUT] {
            if let Err(err) = self.storage.remove(key).await {
                warn!(key, error = %err, "session_ids: failed to clear");
            }
        }
    }
}

/// Reads `session_id` from the query, or from a fragment shaped like
/// `#session_id=..` or `#/route?session_id=..`.
pub fn session_id_from_url(url: &Url) -> Option<String> {
    let from_query = url
        .query_pairs()
        .find(|(name, _)| name == SESSION_ID_PARAM)
        .map(|(_, value)| value.trim().to_string());
    if let Some(session_id) = from_query.filter(|value| is_usable(value)) {
        return Some(session_id);
    }

    let fragment = url.fragment()?;
    let params = fragment
        .rsplit_once('?')
        .map(|(_, params)| params)
        .unwrap_or(fragment);
    url::form_urlencoded::parse(params.as_bytes())
        .find(|(name, _)| name == SESSION_ID_PARAM)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| is_usable(value))
}

/// False for blank ids and for the template the provider failed to substitute.
pub(crate) fn is_usable(session_id: &str) -> bool {
    let session_id = session_id.trim();
    !session_id.is_empty() && session_id != SESSION_ID_PLACEHOLDER
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::enums::subscription_plans::SubscriptionPlan;
    use crate::infrastructure::storages::in_memory::InMemoryStorage;

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[test]
    fn reads_query_parameter() {
        assert_eq!(
            session_id_from_url(&url("https://app.example.com/checkout/success?session_id=cs_1")),
            Some("cs_1".to_string())
        );
    }

    #[test]
    fn reads_fragment_forms() {
        assert_eq!(
            session_id_from_url(&url("https://app.example.com/#session_id=cs_2")),
            Some("cs_2".to_string())
        );
        assert_eq!(
            session_id_from_url(&url(
                "https://app.example.com/#/checkout/success?session_id=cs_3&x=1"
            )),
            Some("cs_3".to_string())
        );
    }

    #[test]
    fn query_wins_over_fragment() {
        assert_eq!(
            session_id_from_url(&url("https://app.example.com/?session_id=cs_q#session_id=cs_f")),
            Some("cs_q".to_string())
        );
    }

    #[test]
    fn ignores_empty_and_unsubstituted_values() {
        assert_eq!(session_id_from_url(&url("https://app.example.com/?session_id=")), None);
        assert_eq!(
            session_id_from_url(&url(
                "https://app.example.com/?session_id={CHECKOUT_SESSION_ID}"
            )),
            None
        );
        assert_eq!(session_id_from_url(&url("https://app.example.com/#/billing")), None);
    }

    #[tokio::test]
    async fn caches_url_value_and_falls_back_to_it_after_reload() {
        let resolver = SessionIdResolver::new(Arc::new(InMemoryStorage::new()));

        let first = resolver
            .resolve(&url("https://app.example.com/checkout/success?session_id=cs_9"))
            .await
            .unwrap();
        assert_eq!(first, "cs_9");

        let reloaded = resolver
            .resolve(&url("https://app.example.com/checkout/success"))
            .await
            .unwrap();
        assert_eq!(reloaded, "cs_9");
    }

    #[tokio::test]
    async fn no_id_anywhere_is_an_error() {
        let resolver = SessionIdResolver::new(Arc::new(InMemoryStorage::new()));
        let err = resolver
            .resolve(&url("https://app.example.com/checkout/success"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NoSessionId));
    }

    #[tokio::test]
    async fn consume_forgets_session_and_pending_checkout() {
        let resolver = SessionIdResolver::new(Arc::new(InMemoryStorage::new()));
        resolver
            .remember_pending(&PendingCheckout {
                price_id: "price_t2".to_string(),
                plan: SubscriptionPlan::Tier2,
                started_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        let session = resolver
            .checkout_session(&url("https://app.example.com/?session_id=cs_5"))
            .await
            .unwrap();
        assert_eq!(session.expected_plan, Some(SubscriptionPlan::Tier2));
        assert_eq!(session.price_id.as_deref(), Some("price_t2"));

        resolver.consume().await;
        assert!(resolver.pending_checkout().await.is_none());
        assert!(matches!(
            resolver.resolve(&url("https://app.example.com/")).await,
            Err(SyncError::NoSessionId)
        ));
    }
}
