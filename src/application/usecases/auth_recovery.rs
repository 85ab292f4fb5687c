use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::config_model::AuthRecoveryConfig;
use crate::domain::entities::auth_snapshots::{AuthSnapshot, AuthUser};
use crate::domain::errors::SyncResult;
use crate::domain::repositories::{
    durable_storage::{DurableStorage, keys},
    identity_provider::IdentityProvider,
};

/// Keeps a copy of the caller's credentials across the checkout redirect.
pub struct AuthRecoveryCache {
    storage: Arc<dyn DurableStorage>,
    identity: Arc<dyn IdentityProvider>,
    config: AuthRecoveryConfig,
}

impl AuthRecoveryCache {
    pub fn new(
        storage: Arc<dyn DurableStorage>,
        identity: Arc<dyn IdentityProvider>,
        config: AuthRecoveryConfig,
    ) -> Self {
        Self {
            storage,
            identity,
            config,
        }
    }

    /// Persists `{uid, email, token}` for `user`. Failures are logged and swallowed:
    /// a missing snapshot only costs the direct verification path later.
    pub async fn capture(&self, user: &AuthUser) {
        let token = match self.identity.id_token(false).await {
            Ok(token) => token,
            Err(err) => {
                warn!(uid = %user.uid, error = %err, "auth_recovery: no token to capture");
                return;
            }
        };
        self.store_snapshot(AuthSnapshot::new(user, token)).await;
    }

    /// Reads the snapshot back. Never fails; unreadable or expired snapshots read as `None`.
    pub async fn recover(&self) -> Option<AuthSnapshot> {
        let raw = match self.storage.get(keys::AUTH_RECOVERY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, "auth_recovery: failed to read snapshot");
                return None;
            }
        };

        let snapshot: AuthSnapshot = match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(error = %err, "auth_recovery: discarding unreadable snapshot");
                return None;
            }
        };

        let max_age = self
            .config
            .snapshot_max_age
            .and_then(|max_age| chrono::Duration::from_std(max_age).ok());
        let now = Utc::now();
        if snapshot.is_expired(max_age, now) {
            info!(
                uid = %snapshot.uid,
                age_secs = snapshot.age(now).num_seconds(),
                "auth_recovery: ignoring expired snapshot"
            );
            return None;
        }

        Some(snapshot)
    }

    /// Forces a new token from the live session. `Ok(None)` when no user is signed in.
    pub async fn refresh(&self) -> SyncResult<Option<String>> {
        let Some(user) = self.identity.current_user().await else {
            debug!("auth_recovery: no live session to refresh");
            return Ok(None);
        };

        let token = self.identity.id_token(true).await?;
        self.store_snapshot(AuthSnapshot::new(&user, token.clone()))
            .await;
        debug!(uid = %user.uid, "auth_recovery: refreshed live token");
        Ok(Some(token))
    }

    /// A freshly refreshed live token when possible, else the cached one.
    pub async fn best_token(&self) -> Option<String> {
        match self.refresh().await {
            Ok(Some(token)) => return Some(token),
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, "auth_recovery: live refresh failed, using cached token");
            }
        }
        self.recover().await.map(|snapshot| snapshot.token)
    }

    async fn store_snapshot(&self, snapshot: AuthSnapshot) {
        let raw = match serde_json::to_string(&snapshot) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "auth_recovery: failed to encode snapshot");
                return;
            }
        };
        if let Err(err) = self.storage.set(keys::AUTH_RECOVERY, &raw).await {
            warn!(uid = %snapshot.uid, error = %err, "auth_recovery: failed to persist snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::SyncError;
    use crate::domain::repositories::{
        durable_storage::MockDurableStorage, identity_provider::MockIdentityProvider,
    };
    use crate::infrastructure::storages::in_memory::InMemoryStorage;
    use std::time::Duration;

    fn user() -> AuthUser {
        AuthUser {
            uid: "user_1".to_string(),
            email: Some("user@example.com".to_string()),
        }
    }

    fn cache(
        storage: Arc<dyn DurableStorage>,
        identity: MockIdentityProvider,
        max_age: Option<Duration>,
    ) -> AuthRecoveryCache {
        AuthRecoveryCache::new(
            storage,
            Arc::new(identity),
            AuthRecoveryConfig {
                snapshot_max_age: max_age,
            },
        )
    }

    #[tokio::test]
    async fn capture_then_recover_round_trips_the_snapshot() {
        let storage = Arc::new(InMemoryStorage::new());
        let mut identity = MockIdentityProvider::new();
        identity
            .expect_id_token()
            .returning(|_| Ok("tok_before_redirect".to_string()));

        let cache = cache(storage, identity, Some(Duration::from_secs(3600)));
        cache.capture(&user()).await;

        let snapshot = cache.recover().await.unwrap();
        assert_eq!(snapshot.uid, "user_1");
        assert_eq!(snapshot.email.as_deref(), Some("user@example.com"));
        assert_eq!(snapshot.token, "tok_before_redirect");
    }

    #[tokio::test]
    async fn recover_ignores_snapshots_older_than_max_age() {
        let storage = Arc::new(InMemoryStorage::new());
        let stale = AuthSnapshot {
            uid: "user_1".to_string(),
            email: None,
            token: "old".to_string(),
            captured_at: Utc::now() - chrono::Duration::hours(3),
        };
        storage
            .set(keys::AUTH_RECOVERY, &serde_json::to_string(&stale).unwrap())
            .await
            .unwrap();

        let bounded = cache(
            storage.clone(),
            MockIdentityProvider::new(),
            Some(Duration::from_secs(3600)),
        );
        assert!(bounded.recover().await.is_none());

        let unbounded = cache(storage, MockIdentityProvider::new(), None);
        assert_eq!(unbounded.recover().await.unwrap().token, "old");
    }

    #[tokio::test]
    async fn recover_tolerates_garbage_and_storage_errors() {
        let storage = Arc::new(InMemoryStorage::new());
        storage.set(keys::AUTH_RECOVERY, "{not json").await.unwrap();
        let cache_with_garbage = cache(storage, MockIdentityProvider::new(), None);
        assert!(cache_with_garbage.recover().await.is_none());

        let mut failing = MockDurableStorage::new();
        failing
            .expect_get()
            .returning(|_| Err(anyhow::anyhow!("disk unavailable")));
        let cache_with_failing_storage = cache(Arc::new(failing), MockIdentityProvider::new(), None);
        assert!(cache_with_failing_storage.recover().await.is_none());
    }

    #[tokio::test]
    async fn capture_swallows_storage_failures() {
        let mut failing = MockDurableStorage::new();
        failing
            .expect_set()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("quota exceeded")));
        let mut identity = MockIdentityProvider::new();
        identity.expect_id_token().returning(|_| Ok("tok".to_string()));

        cache(Arc::new(failing), identity, None).capture(&user()).await;
    }

    #[tokio::test]
    async fn best_token_prefers_refreshed_live_token() {
        let storage = Arc::new(InMemoryStorage::new());
        let mut identity = MockIdentityProvider::new();
        identity.expect_current_user().returning(|| Some(user()));
        identity
            .expect_id_token()
            .withf(|force_refresh| *force_refresh)
            .returning(|_| Ok("fresh".to_string()));

        let cache = cache(storage, identity, None);
        assert_eq!(cache.best_token().await.as_deref(), Some("fresh"));
        assert_eq!(cache.recover().await.unwrap().token, "fresh");
    }

    #[tokio::test]
    async fn best_token_falls_back_to_cached_snapshot() {
        let storage = Arc::new(InMemoryStorage::new());
        let snapshot = AuthSnapshot::new(&user(), "cached".to_string());
        storage
            .set(keys::AUTH_RECOVERY, &serde_json::to_string(&snapshot).unwrap())
            .await
            .unwrap();

        let mut signed_out = MockIdentityProvider::new();
        signed_out.expect_current_user().returning(|| None);
        let cache_signed_out = cache(storage.clone(), signed_out, None);
        assert_eq!(cache_signed_out.best_token().await.as_deref(), Some("cached"));

        let mut refusing = MockIdentityProvider::new();
        refusing.expect_current_user().returning(|| Some(user()));
        refusing
            .expect_id_token()
            .returning(|_| Err(SyncError::Authentication("refresh revoked".to_string())));
        let cache_refusing = cache(storage, refusing, None);
        assert_eq!(cache_refusing.best_token().await.as_deref(), Some("cached"));
    }
}
