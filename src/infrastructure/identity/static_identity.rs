use async_trait::async_trait;
use tracing::debug;

use crate::domain::entities::auth_snapshots::AuthUser;
use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::repositories::identity_provider::IdentityProvider;

/// Identity fed from configuration. A static token cannot be refreshed, so a
/// forced refresh hands back the same value.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityProvider {
    session: Option<(AuthUser, String)>,
}

impl StaticIdentityProvider {
    pub fn signed_in(user: AuthUser, token: String) -> Self {
        Self {
            session: Some((user, token)),
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn current_user(&self) -> Option<AuthUser> {
        self.session.as_ref().map(|(user, _)| user.clone())
    }

    async fn id_token(&self, force_refresh: bool) -> SyncResult<String> {
        match &self.session {
            Some((user, token)) => {
                debug!(uid = %user.uid, force_refresh, "identity: issuing static token");
                Ok(token.clone())
            }
            None => Err(SyncError::Authentication("no signed-in user".to_string())),
        }
    }
}
