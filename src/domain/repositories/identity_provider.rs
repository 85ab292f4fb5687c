use async_trait::async_trait;

use crate::domain::entities::auth_snapshots::AuthUser;
use crate::domain::errors::SyncResult;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The signed-in user, if the live session survived.
    async fn current_user(&self) -> Option<AuthUser>;

    /// Bearer token for the live session. Fails with `Authentication` when
    /// there is no session or the provider refuses to issue a token.
    async fn id_token(&self, force_refresh: bool) -> SyncResult<String>;
}
