use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no checkout session id in the return url, its fragment, or the local cache")]
    NoSessionId,
    #[error("invalid plan price id: {0:?}")]
    InvalidPlan(String),
    #[error("checkout session could not be created: {0}")]
    CheckoutCreation(String),
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("network request failed: {0:#}")]
    Network(anyhow::Error),
    #[error("invalid response from billing api: {0}")]
    InvalidResponse(String),
    #[error("subscription could not be verified after all strategies: {last_error}")]
    VerificationExhausted { last_error: String },
    #[error("subscription cannot be canceled: {0}")]
    NotCancellable(&'static str),
    #[error("durable storage failed: {0:#}")]
    Storage(anyhow::Error),
}

impl SyncError {
    pub fn is_authentication(&self) -> bool {
        matches!(self, SyncError::Authentication(_))
    }

    /// Errors surfaced to the caller as a final verdict rather than recovered locally.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncError::NoSessionId
                | SyncError::InvalidPlan(_)
                | SyncError::CheckoutCreation(_)
                | SyncError::VerificationExhausted { .. }
        )
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
