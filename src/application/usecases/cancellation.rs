use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::application::usecases::subscription_store::SubscriptionStore;
use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::repositories::billing_gateway::BillingGateway;
use crate::domain::value_objects::enums::{
    api_statuses::ApiStatus, subscription_statuses::SubscriptionStatus,
};
use crate::domain::value_objects::subscriptions::{OptimisticMutation, SubscriptionRecord};

const DEFAULT_SUCCESS_MESSAGE: &str =
    "Subscription will be canceled at the end of the current billing period";

#[derive(Debug, Clone)]
pub struct CancelOutcome {
    pub status: ApiStatus,
    pub message: String,
    /// The store's record after the resynchronizing fetch.
    pub record: Option<SubscriptionRecord>,
}

pub struct CancellationCoordinator {
    store: Arc<SubscriptionStore>,
    gateway: Arc<dyn BillingGateway>,
}

impl CancellationCoordinator {
    pub fn new(store: Arc<SubscriptionStore>, gateway: Arc<dyn BillingGateway>) -> Self {
        Self { store, gateway }
    }

    /// Marks the subscription canceling right away, asks the server to cancel at
    /// period end, then refetches so the store ends on server truth whatever the
    /// request returned.
    pub async fn cancel(&self) -> SyncResult<CancelOutcome> {
        let current = match self.store.current() {
            Some(record) => record,
            None => self.store.fetch().await?,
        };
        if !current.plan.is_paid() {
            return Err(SyncError::NotCancellable("the free plan has nothing to cancel"));
        }
        if current.status == SubscriptionStatus::Canceled {
            return Err(SyncError::NotCancellable("the subscription is already canceled"));
        }

        let optimistic = self.store.apply_optimistic(OptimisticMutation::MarkCanceling);
        debug!(optimistic, plan = %current.plan, "cancellation: request sent");

        let result = self.gateway.cancel_subscription().await;

        let record = match self.store.fetch().await {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(error = %err, "cancellation: resync failed, dropping local change");
                self.store.discard_optimistic();
                self.store.current()
            }
        };

        let outcome = match result {
            Ok(response) if response.status.is_success() => {
                info!(plan = %current.plan, "cancellation: accepted by billing api");
                CancelOutcome {
                    status: ApiStatus::Success,
                    message: response
                        .message
                        .unwrap_or_else(|| DEFAULT_SUCCESS_MESSAGE.to_string()),
                    record,
                }
            }
            Ok(response) => {
                let message = response
                    .message
                    .unwrap_or_else(|| "cancellation was rejected".to_string());
                warn!(message = %message, "cancellation: rejected by billing api");
                CancelOutcome {
                    status: ApiStatus::Error,
                    message,
                    record,
                }
            }
            Err(err) => {
                error!(error = %err, "cancellation: request failed");
                CancelOutcome {
                    status: ApiStatus::Error,
                    message: err.to_string(),
                    record,
                }
            }
        };
        Ok(outcome)
    }
}
