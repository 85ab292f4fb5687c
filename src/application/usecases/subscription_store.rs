use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::domain::errors::SyncResult;
use crate::domain::repositories::billing_gateway::BillingGateway;
use crate::domain::value_objects::subscriptions::{OptimisticMutation, SubscriptionRecord};

/// What observers of the store see.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreState {
    pub record: Option<SubscriptionRecord>,
    /// True while `record` carries a local mutation the server has not confirmed.
    pub optimistic: bool,
    sequence: u64,
    confirmed: Option<SubscriptionRecord>,
}

/// Single source of truth for the user's subscription on this client.
///
/// Every fetch and every optimistic mutation draws a ticket from one counter.
/// A fetch only writes when its ticket is newer than whatever wrote last, so
/// a slow response can never overwrite a newer fetch or a mutation made after
/// the request went out.
pub struct SubscriptionStore {
    gateway: Arc<dyn BillingGateway>,
    state: watch::Sender<StoreState>,
    next_sequence: AtomicU64,
}

impl SubscriptionStore {
    pub fn new(gateway: Arc<dyn BillingGateway>) -> Self {
        let (state, _) = watch::channel(StoreState::default());
        Self {
            gateway,
            state,
            next_sequence: AtomicU64::new(0),
        }
    }

    /// Starts from a record loaded elsewhere, e.g. a previous session.
    pub fn with_record(gateway: Arc<dyn BillingGateway>, record: SubscriptionRecord) -> Self {
        let store = Self::new(gateway);
        store.state.send_modify(|state| {
            state.confirmed = Some(record.clone());
            state.record = Some(record);
        });
        store
    }

    /// Reads the authoritative record and publishes it unless a newer write won.
    /// The fetched record is returned either way.
    pub async fn fetch(&self) -> SyncResult<SubscriptionRecord> {
        let sequence = self.take_sequence();

        let response = self.gateway.fetch_subscription().await.map_err(|err| {
            warn!(sequence, error = %err, "subscription_store: fetch failed");
            err
        })?;
        let record = SubscriptionRecord::try_from(response).map_err(|err| {
            warn!(sequence, error = %err, "subscription_store: rejected subscription payload");
            err
        })?;

        let mut applied = false;
        self.state.send_if_modified(|state| {
            if sequence < state.sequence {
                return false;
            }
            applied = true;
            state.sequence = sequence;
            let changed = state.record.as_ref() != Some(&record) || state.optimistic;
            state.record = Some(record.clone());
            state.confirmed = Some(record.clone());
            state.optimistic = false;
            changed
        });

        if applied {
            debug!(
                sequence,
                plan = %record.plan,
                status = %record.status,
                "subscription_store: record updated"
            );
        } else {
            debug!(sequence, "subscription_store: dropped stale response");
        }

        Ok(record)
    }

    /// Applies a local mutation ahead of the server. Returns `false` and leaves
    /// the state untouched when there is no record or the mutation is not allowed.
    pub fn apply_optimistic(&self, mutation: OptimisticMutation) -> bool {
        let sequence = self.take_sequence();
        let applied = self.state.send_if_modified(|state| {
            let Some(mut record) = state.record.clone() else {
                return false;
            };
            if !mutation.apply(&mut record) {
                return false;
            }
            state.sequence = sequence;
            state.record = Some(record);
            state.optimistic = true;
            true
        });
        debug!(?mutation, applied, "subscription_store: optimistic update");
        applied
    }

    /// Drops an unconfirmed local mutation and restores the last server record.
    pub fn discard_optimistic(&self) {
        self.state.send_if_modified(|state| {
            if !state.optimistic {
                return false;
            }
            state.record = state.confirmed.clone();
            state.optimistic = false;
            true
        });
    }

    pub fn current(&self) -> Option<SubscriptionRecord> {
        self.state.borrow().record.clone()
    }

    pub fn snapshot(&self) -> StoreState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StoreState> {
        self.state.subscribe()
    }

    fn take_sequence(&self) -> u64 {
        self.next_sequence.fetch_add(1, Ordering::SeqCst) + 1
    }
}
