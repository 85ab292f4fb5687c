use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{Instrument, debug, info, info_span, warn};
use url::Url;
use uuid::Uuid;

use crate::application::usecases::{
    auth_recovery::AuthRecoveryCache,
    session_ids::{self, SessionIdResolver},
    subscription_store::SubscriptionStore,
};
use crate::config::config_model::{AUTH_RETRIES_PER_STATE, VerificationPolicy};
use crate::domain::entities::checkout_sessions::CheckoutSession;
use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::repositories::billing_gateway::{BillingGateway, DirectVerifier};
use crate::domain::value_objects::enums::subscription_plans::SubscriptionPlan;
use crate::domain::value_objects::subscriptions::SubscriptionRecord;
use crate::domain::value_objects::verification::VerifySessionResponse;

/// States of one reconciliation run.
///
/// | From              | Outcome                          | To                    |
/// |-------------------|----------------------------------|-----------------------|
/// | Idle              | start                            | CheckingCache         |
/// | CheckingCache     | active paid record               | Succeeded(Cache)      |
/// | CheckingCache     | anything else                    | CallingPrimary        |
/// | CallingPrimary    | verified                         | Succeeded(Primary)    |
/// | CallingPrimary    | auth error, retries left         | CallingPrimary (-1)   |
/// | CallingPrimary    | other failure                    | CallingDirect         |
/// | CallingDirect     | verified                         | Succeeded(Direct)     |
/// | CallingDirect     | auth error, retries left         | CallingDirect (-1)    |
/// | CallingDirect     | other failure or no token        | FinalDelayCheck       |
/// | FinalDelayCheck   | active paid record               | Succeeded(FinalCheck) |
/// | FinalDelayCheck   | anything else                    | Failed                |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationState {
    Idle,
    CheckingCache,
    CallingPrimary { auth_retries_left: u8 },
    CallingDirect { auth_retries_left: u8 },
    FinalDelayCheck,
    Succeeded(VerifiedBy),
    Failed,
}

impl VerificationState {
    fn name(&self) -> &'static str {
        match self {
            VerificationState::Idle => "idle",
            VerificationState::CheckingCache => "checking_cache",
            VerificationState::CallingPrimary { .. } => "calling_primary",
            VerificationState::CallingDirect { .. } => "calling_direct",
            VerificationState::FinalDelayCheck => "final_delay_check",
            VerificationState::Succeeded(_) => "succeeded",
            VerificationState::Failed => "failed",
        }
    }
}

impl fmt::Display for VerificationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which strategy confirmed the purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifiedBy {
    Cache,
    Primary,
    Direct,
    FinalCheck,
}

impl fmt::Display for VerifiedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VerifiedBy::Cache => "cache",
            VerifiedBy::Primary => "primary",
            VerifiedBy::Direct => "direct",
            VerifiedBy::FinalCheck => "final_check",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Confirmed,
    NotYetActive,
    Rejected(String),
    AuthFailed(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptLogEntry {
    pub state: VerificationState,
    pub outcome: AttemptOutcome,
    /// Explicit wait before the next strategy ran.
    pub delay_before_next: Duration,
}

#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    pub session_id: String,
    pub verified_by: VerifiedBy,
    /// Plan reported by the verification endpoint, or read from the refreshed record.
    pub plan: Option<SubscriptionPlan>,
    pub record: Option<SubscriptionRecord>,
    pub attempts: Vec<AttemptLogEntry>,
    pub network_calls: u32,
}

/// Confirms a purchase after the checkout redirect, falling through cache check,
/// primary verification, direct verification and a delayed cache check.
pub struct VerificationReconciler {
    store: Arc<SubscriptionStore>,
    gateway: Arc<dyn BillingGateway>,
    direct: Arc<dyn DirectVerifier>,
    auth_recovery: Arc<AuthRecoveryCache>,
    sessions: Arc<SessionIdResolver>,
    policy: VerificationPolicy,
}

impl VerificationReconciler {
    pub fn new(
        store: Arc<SubscriptionStore>,
        gateway: Arc<dyn BillingGateway>,
        direct: Arc<dyn DirectVerifier>,
        auth_recovery: Arc<AuthRecoveryCache>,
        sessions: Arc<SessionIdResolver>,
        policy: VerificationPolicy,
    ) -> Self {
        Self {
            store,
            gateway,
            direct,
            auth_recovery,
            sessions,
            policy,
        }
    }

    /// Entry point for the success page: resolves the session from the return url,
    /// reconciles it and forgets it once a verdict is reached.
    pub async fn reconcile_return(&self, return_url: &Url) -> SyncResult<VerificationOutcome> {
        let session = self.sessions.checkout_session(return_url).await?;
        let result = self.reconcile(session).await;
        if result.is_ok() || result.as_ref().is_err_and(SyncError::is_terminal) {
            self.sessions.consume().await;
        }
        result
    }

    pub async fn reconcile(&self, session: CheckoutSession) -> SyncResult<VerificationOutcome> {
        if !session_ids::is_usable(&session.session_id) {
            return Err(SyncError::NoSessionId);
        }

        let span = info_span!(
            "verification",
            run_id = %Uuid::new_v4(),
            session_id = %session.session_id,
        );
        self.run(session).instrument(span).await
    }

    async fn run(&self, session: CheckoutSession) -> SyncResult<VerificationOutcome> {
        let mut run = Run::new(session);
        let mut state = VerificationState::Idle;
        loop {
            state = match state {
                VerificationState::Succeeded(verified_by) => {
                    return Ok(self.finish(run, verified_by).await);
                }
                VerificationState::Failed => {
                    let err = run.into_error();
                    warn!(error = %err, "verification: all strategies failed");
                    return Err(err);
                }
                current => {
                    let next = self.step(current, &mut run).await;
                    debug!(from = %current, to = %next, "verification: transition");
                    next
                }
            };
        }
    }

    async fn step(&self, state: VerificationState, run: &mut Run) -> VerificationState {
        match state {
            VerificationState::Idle => VerificationState::CheckingCache,
            VerificationState::CheckingCache => {
                if self.check_store(state, run).await {
                    VerificationState::Succeeded(VerifiedBy::Cache)
                } else {
                    VerificationState::CallingPrimary {
                        auth_retries_left: AUTH_RETRIES_PER_STATE,
                    }
                }
            }
            VerificationState::CallingPrimary { auth_retries_left } => {
                run.network_calls += 1;
                let result = self.gateway.verify_session(&run.session.session_id).await;
                self.after_verification(state, auth_retries_left, result, run)
                    .await
            }
            VerificationState::CallingDirect { auth_retries_left } => {
                let Some(token) = self.auth_recovery.best_token().await else {
                    run.log_failure(
                        state,
                        SyncError::Authentication(
                            "no live or cached credential for direct verification".to_string(),
                        ),
                        self.policy.final_delay,
                    );
                    return VerificationState::FinalDelayCheck;
                };
                run.network_calls += 1;
                let result = self
                    .direct
                    .verify_session_with_token(&run.session.session_id, &token)
                    .await;
                self.after_verification(state, auth_retries_left, result, run)
                    .await
            }
            VerificationState::FinalDelayCheck => {
                tokio::time::sleep(self.policy.final_delay).await;
                if self.check_store(state, run).await {
                    VerificationState::Succeeded(VerifiedBy::FinalCheck)
                } else {
                    VerificationState::Failed
                }
            }
            terminal @ (VerificationState::Succeeded(_) | VerificationState::Failed) => terminal,
        }
    }

    /// Shared handling for both verification endpoints; only the fall-through target differs.
    async fn after_verification(
        &self,
        state: VerificationState,
        auth_retries_left: u8,
        result: SyncResult<VerifySessionResponse>,
        run: &mut Run,
    ) -> VerificationState {
        let (verified_by, retry, fall_through, fall_through_delay) = match state {
            VerificationState::CallingPrimary { .. } => (
                VerifiedBy::Primary,
                VerificationState::CallingPrimary {
                    auth_retries_left: auth_retries_left.saturating_sub(1),
                },
                VerificationState::CallingDirect {
                    auth_retries_left: AUTH_RETRIES_PER_STATE,
                },
                Duration::ZERO,
            ),
            _ => (
                VerifiedBy::Direct,
                VerificationState::CallingDirect {
                    auth_retries_left: auth_retries_left.saturating_sub(1),
                },
                VerificationState::FinalDelayCheck,
                self.policy.final_delay,
            ),
        };

        match result {
            Ok(response) if response.is_verified() => {
                run.verified_plan = response.plan();
                run.log(state, AttemptOutcome::Confirmed, Duration::ZERO);
                VerificationState::Succeeded(verified_by)
            }
            Ok(response) => {
                let reason = response.rejection_reason();
                run.last_error = Some(reason.clone());
                run.only_auth_failures = false;
                run.log(state, AttemptOutcome::Rejected(reason), fall_through_delay);
                fall_through
            }
            Err(err) if err.is_authentication() && auth_retries_left > 0 => {
                info!(state = %state, error = %err, "verification: auth failure, refreshing and retrying");
                run.log_failure(state, err, self.policy.auth_backoff);
                tokio::time::sleep(self.policy.auth_backoff).await;
                if matches!(state, VerificationState::CallingPrimary { .. }) {
                    if let Err(err) = self.auth_recovery.refresh().await {
                        warn!(error = %err, "verification: token refresh failed");
                    }
                }
                retry
            }
            Err(err) => {
                warn!(state = %state, error = %err, "verification: strategy failed");
                run.log_failure(state, err, fall_through_delay);
                fall_through
            }
        }
    }

    /// One fetch through the store. True when the record confirms the purchase.
    async fn check_store(&self, state: VerificationState, run: &mut Run) -> bool {
        run.network_calls += 1;
        match self.store.fetch().await {
            Ok(record) => {
                let confirmed = record.satisfies(run.session.expected_plan);
                if confirmed {
                    run.log(state, AttemptOutcome::Confirmed, Duration::ZERO);
                } else {
                    run.last_error = Some(format!(
                        "subscription not active yet (plan {}, status {})",
                        record.plan, record.status
                    ));
                    run.only_auth_failures = false;
                    run.log(state, AttemptOutcome::NotYetActive, Duration::ZERO);
                }
                run.record = Some(record);
                confirmed
            }
            Err(err) => {
                run.log_failure(state, err, Duration::ZERO);
                false
            }
        }
    }

    /// A verification endpoint success is followed by one fetch so observers see the
    /// new plan. A cache success already published the record it read.
    async fn finish(&self, mut run: Run, verified_by: VerifiedBy) -> VerificationOutcome {
        if matches!(verified_by, VerifiedBy::Primary | VerifiedBy::Direct) {
            run.network_calls += 1;
            match self.store.fetch().await {
                Ok(record) => run.record = Some(record),
                Err(err) => warn!(error = %err, "verification: confirming fetch failed"),
            }
        }

        let plan = run
            .verified_plan
            .or_else(|| run.record.as_ref().map(|record| record.plan).filter(|plan| plan.is_paid()))
            .or(run.session.expected_plan);

        info!(
            %verified_by,
            network_calls = run.network_calls,
            plan = plan.map(|plan| plan.as_str()).unwrap_or("unknown"),
            "verification: subscription confirmed"
        );

        VerificationOutcome {
            session_id: run.session.session_id,
            verified_by,
            plan,
            record: run.record,
            attempts: run.attempts,
            network_calls: run.network_calls,
        }
    }
}

/// Mutable bookkeeping of one run.
struct Run {
    session: CheckoutSession,
    attempts: Vec<AttemptLogEntry>,
    network_calls: u32,
    last_error: Option<String>,
    only_auth_failures: bool,
    verified_plan: Option<SubscriptionPlan>,
    record: Option<SubscriptionRecord>,
}

impl Run {
    fn new(session: CheckoutSession) -> Self {
        Self {
            session,
            attempts: Vec::new(),
            network_calls: 0,
            last_error: None,
            only_auth_failures: true,
            verified_plan: None,
            record: None,
        }
    }

    fn log(&mut self, state: VerificationState, outcome: AttemptOutcome, delay_before_next: Duration) {
        self.attempts.push(AttemptLogEntry {
            state,
            outcome,
            delay_before_next,
        });
    }

    fn log_failure(&mut self, state: VerificationState, err: SyncError, delay_before_next: Duration) {
        let message = err.to_string();
        let outcome = if err.is_authentication() {
            AttemptOutcome::AuthFailed(message.clone())
        } else {
            self.only_auth_failures = false;
            AttemptOutcome::Failed(message.clone())
        };
        self.last_error = Some(message);
        self.log(state, outcome, delay_before_next);
    }

    /// `Authentication` only when every strategy failed on credentials.
    fn into_error(self) -> SyncError {
        match self.last_error {
            Some(last_error) if self.only_auth_failures => SyncError::Authentication(last_error),
            Some(last_error) => SyncError::VerificationExhausted { last_error },
            None => SyncError::VerificationExhausted {
                last_error: "no verification strategy produced a result".to_string(),
            },
        }
    }
}
