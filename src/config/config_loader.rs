use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use url::Url;

use super::config_model::{
    AppUrls, AuthRecoveryConfig, BillingApi, DotEnvyConfig, PlanCatalog, PollingConfig,
    StaticCredentials, Storage, VerificationPolicy,
};
use super::stage::Stage;
use crate::domain::value_objects::enums::subscription_plans::SubscriptionPlan;

pub fn load() -> Result<DotEnvyConfig> {
    load_from(|key| std::env::var(key).ok())
}

/// Builds the config from any variable source; `load` passes the process environment.
pub fn load_from<F>(lookup: F) -> Result<DotEnvyConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let env = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    let stage = env("STAGE")
        .map(|value| Stage::try_from(&value))
        .transpose()
        .context("STAGE is invalid")?
        .unwrap_or_default();

    let billing_api = BillingApi {
        base_url: Url::parse(&env("BILLING_API_URL").context("BILLING_API_URL is missing")?)
            .context("BILLING_API_URL is invalid")?,
        timeout: Duration::from_secs(parse_or(&env, "HTTP_TIMEOUT_SECS", 10)?),
    };

    let app = AppUrls {
        base_url: Url::parse(&env("APP_BASE_URL").context("APP_BASE_URL is missing")?)
            .context("APP_BASE_URL is invalid")?,
    };

    let verification_defaults = VerificationPolicy::default();
    let verification = VerificationPolicy {
        auth_backoff: Duration::from_millis(parse_or(
            &env,
            "VERIFY_AUTH_BACKOFF_MS",
            millis(verification_defaults.auth_backoff),
        )?),
        final_delay: Duration::from_millis(parse_or(
            &env,
            "VERIFY_FINAL_DELAY_MS",
            millis(verification_defaults.final_delay),
        )?),
    };

    let polling_defaults = PollingConfig::default();
    let polling = PollingConfig {
        slow_interval: Duration::from_secs(parse_or(
            &env,
            "POLL_SLOW_SECS",
            polling_defaults.slow_interval.as_secs(),
        )?),
        fast_interval: Duration::from_secs(parse_or(
            &env,
            "POLL_FAST_SECS",
            polling_defaults.fast_interval.as_secs(),
        )?),
        burst_window: Duration::from_secs(parse_or(
            &env,
            "POLL_BURST_SECS",
            polling_defaults.burst_window.as_secs(),
        )?),
    };
    anyhow::ensure!(
        !polling.slow_interval.is_zero() && !polling.fast_interval.is_zero(),
        "POLL_SLOW_SECS and POLL_FAST_SECS must be greater than zero"
    );

    let max_age_secs: u64 = parse_or(&env, "AUTH_SNAPSHOT_MAX_AGE_SECS", 60 * 60)?;
    let auth_recovery = AuthRecoveryConfig {
        snapshot_max_age: (max_age_secs > 0).then(|| Duration::from_secs(max_age_secs)),
    };

    let storage = Storage {
        dir: env("STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".subscription-sync")),
    };

    let mut prices = HashMap::new();
    for (index, plan) in SubscriptionPlan::PAID.into_iter().enumerate() {
        let key = format!("PRICE_ID_TIER{}", index + 1);
        if let Some(price_id) = env(key.as_str()) {
            prices.insert(price_id.trim().to_string(), plan);
        }
    }

    let credentials = match (env("AUTH_UID"), env("AUTH_TOKEN")) {
        (Some(uid), Some(token)) => Some(StaticCredentials {
            uid,
            email: env("AUTH_EMAIL"),
            token,
        }),
        _ => None,
    };

    Ok(DotEnvyConfig {
        stage,
        billing_api,
        app,
        verification,
        polling,
        auth_recovery,
        storage,
        plans: PlanCatalog::new(prices),
        credentials,
    })
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn parse_or<F, T>(env: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} is invalid")),
        None => Ok(default),
    }
}
