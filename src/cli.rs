use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use url::Url;

use crate::application::usecases::{
    auth_recovery::AuthRecoveryCache, cancellation::CancellationCoordinator,
    checkout::CheckoutInitiator, polling::PollingSynchronizer, session_ids::SessionIdResolver,
    subscription_store::SubscriptionStore, verification::VerificationReconciler,
};
use crate::config::config_model::DotEnvyConfig;
use crate::domain::entities::auth_snapshots::AuthUser;
use crate::domain::repositories::{
    billing_gateway::{BillingGateway, DirectVerifier},
    durable_storage::DurableStorage,
    identity_provider::IdentityProvider,
};
use crate::infrastructure::{
    http::billing_client::{
        BillingEndpoints, BillingHttpClient, DirectVerificationClient, build_http_client,
    },
    identity::static_identity::StaticIdentityProvider,
    storages::file_storage::FileStorage,
};

#[derive(Parser, Debug)]
#[command(name = "subscription-sync")]
#[command(version)]
#[command(about = "Keep a local subscription view in sync with the billing API", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start a checkout for a price and print the redirect URL
    Checkout { price_id: String },

    /// Verify a purchase from the URL the checkout returned to
    Reconcile { return_url: Url },

    /// Cancel the subscription at the end of the billing period
    Cancel,

    /// Fetch and print the current subscription
    Status,

    /// Poll the subscription until Ctrl-C
    Watch {
        /// Start in the fast cadence used right after a checkout
        #[arg(long)]
        after_checkout: bool,
    },
}

/// Every component wired against the real billing API and on-disk storage.
pub struct Services {
    pub store: Arc<SubscriptionStore>,
    pub checkout: CheckoutInitiator,
    pub reconciler: VerificationReconciler,
    pub cancellation: CancellationCoordinator,
    pub poller: PollingSynchronizer,
}

impl Services {
    pub async fn build(config: &DotEnvyConfig) -> Result<Self> {
        let storage: Arc<dyn DurableStorage> = Arc::new(FileStorage::new(&config.storage.dir).await?);
        info!(dir = %config.storage.dir.display(), "Durable storage is ready");

        let identity: Arc<dyn IdentityProvider> = Arc::new(match &config.credentials {
            Some(credentials) => StaticIdentityProvider::signed_in(
                AuthUser {
                    uid: credentials.uid.clone(),
                    email: credentials.email.clone(),
                },
                credentials.token.clone(),
            ),
            None => {
                warn!("No AUTH_UID/AUTH_TOKEN configured, running signed out");
                StaticIdentityProvider::signed_out()
            }
        });

        let http = build_http_client(config.billing_api.timeout)?;
        let endpoints = BillingEndpoints::from_base(&config.billing_api.base_url)?;
        let direct: Arc<dyn DirectVerifier> = Arc::new(DirectVerificationClient::new(
            http.clone(),
            endpoints.verify_session.clone(),
        ));
        let gateway: Arc<dyn BillingGateway> =
            Arc::new(BillingHttpClient::new(http, endpoints, Arc::clone(&identity)));

        let store = Arc::new(SubscriptionStore::new(Arc::clone(&gateway)));
        let auth_recovery = Arc::new(AuthRecoveryCache::new(
            Arc::clone(&storage),
            Arc::clone(&identity),
            config.auth_recovery,
        ));
        let sessions = Arc::new(SessionIdResolver::new(storage));

        Ok(Self {
            checkout: CheckoutInitiator::new(
                Arc::clone(&gateway),
                identity,
                Arc::clone(&auth_recovery),
                Arc::clone(&sessions),
                config.plans.clone(),
                config.app.base_url.clone(),
            ),
            reconciler: VerificationReconciler::new(
                Arc::clone(&store),
                Arc::clone(&gateway),
                direct,
                auth_recovery,
                sessions,
                config.verification,
            ),
            cancellation: CancellationCoordinator::new(Arc::clone(&store), gateway),
            poller: PollingSynchronizer::new(Arc::clone(&store), config.polling),
            store,
        })
    }

    pub async fn execute(&self, command: Command) -> Result<()> {
        match command {
            Command::Checkout { price_id } => {
                let redirect = self.checkout.start_checkout(&price_id).await?;
                println!("{redirect}");
            }
            Command::Reconcile { return_url } => {
                let outcome = self.reconciler.reconcile_return(&return_url).await?;
                println!(
                    "verified by {} after {} network calls, plan {}",
                    outcome.verified_by,
                    outcome.network_calls,
                    outcome
                        .plan
                        .map(|plan| plan.as_str())
                        .unwrap_or("unknown")
                );
            }
            Command::Cancel => {
                let outcome = self.cancellation.cancel().await?;
                println!("{}: {}", outcome.status, outcome.message);
            }
            Command::Status => {
                let record = self.store.fetch().await?;
                println!("{}", serde_json::to_string_pretty(&record)?);
                println!("remaining usage: {}", record.remaining_usage());
            }
            Command::Watch { after_checkout } => self.watch(after_checkout).await?,
        }
        Ok(())
    }

    /// Polls until Ctrl-C, printing every change the store publishes.
    async fn watch(&self, after_checkout: bool) -> Result<()> {
        let mut updates = self.store.subscribe();
        let handle = self.poller.start();
        if after_checkout {
            handle.on_checkout_return();
        }
        info!(cadence = %handle.cadence(), "Watching subscription, press Ctrl-C to stop");

        loop {
            tokio::select! {
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = updates.borrow_and_update().clone();
                    if let Some(record) = state.record {
                        println!("{}", serde_json::to_string(&record)?);
                    }
                }
                signal = tokio::signal::ctrl_c() => {
                    signal.context("failed to listen for ctrl-c")?;
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        handle.stop().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Command, clap::Error> {
        Cli::try_parse_from(std::iter::once("subscription-sync").chain(args.iter().copied()))
            .map(|cli| cli.command)
    }

    #[test]
    fn parses_every_command() {
        assert_eq!(
            parse(&["checkout", "price_t2"]).unwrap(),
            Command::Checkout {
                price_id: "price_t2".to_string()
            }
        );
        assert_eq!(
            parse(&["reconcile", "https://app.example.com/checkout/success?session_id=cs_1"])
                .unwrap(),
            Command::Reconcile {
                return_url: Url::parse("https://app.example.com/checkout/success?session_id=cs_1")
                    .unwrap()
            }
        );
        assert_eq!(parse(&["cancel"]).unwrap(), Command::Cancel);
        assert_eq!(parse(&["status"]).unwrap(), Command::Status);
        assert_eq!(
            parse(&["watch"]).unwrap(),
            Command::Watch {
                after_checkout: false
            }
        );
        assert_eq!(
            parse(&["watch", "--after-checkout"]).unwrap(),
            Command::Watch {
                after_checkout: true
            }
        );
    }

    #[test]
    fn rejects_missing_and_extra_arguments() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["checkout"]).is_err());
        assert!(parse(&["reconcile", "not a url"]).is_err());
        assert!(parse(&["status", "now"]).is_err());
        assert!(parse(&["watch", "--fast"]).is_err());
        assert!(parse(&["refund"]).is_err());
    }

    #[test]
    fn command_tree_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
