use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};
use url::Url;

use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::repositories::{
    billing_gateway::{BillingGateway, DirectVerifier},
    identity_provider::IdentityProvider,
};
use crate::domain::value_objects::{
    checkout::{CreateCheckoutRequest, CreateCheckoutResponse},
    subscriptions::{CancelSubscriptionResponse, SubscriptionResponse},
    verification::{VerifySessionRequest, VerifySessionResponse},
};

/// Resolved endpoint URLs of the billing API.
#[derive(Debug, Clone)]
pub struct BillingEndpoints {
    pub create_checkout_session: Url,
    pub verify_session: Url,
    pub subscription: Url,
    pub cancel_subscription: Url,
}

impl BillingEndpoints {
    pub fn from_base(base_url: &Url) -> anyhow::Result<Self> {
        // `Url::join` drops the last path segment unless the base ends with a slash.
        let mut base = base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            create_checkout_session: base
                .join("create-checkout-session")
                .context("invalid checkout endpoint")?,
            verify_session: base.join("verify-session").context("invalid verify endpoint")?,
            subscription: base.join("subscription").context("invalid subscription endpoint")?,
            cancel_subscription: base
                .join("cancel-subscription")
                .context("invalid cancel endpoint")?,
        })
    }
}

pub fn build_http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("failed to build http client")
}

/// The wrapped client: every call asks the identity provider for a token first.
pub struct BillingHttpClient {
    http: reqwest::Client,
    endpoints: BillingEndpoints,
    identity: Arc<dyn IdentityProvider>,
}

impl BillingHttpClient {
    pub fn new(
        http: reqwest::Client,
        endpoints: BillingEndpoints,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            http,
            endpoints,
            identity,
        }
    }

    async fn bearer(&self) -> SyncResult<String> {
        self.identity.id_token(false).await
    }
}

#[async_trait]
impl BillingGateway for BillingHttpClient {
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> SyncResult<CreateCheckoutResponse> {
        let token = self.bearer().await?;
        let resp = self
            .http
            .post(self.endpoints.create_checkout_session.clone())
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(ACCEPT, "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|err| transport_error(err, "create checkout session"))?;
        decode_response(resp, "create checkout session").await
    }

    async fn fetch_subscription(&self) -> SyncResult<SubscriptionResponse> {
        let token = self.bearer().await?;
        let resp = self
            .http
            .get(self.endpoints.subscription.clone())
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| transport_error(err, "fetch subscription"))?;
        decode_response(resp, "fetch subscription").await
    }

    async fn verify_session(&self, session_id: &str) -> SyncResult<VerifySessionResponse> {
        let token = self.bearer().await?;
        post_verify(&self.http, &self.endpoints.verify_session, session_id, &token).await
    }

    async fn cancel_subscription(&self) -> SyncResult<CancelSubscriptionResponse> {
        let token = self.bearer().await?;
        let resp = self
            .http
            .post(self.endpoints.cancel_subscription.clone())
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| transport_error(err, "cancel subscription"))?;
        decode_response(resp, "cancel subscription").await
    }
}

/// Plain HTTP verification with a caller-supplied bearer token.
pub struct DirectVerificationClient {
    http: reqwest::Client,
    verify_url: Url,
}

impl DirectVerificationClient {
    pub fn new(http: reqwest::Client, verify_url: Url) -> Self {
        Self { http, verify_url }
    }
}

#[async_trait]
impl DirectVerifier for DirectVerificationClient {
    async fn verify_session_with_token(
        &self,
        session_id: &str,
        bearer_token: &str,
    ) -> SyncResult<VerifySessionResponse> {
        post_verify(&self.http, &self.verify_url, session_id, bearer_token).await
    }
}

async fn post_verify(
    http: &reqwest::Client,
    url: &Url,
    session_id: &str,
    token: &str,
) -> SyncResult<VerifySessionResponse> {
    let body = VerifySessionRequest {
        session_id: session_id.to_string(),
    };
    let resp = http
        .post(url.clone())
        .header(AUTHORIZATION, format!("Bearer {}", token))
        .header(ACCEPT, "application/json")
        .json(&body)
        .send()
        .await
        .map_err(|err| transport_error(err, "verify session"))?;
    decode_response(resp, "verify session").await
}

fn transport_error(err: reqwest::Error, context: &'static str) -> SyncError {
    warn!(
        error = %err,
        timeout = err.is_timeout(),
        connect = err.is_connect(),
        context,
        "billing api transport failure"
    );
    SyncError::Network(anyhow::Error::new(err).context(context))
}

/// 401/403 become `Authentication`. Any other status is decoded as `T` when the
/// body allows it (error envelopes carry `status: "error"`), otherwise `Network`.
async fn decode_response<T: DeserializeOwned>(
    resp: reqwest::Response,
    context: &'static str,
) -> SyncResult<T> {
    let status = resp.status();

    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        warn!(status = %status, context, "billing api rejected credentials");
        return Err(SyncError::Authentication(format!(
            "{context} returned {status}"
        )));
    }

    let body = resp
        .text()
        .await
        .map_err(|err| SyncError::Network(anyhow::Error::new(err).context(context)))?;

    match serde_json::from_str::<T>(&body) {
        Ok(parsed) => {
            debug!(status = %status, context, "billing api response decoded");
            Ok(parsed)
        }
        Err(parse_err) if status.is_success() => {
            error!(
                status = %status,
                error = %parse_err,
                response_body = %body,
                context,
                "billing api returned an undecodable body"
            );
            Err(SyncError::InvalidResponse(format!("{context}: {parse_err}")))
        }
        Err(_) => {
            let body = if body.is_empty() {
                "<empty response body>".to_string()
            } else {
                body
            };
            error!(
                status = %status,
                response_body = %body,
                context,
                "billing api request failed"
            );
            Err(SyncError::Network(anyhow!(
                "{} failed with status {}",
                context,
                status
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_join_under_base_path() {
        let base = Url::parse("https://app.example.com/api/stripe").unwrap();
        let endpoints = BillingEndpoints::from_base(&base).unwrap();
        assert_eq!(
            endpoints.verify_session.as_str(),
            "https://app.example.com/api/stripe/verify-session"
        );
        assert_eq!(
            endpoints.subscription.as_str(),
            "https://app.example.com/api/stripe/subscription"
        );
    }

    #[test]
    fn endpoints_accept_trailing_slash() {
        let base = Url::parse("https://app.example.com/api/").unwrap();
        let endpoints = BillingEndpoints::from_base(&base).unwrap();
        assert_eq!(
            endpoints.cancel_subscription.as_str(),
            "https://app.example.com/api/cancel-subscription"
        );
    }
}
