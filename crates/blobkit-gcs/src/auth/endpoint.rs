//! OAuth2 token endpoint exchange

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use blobkit_core::retry::backoff::DEFAULT_JITTER_FACTOR;
use blobkit_core::retry::{BackOff, ExponentialBackOff, RetryPolicy};
use blobkit_core::utils::Clock;
use chrono::{DateTime, Utc};
use reqwest::header::DATE;
use reqwest::{Client, Response};
use tracing::debug;
use url::Url;

use super::AccessToken;
use crate::api::TokenResponse;
use crate::error::{check_status, is_retryable_token_error, ExchangeError};

/// POSTs form-encoded grants to a token endpoint, with retries
#[derive(Clone)]
pub struct TokenEndpoint {
    client: Client,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy<ExchangeError>,
}

impl TokenEndpoint {
    pub fn new(client: Client, clock: Arc<dyn Clock>, policy: RetryPolicy<ExchangeError>) -> Self {
        Self {
            client,
            clock,
            policy,
        }
    }

    /// Retries 5xx and 403 up to 10 times with jittered exponential backoff
    pub fn default_policy() -> RetryPolicy<ExchangeError> {
        RetryPolicy::new()
            .retry_if(is_retryable_token_error)
            .with_backoff(ExponentialBackOff::default().jitter(DEFAULT_JITTER_FACTOR))
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Exchange a grant for an access token
    pub async fn request_token(
        &self,
        token_uri: &Url,
        form: &[(&str, &str)],
    ) -> Result<AccessToken, ExchangeError> {
        let token = self
            .policy
            .run("token request", || self.send(token_uri, form))
            .await?;
        debug!(token_uri = %token_uri, expiration = %token.expiration(), "Obtained access token");
        Ok(token)
    }

    async fn send(&self, token_uri: &Url, form: &[(&str, &str)]) -> Result<AccessToken, ExchangeError> {
        debug!(token_uri = %token_uri, "POST token request");
        let response = self
            .client
            .post(token_uri.clone())
            .form(form)
            .send()
            .await
            .map_err(ExchangeError::Transport)?;
        let response = check_status(response).await?;

        let issued_at = response_date(&response).unwrap_or_else(|| self.clock.now());
        let body = response.bytes().await.map_err(ExchangeError::Transport)?;
        let token: TokenResponse = serde_json::from_slice(&body).map_err(|e| ExchangeError::Decode {
            message: "token endpoint returned an unexpected body".to_string(),
            source: Some(e),
        })?;

        Ok(AccessToken::new(
            token.access_token,
            Duration::from_secs(token.expires_in),
            issued_at,
        ))
    }
}

impl fmt::Debug for TokenEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenEndpoint")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// The response's own `Date` header, if present and well formed
fn response_date(response: &Response) -> Option<DateTime<Utc>> {
    let value = response.headers().get(DATE)?.to_str().ok()?;
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}
