//! OAuth2 access tokens for the GCS backend.
//!
//! A [`TokenSource`] knows how to fetch a fresh token for one kind of
//! credentials. [`CachingTokenManager`] wraps a source with a single-flight
//! cache: concurrent callers share one outstanding fetch, and a cached token
//! is handed out until its lifetime elapses.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use blobkit_core::utils::Clock;
use chrono::{DateTime, Utc};

use crate::error::ExchangeError;

pub mod authorized_user;
pub mod cache;
pub mod credentials;
pub mod endpoint;
pub mod service_account;

pub use authorized_user::AuthorizedUserTokenSource;
pub use cache::CachingTokenManager;
pub use credentials::{
    AuthorizedUserCredentials, Credentials, PrivateKey, ServiceAccountCredentials,
    DEFAULT_TOKEN_URI,
};
pub use endpoint::TokenEndpoint;
pub use service_account::ServiceAccountTokenSource;

/// An OAuth2 bearer token
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    encoded_token: String,
    expires_in: Duration,
    expiration: DateTime<Utc>,
}

impl AccessToken {
    /// Token issued at `issued_at`, valid for `expires_in`
    pub fn new(encoded_token: impl Into<String>, expires_in: Duration, issued_at: DateTime<Utc>) -> Self {
        Self {
            encoded_token: encoded_token.into(),
            expires_in,
            expiration: expiry_after(issued_at, expires_in),
        }
    }

    pub fn encoded_token(&self) -> &str {
        &self.encoded_token
    }

    pub fn expires_in(&self) -> Duration {
        self.expires_in
    }

    /// When the issuer considers the token expired
    pub fn expiration(&self) -> DateTime<Utc> {
        self.expiration
    }

    /// Value of the `Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.encoded_token)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("encoded_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// `start + lifetime`, saturating at the latest representable instant
pub(crate) fn expiry_after(start: DateTime<Utc>, lifetime: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(lifetime)
        .ok()
        .and_then(|lifetime| start.checked_add_signed(lifetime))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Fetches a fresh access token for one kind of credentials
#[async_trait]
pub trait TokenSource: Send + Sync + 'static {
    async fn fetch_token(&self) -> Result<AccessToken, ExchangeError>;
}

/// Hands out access tokens to the request pipeline
#[async_trait]
pub trait AccessTokenManager: Send + Sync {
    async fn access_token(&self) -> Result<AccessToken, ExchangeError>;
}

/// Build the caching token manager matching the credential kind
pub fn token_manager(
    credentials: Credentials,
    endpoint: TokenEndpoint,
    clock: Arc<dyn Clock>,
) -> Arc<dyn AccessTokenManager> {
    match credentials {
        Credentials::ServiceAccount(credentials) => Arc::new(CachingTokenManager::new(
            ServiceAccountTokenSource::new(credentials, endpoint),
            clock,
        )),
        Credentials::AuthorizedUser(credentials) => Arc::new(CachingTokenManager::new(
            AuthorizedUserTokenSource::new(credentials, endpoint),
            clock,
        )),
    }
}

#[cfg(test)]
mod tests;
