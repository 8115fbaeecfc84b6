//! Authorized user tokens via the refresh token grant

use async_trait::async_trait;

use super::{AccessToken, AuthorizedUserCredentials, TokenEndpoint, TokenSource};
use crate::error::ExchangeError;

pub struct AuthorizedUserTokenSource {
    credentials: AuthorizedUserCredentials,
    endpoint: TokenEndpoint,
}

impl AuthorizedUserTokenSource {
    pub fn new(credentials: AuthorizedUserCredentials, endpoint: TokenEndpoint) -> Self {
        Self {
            credentials,
            endpoint,
        }
    }

    pub fn credentials(&self) -> &AuthorizedUserCredentials {
        &self.credentials
    }
}

#[async_trait]
impl TokenSource for AuthorizedUserTokenSource {
    async fn fetch_token(&self) -> Result<AccessToken, ExchangeError> {
        let credentials = &self.credentials;
        self.endpoint
            .request_token(
                credentials.token_uri(),
                &[
                    ("client_id", credentials.client_id()),
                    ("client_secret", credentials.client_secret()),
                    ("refresh_token", credentials.refresh_token()),
                    ("grant_type", "refresh_token"),
                ],
            )
            .await
    }
}
