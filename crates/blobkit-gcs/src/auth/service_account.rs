//! Service account tokens via the JWT bearer grant

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccessToken, PrivateKey, ServiceAccountCredentials, TokenEndpoint, TokenSource};
use crate::error::ExchangeError;

pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime of a signed assertion, independent of the token it buys
pub const ASSERTION_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
    pub kid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl JwtClaims {
    pub fn new(credentials: &ServiceAccountCredentials, now: DateTime<Utc>) -> Self {
        let scopes: Vec<&str> = credentials.scopes().iter().map(String::as_str).collect();
        let issued_at = now.timestamp();
        Self {
            iss: credentials.client_email().to_string(),
            scope: scopes.join(" "),
            aud: credentials.token_uri().as_str().to_string(),
            iat: issued_at,
            exp: issued_at + ASSERTION_LIFETIME_SECS,
        }
    }
}

/// Sign `header.claims` with RS256 and return the compact JWT
pub fn sign_jwt(key: &PrivateKey, header: &JwtHeader, claims: &JwtClaims) -> Result<String, ExchangeError> {
    let header = serde_json::to_vec(header).map_err(|e| ExchangeError::Signing(e.to_string()))?;
    let claims = serde_json::to_vec(claims).map_err(|e| ExchangeError::Signing(e.to_string()))?;

    let mut jwt = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header),
        URL_SAFE_NO_PAD.encode(claims)
    );
    let signature = key
        .sign(jwt.as_bytes())
        .map_err(|_| ExchangeError::Signing("RSA signing failed".to_string()))?;
    jwt.push('.');
    jwt.push_str(&URL_SAFE_NO_PAD.encode(signature));
    Ok(jwt)
}

pub struct ServiceAccountTokenSource {
    credentials: ServiceAccountCredentials,
    endpoint: TokenEndpoint,
}

impl ServiceAccountTokenSource {
    pub fn new(credentials: ServiceAccountCredentials, endpoint: TokenEndpoint) -> Self {
        Self {
            credentials,
            endpoint,
        }
    }

    pub fn credentials(&self) -> &ServiceAccountCredentials {
        &self.credentials
    }

    /// Build a signed assertion; signing runs on the blocking pool
    pub async fn assertion(&self) -> Result<String, ExchangeError> {
        let header = JwtHeader {
            alg: "RS256".to_string(),
            typ: "JWT".to_string(),
            kid: self.credentials.private_key_id().to_string(),
        };
        let claims = JwtClaims::new(&self.credentials, self.endpoint.clock().now());
        let key = self.credentials.private_key().clone();

        tokio::task::spawn_blocking(move || sign_jwt(&key, &header, &claims))
            .await
            .map_err(|e| ExchangeError::Signing(e.to_string()))?
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn fetch_token(&self) -> Result<AccessToken, ExchangeError> {
        let assertion = self.assertion().await?;
        self.endpoint
            .request_token(
                self.credentials.token_uri(),
                &[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())],
            )
            .await
    }
}
