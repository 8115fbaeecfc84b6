//! Google credentials: service accounts and authorized users.
//!
//! Credentials are read from the JSON files Google tools produce. The `type`
//! field selects the shape; every missing required field is reported in a
//! single error.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use blobkit_core::error::{BlobError, BlobResult};
use camino::Utf8Path;
use ring::rand::SystemRandom;
use ring::signature::{RsaKeyPair, RSA_PKCS1_SHA256};
use rustls_pemfile::Item;
use serde::Deserialize;
use url::Url;

/// Token endpoint used when the credentials do not name one
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const SERVICE_ACCOUNT: &str = "service_account";
const AUTHORIZED_USER: &str = "authorized_user";

/// Credentials of either kind
#[derive(Debug, Clone)]
pub enum Credentials {
    ServiceAccount(ServiceAccountCredentials),
    AuthorizedUser(AuthorizedUserCredentials),
}

impl Credentials {
    /// Decode a credentials JSON document
    pub fn from_json(json: &str) -> BlobResult<Self> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| BlobError::general("Credentials are not valid JSON", e))?;

        let kind = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| BlobError::MissingFields {
                subject: "credentials".to_string(),
                fields: vec!["type".to_string()],
            })?;

        match kind {
            SERVICE_ACCOUNT => {
                let builder: ServiceAccountBuilder = serde_json::from_value(value)
                    .map_err(|e| BlobError::general("Malformed service account credentials", e))?;
                builder.build().map(Credentials::ServiceAccount)
            },
            AUTHORIZED_USER => {
                let builder: AuthorizedUserBuilder = serde_json::from_value(value)
                    .map_err(|e| BlobError::general("Malformed authorized user credentials", e))?;
                builder.build().map(Credentials::AuthorizedUser)
            },
            other => Err(BlobError::ConfigValidation {
                field: "type".to_string(),
                reason: format!(
                    "unknown credentials type '{}' (expected {} or {})",
                    other, SERVICE_ACCOUNT, AUTHORIZED_USER
                ),
            }),
        }
    }

    /// Read and decode a credentials JSON file
    pub fn from_file(path: &Utf8Path) -> BlobResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            BlobError::general(format!("Failed to read credentials file {}", path), e)
        })?;
        Self::from_json(&json)
    }

    pub fn token_uri(&self) -> &Url {
        match self {
            Credentials::ServiceAccount(credentials) => credentials.token_uri(),
            Credentials::AuthorizedUser(credentials) => credentials.token_uri(),
        }
    }
}

/// RSA key used to sign service account assertions
#[derive(Clone)]
pub struct PrivateKey(Arc<RsaKeyPair>);

impl PrivateKey {
    /// Parse a PEM `PRIVATE KEY` (PKCS#8) or `RSA PRIVATE KEY` (PKCS#1)
    pub fn from_pem(pem: &str) -> BlobResult<Self> {
        let key = match read_private_key(pem)? {
            PemKey::Pkcs8(der) => RsaKeyPair::from_pkcs8(&der),
            PemKey::Pkcs1(der) => RsaKeyPair::from_der(&der),
        }
        .map_err(|e| BlobError::invalid_argument(format!("Invalid private key: {}", e)))?;
        Ok(Self(Arc::new(key)))
    }

    /// RSASSA-PKCS1-v1_5 signature over SHA-256
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, ring::error::Unspecified> {
        let rng = SystemRandom::new();
        let mut signature = vec![0; self.0.public().modulus_len()];
        self.0.sign(&RSA_PKCS1_SHA256, &rng, message, &mut signature)?;
        Ok(signature)
    }

    /// DER-encoded `RSAPublicKey`
    pub fn public_key_der(&self) -> &[u8] {
        self.0.public().as_ref()
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

enum PemKey {
    Pkcs8(Vec<u8>),
    Pkcs1(Vec<u8>),
}

/// First RSA private key in a PEM document; other sections are skipped
fn read_private_key(pem: &str) -> BlobResult<PemKey> {
    let mut reader = pem.as_bytes();

    loop {
        let item = rustls_pemfile::read_one(&mut reader)
            .map_err(|e| BlobError::invalid_argument(format!("Private key is not PEM encoded: {}", e)))?;
        match item {
            Some(Item::Pkcs8Key(key)) => return Ok(PemKey::Pkcs8(key.secret_pkcs8_der().to_vec())),
            Some(Item::Pkcs1Key(key)) => return Ok(PemKey::Pkcs1(key.secret_pkcs1_der().to_vec())),
            Some(Item::Sec1Key(_)) => {
                return Err(BlobError::invalid_argument(
                    "Unsupported private key type EC PRIVATE KEY (expected PRIVATE KEY or RSA PRIVATE KEY)",
                ))
            },
            Some(_) => {},
            None => break,
        }
    }
    Err(BlobError::invalid_argument("No RSA private key found in PEM data"))
}

fn parse_token_uri(token_uri: Option<String>) -> BlobResult<Url> {
    let token_uri = token_uri.unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string());
    Url::parse(&token_uri).map_err(|e| BlobError::ConfigValidation {
        field: "token_uri".to_string(),
        reason: format!("'{}' is not a valid URL: {}", token_uri, e),
    })
}

fn require(missing: &mut Vec<String>, field: &str, value: Option<String>) -> String {
    match value {
        Some(value) => value,
        None => {
            missing.push(field.to_string());
            String::new()
        },
    }
}

/// Service account key
#[derive(Clone)]
pub struct ServiceAccountCredentials {
    token_uri: Url,
    client_id: String,
    client_email: String,
    private_key_id: String,
    private_key: PrivateKey,
    scopes: BTreeSet<String>,
}

impl ServiceAccountCredentials {
    pub fn builder() -> ServiceAccountBuilder {
        ServiceAccountBuilder::default()
    }

    /// Add scopes to the ones already requested
    pub fn with_scopes<I, T>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.scopes.extend(scopes.into_iter().map(Into::into));
        self
    }

    pub fn token_uri(&self) -> &Url {
        &self.token_uri
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    pub fn private_key_id(&self) -> &str {
        &self.private_key_id
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    pub fn scopes(&self) -> &BTreeSet<String> {
        &self.scopes
    }
}

impl fmt::Debug for ServiceAccountCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountCredentials")
            .field("token_uri", &self.token_uri.as_str())
            .field("client_id", &self.client_id)
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &self.private_key)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Collects service account fields; [`ServiceAccountBuilder::build`] checks them all at once
#[derive(Debug, Default, Deserialize)]
pub struct ServiceAccountBuilder {
    token_uri: Option<String>,
    client_id: Option<String>,
    client_email: Option<String>,
    private_key_id: Option<String>,
    private_key: Option<String>,
    #[serde(default)]
    scopes: BTreeSet<String>,
}

impl ServiceAccountBuilder {
    pub fn token_uri(mut self, token_uri: impl Into<String>) -> Self {
        self.token_uri = Some(token_uri.into());
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn client_email(mut self, client_email: impl Into<String>) -> Self {
        self.client_email = Some(client_email.into());
        self
    }

    pub fn private_key_id(mut self, private_key_id: impl Into<String>) -> Self {
        self.private_key_id = Some(private_key_id.into());
        self
    }

    /// PEM-encoded RSA private key
    pub fn private_key(mut self, pem: impl Into<String>) -> Self {
        self.private_key = Some(pem.into());
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.insert(scope.into());
        self
    }

    pub fn build(self) -> BlobResult<ServiceAccountCredentials> {
        let mut missing = Vec::new();
        let client_id = require(&mut missing, "client_id", self.client_id);
        let client_email = require(&mut missing, "client_email", self.client_email);
        let private_key_id = require(&mut missing, "private_key_id", self.private_key_id);
        let private_key = require(&mut missing, "private_key", self.private_key);
        if !missing.is_empty() {
            return Err(BlobError::MissingFields {
                subject: "service account credentials".to_string(),
                fields: missing,
            });
        }

        Ok(ServiceAccountCredentials {
            token_uri: parse_token_uri(self.token_uri)?,
            client_id,
            client_email,
            private_key_id,
            private_key: PrivateKey::from_pem(&private_key)?,
            scopes: self.scopes,
        })
    }
}

/// OAuth2 client plus the refresh token of a user who authorized it
#[derive(Clone)]
pub struct AuthorizedUserCredentials {
    token_uri: Url,
    client_id: String,
    client_secret: String,
    refresh_token: String,
}

impl AuthorizedUserCredentials {
    pub fn builder() -> AuthorizedUserBuilder {
        AuthorizedUserBuilder::default()
    }

    pub fn token_uri(&self) -> &Url {
        &self.token_uri
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }
}

impl fmt::Debug for AuthorizedUserCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizedUserCredentials")
            .field("token_uri", &self.token_uri.as_str())
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AuthorizedUserBuilder {
    token_uri: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    refresh_token: Option<String>,
}

impl AuthorizedUserBuilder {
    pub fn token_uri(mut self, token_uri: impl Into<String>) -> Self {
        self.token_uri = Some(token_uri.into());
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    pub fn refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn build(self) -> BlobResult<AuthorizedUserCredentials> {
        let mut missing = Vec::new();
        let client_id = require(&mut missing, "client_id", self.client_id);
        let client_secret = require(&mut missing, "client_secret", self.client_secret);
        let refresh_token = require(&mut missing, "refresh_token", self.refresh_token);
        if !missing.is_empty() {
            return Err(BlobError::MissingFields {
                subject: "authorized user credentials".to_string(),
                fields: missing,
            });
        }

        Ok(AuthorizedUserCredentials {
            token_uri: parse_token_uri(self.token_uri)?,
            client_id,
            client_secret,
            refresh_token,
        })
    }
}
