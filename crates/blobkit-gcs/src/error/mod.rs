//! Transport-level errors of the HTTP exchange pipeline.
//!
//! [`ExchangeError`] is what the retry engine classifies. It is converted
//! into a [`BlobError`] only at the `BlobStore` boundary.

use std::fmt;
use std::sync::Arc;

use blobkit_core::error::BlobError;
use blobkit_core::retry::RetryError;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Response, StatusCode};
use thiserror::Error;

/// Longest response body excerpt rendered in error messages
const BODY_EXCERPT_LEN: usize = 512;

/// A non-2xx HTTP response
#[derive(Debug, Clone)]
pub struct ResponseError {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}", self.status)?;
        if !self.body.is_empty() {
            let body = String::from_utf8_lossy(&self.body);
            let excerpt: String = body.chars().take(BODY_EXCERPT_LEN).collect();
            write!(f, ": {}", excerpt.trim())?;
        }
        Ok(())
    }
}

impl std::error::Error for ResponseError {}

/// Failure of one HTTP exchange
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("HTTP request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("{0}")]
    Response(#[source] ResponseError),

    #[error("Retries exhausted: {attempts}/{max_attempts}")]
    RetriesExhausted {
        attempts: u32,
        max_attempts: u32,
        #[source]
        last: Box<ExchangeError>,
    },

    #[error("Malformed response: {message}")]
    Decode {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Failed to obtain an access token: {0}")]
    Authorization(#[source] Arc<ExchangeError>),

    #[error("Failed to sign token assertion: {0}")]
    Signing(String),

    #[error("Request body was already consumed by a previous attempt")]
    BodyConsumed,
}

impl ExchangeError {
    /// HTTP status of the failed response, if the server answered
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ExchangeError::Response(response) => Some(response.status),
            _ => None,
        }
    }

    /// Convert into the blob store taxonomy for an operation on `path`
    pub fn into_blob_error(self, path: &str, action: &str) -> BlobError {
        if self.status() == Some(StatusCode::NOT_FOUND) {
            return BlobError::NotFound {
                path: path.to_string(),
                source: Some(Box::new(self)),
            };
        }
        BlobError::general(format!("Failed to {} {}: {}", action, path, self), self)
    }
}

impl From<RetryError<ExchangeError>> for ExchangeError {
    fn from(error: RetryError<ExchangeError>) -> Self {
        match error {
            RetryError::Permanent(error) => error,
            RetryError::Exhausted {
                attempts,
                max_attempts,
                last,
            } => ExchangeError::RetriesExhausted {
                attempts,
                max_attempts,
                last: Box::new(last),
            },
        }
    }
}

/// Retry predicate of the storage exchanges: server errors and failed connections
pub fn is_retryable(error: &ExchangeError) -> bool {
    match error {
        ExchangeError::Response(response) => response.status.is_server_error(),
        ExchangeError::Transport(error) => error.is_connect() || error.is_timeout(),
        _ => false,
    }
}

/// Retry predicate of the token exchanges, which also retry 403
pub fn is_retryable_token_error(error: &ExchangeError) -> bool {
    is_retryable(error) || error.status() == Some(StatusCode::FORBIDDEN)
}

/// Pass 2xx and 304 responses through; turn anything else into a [`ResponseError`]
pub async fn check_status(response: Response) -> Result<Response, ExchangeError> {
    let status = response.status();
    if status.is_success() || status == StatusCode::NOT_MODIFIED {
        return Ok(response);
    }

    let headers = response.headers().clone();
    let body = response.bytes().await.unwrap_or_default();
    Err(ExchangeError::Response(ResponseError {
        status,
        headers,
        body,
    }))
}
