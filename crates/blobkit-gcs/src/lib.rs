//! Google Cloud Storage backend for blobkit
//!
//! This crate maps the `BlobStore` operations onto the GCS JSON API and
//! provides the OAuth2 access-token managers (service account and
//! authorized user) that authorize those requests. Every exchange is
//! authorized, then retried with exponential backoff and jitter on server
//! errors.

pub mod api;
pub mod auth;
pub mod client;
pub mod error;

// Re-export main types
pub use auth::{AccessToken, AccessTokenManager, CachingTokenManager, Credentials};
pub use client::{GcsBlobStore, GcsBlobStoreBuilder, DEFAULT_BASE_URL};
pub use error::{ExchangeError, ResponseError};
