//! # blobkit-core
//!
//! Core types and utilities shared across all blobkit crates.
//!
//! This crate provides:
//! - The `BlobStore` contract with its derived operations (conditional
//!   retrieval, delete-if-exists)
//! - `BlobMetadata`, `Blob`, `BlobInput` and `ContentType` value types
//! - `BlobError` enum for unified error handling
//! - The retry engine and backoff strategies used by remote backends
//! - Clock and path utilities
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `types`: Core data types (BlobMetadata, Blob, BlobInput, ContentType)
//! - `store`: The BlobStore trait and its default behaviors
//! - `retry`: Retry engine and backoff strategies
//! - `error`: Error types and result aliases
//! - `utils`: Clock and path helpers

pub mod error;
pub mod retry;
pub mod store;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use error::{BlobError, BlobResult};
pub use retry::{BackOff, RetryDecision, RetryError, RetryPolicy};
pub use store::{BlobStore, Preconditions};
pub use types::{Blob, BlobBody, BlobInput, BlobMetadata, ByteStream, ContentType, StoreId};
pub use utils::{Clock, ManualClock, SystemClock};
