//! Core data types for blob storage.
//!
//! This module provides the fundamental types shared by every backend:
//! - Content types with wildcard detection
//! - Blob metadata snapshots and backend identity
//! - Blobs (metadata plus a single-use byte stream) and write inputs

pub mod blob;
pub mod content_type;
pub mod metadata;

// Re-export all public types
pub use blob::{Blob, BlobBody, BlobInput, ByteStream};
pub use content_type::ContentType;
pub use metadata::{BlobMetadata, StoreId};
