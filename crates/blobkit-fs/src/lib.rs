//! Filesystem blob store for blobkit
//!
//! Blobs live under a base directory as a data file plus a `.metadata`
//! sidecar. Writes stream through a digest-computing writer into a temp file
//! inside `<base>/.tmp` and are committed with atomic renames, so a failed
//! write never leaves a partial blob behind.

pub mod digest;
pub mod sidecar;
pub mod store;
pub mod writer;

// Re-export main types
pub use digest::{DigestAlgorithm, Digester};
pub use sidecar::Sidecar;
pub use store::{FileSystemBlobStore, FileSystemOptions};
pub use writer::{DigestOutput, DigestWriter};
