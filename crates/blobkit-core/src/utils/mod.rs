//! Utility functions and helpers.
//!
//! Common functionality used across multiple blobkit crates.

pub mod clock;
pub mod path;

// Re-export commonly used utilities
pub use clock::{Clock, ManualClock, SystemClock};
pub use path::{is_safe_path, normalize_path, object_name, validate_blob_path};
