//! Digest algorithms used to compute blob etags
//!
//! The etag of a stored blob is the base64 encoding of the digest of its
//! bytes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use blobkit_core::error::{BlobError, BlobResult};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DigestAlgorithm {
    #[default]
    Sha1,
    Sha256,
}

impl DigestAlgorithm {
    /// Canonical algorithm name, as written in configuration
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "SHA-1",
            DigestAlgorithm::Sha256 => "SHA-256",
        }
    }

    pub fn digester(&self) -> Digester {
        Digester::new(*self)
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = BlobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SHA-1" | "SHA1" => Ok(DigestAlgorithm::Sha1),
            "SHA-256" | "SHA256" => Ok(DigestAlgorithm::Sha256),
            _ => Err(BlobError::invalid_argument(format!(
                "Unsupported digest algorithm '{}' (expected SHA-1 or SHA-256)",
                s
            ))),
        }
    }
}

/// Incremental digest state
#[derive(Clone)]
pub enum Digester {
    Sha1(Sha1),
    Sha256(Sha256),
}

impl Digester {
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Sha1 => Digester::Sha1(Sha1::new()),
            DigestAlgorithm::Sha256 => Digester::Sha256(Sha256::new()),
        }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        match self {
            Digester::Sha1(_) => DigestAlgorithm::Sha1,
            Digester::Sha256(_) => DigestAlgorithm::Sha256,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Digester::Sha1(hasher) => hasher.update(data),
            Digester::Sha256(hasher) => hasher.update(data),
        }
    }

    /// Finish and return the raw digest bytes
    pub fn finalize(self) -> Vec<u8> {
        match self {
            Digester::Sha1(hasher) => hasher.finalize().to_vec(),
            Digester::Sha256(hasher) => hasher.finalize().to_vec(),
        }
    }

    /// Finish and return the digest as a base64 etag
    pub fn finalize_etag(self) -> String {
        STANDARD.encode(self.finalize())
    }
}

impl fmt::Debug for Digester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Digester").field(&self.algorithm()).finish()
    }
}

/// Compute the etag of an in-memory buffer
pub fn compute_etag(algorithm: DigestAlgorithm, content: &[u8]) -> String {
    let mut digester = algorithm.digester();
    digester.update(content);
    digester.finalize_etag()
}

/// Parse a configured algorithm name, reporting it against `field`
pub fn parse_algorithm(field: &str, value: &str) -> BlobResult<DigestAlgorithm> {
    value.parse().map_err(|_| BlobError::ConfigValidation {
        field: field.to_string(),
        reason: format!("unsupported digest algorithm '{}' (expected SHA-1 or SHA-256)", value),
    })
}
