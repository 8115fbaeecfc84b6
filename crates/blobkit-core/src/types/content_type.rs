//! Content (MIME) type of blob data.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{BlobError, BlobResult};

const WILDCARD: &str = "*";

/// A parsed `type/subtype[;name=value]*` content type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentType {
    main_type: String,
    subtype: String,
    parameters: Vec<(String, String)>,
}

impl ContentType {
    /// `application/octet-stream`, the default for blobs of unknown type
    pub fn octet_stream() -> Self {
        Self::new("application", "octet-stream")
    }

    /// Create a content type without parameters
    pub fn new(main_type: &str, subtype: &str) -> Self {
        Self {
            main_type: main_type.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            parameters: Vec::new(),
        }
    }

    /// Add a parameter such as `charset`
    pub fn with_parameter(mut self, name: &str, value: &str) -> Self {
        self.parameters.push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    /// Parse a content type string
    pub fn parse(value: &str) -> BlobResult<Self> {
        let mut parts = value.split(';');
        let essence = parts.next().unwrap_or_default().trim();

        // A lone "*" is shorthand for "*/*"
        let (main_type, subtype) = if essence == WILDCARD {
            (WILDCARD, WILDCARD)
        } else {
            essence.split_once('/').ok_or_else(|| {
                BlobError::invalid_argument(format!("Content type '{}' does not contain '/'", value))
            })?
        };

        if !is_token(main_type) || !is_token(subtype) {
            return Err(BlobError::invalid_argument(format!(
                "Content type '{}' is malformed",
                value
            )));
        }

        let mut content_type = Self::new(main_type, subtype);
        for parameter in parts {
            let parameter = parameter.trim();
            if parameter.is_empty() {
                continue;
            }
            let (name, param_value) = parameter.split_once('=').ok_or_else(|| {
                BlobError::invalid_argument(format!(
                    "Content type parameter '{}' has no value",
                    parameter
                ))
            })?;
            if !is_token(name.trim()) {
                return Err(BlobError::invalid_argument(format!(
                    "Content type parameter '{}' is malformed",
                    parameter
                )));
            }
            content_type = content_type.with_parameter(name.trim(), param_value.trim());
        }

        Ok(content_type)
    }

    /// The primary type, e.g. `text`
    pub fn main_type(&self) -> &str {
        &self.main_type
    }

    /// The subtype, e.g. `plain`
    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    /// Look up a parameter value by (case-insensitive) name
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// `type/subtype` without parameters
    pub fn essence(&self) -> String {
        format!("{}/{}", self.main_type, self.subtype)
    }

    /// True if neither the type nor the subtype is a wildcard
    pub fn is_concrete(&self) -> bool {
        self.main_type != WILDCARD && self.subtype != WILDCARD && !self.subtype.starts_with("*+")
    }

    /// Fail with `InvalidArgument` if this type contains wildcards
    pub fn ensure_concrete(&self) -> BlobResult<()> {
        if self.is_concrete() {
            Ok(())
        } else {
            Err(BlobError::invalid_argument(format!(
                "Blob content type must not contain wildcards: {}",
                self
            )))
        }
    }
}

/// RFC 7230 token characters
fn is_token(value: &str) -> bool {
    !value.is_empty()
        && value.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}

impl Default for ContentType {
    fn default() -> Self {
        Self::octet_stream()
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.main_type, self.subtype)?;
        for (name, value) in &self.parameters {
            write!(f, ";{}={}", name, value)?;
        }
        Ok(())
    }
}

impl FromStr for ContentType {
    type Err = BlobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ContentType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(serde::de::Error::custom)
    }
}
