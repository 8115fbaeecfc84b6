//! GCS JSON API and OAuth2 token endpoint response types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

/// Fields requested by the metadata GET
pub const OBJECT_FIELDS: &str = "name,size,contentType,etag,updated,mediaLink";

/// Object resource returned by `GET /storage/v1/b/{bucket}/o/{object}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectResource {
    /// Object name within the bucket
    pub name: String,
    /// Data size; the API encodes it as a decimal string
    #[serde(deserialize_with = "size_from_string_or_number")]
    pub size: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    /// Last modification time
    pub updated: Option<DateTime<Utc>>,
    /// Download link for the object data
    pub media_link: Option<String>,
}

/// Response of the OAuth2 token endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Token lifetime in seconds
    pub expires_in: u64,
}

fn size_from_string_or_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Number(u64),
        Text(String),
    }

    match Size::deserialize(deserializer)? {
        Size::Number(size) => Ok(size),
        Size::Text(text) => text.parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_resource_from_api_json() {
        let json = r#"{
            "name": "foo/bar",
            "size": "26",
            "contentType": "text/plain",
            "etag": "CKih16GjycICEAE=",
            "updated": "2019-03-19T15:36:04.295Z",
            "mediaLink": "https://storage.googleapis.com/download/storage/v1/b/bucket/o/foo%2Fbar?alt=media"
        }"#;
        let object: ObjectResource = serde_json::from_str(json).unwrap();
        assert_eq!(object.name, "foo/bar");
        assert_eq!(object.size, 26);
        assert_eq!(object.content_type.as_deref(), Some("text/plain"));
        assert_eq!(
            object.updated.unwrap().to_rfc3339(),
            "2019-03-19T15:36:04.295+00:00"
        );
        assert!(object.media_link.unwrap().ends_with("?alt=media"));
    }

    #[test]
    fn test_numeric_size_and_missing_fields() {
        let object: ObjectResource = serde_json::from_str(r#"{"name": "a", "size": 7}"#).unwrap();
        assert_eq!(object.size, 7);
        assert!(object.etag.is_none());
        assert!(object.media_link.is_none());

        assert!(serde_json::from_str::<ObjectResource>(r#"{"name": "a", "size": "seven"}"#).is_err());
    }

    #[test]
    fn test_token_response_ignores_extra_fields() {
        let token: TokenResponse = serde_json::from_str(
            r#"{"access_token": "ya29.token", "expires_in": 3599, "token_type": "Bearer"}"#,
        )
        .unwrap();
        assert_eq!(token.access_token, "ya29.token");
        assert_eq!(token.expires_in, 3599);
    }
}
