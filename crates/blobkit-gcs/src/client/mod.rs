//! GCS blob store with connection pooling, authorization and retry logic

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use blobkit_core::error::{BlobError, BlobResult};
use blobkit_core::retry::backoff::DEFAULT_JITTER_FACTOR;
use blobkit_core::retry::{BackOff, ExponentialBackOff, RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use blobkit_core::store::{ensure_owned, BlobStore, Preconditions};
use blobkit_core::types::{Blob, BlobBody, BlobInput, BlobMetadata, ByteStream, ContentType, StoreId};
use blobkit_core::utils::{object_name, validate_blob_path, Clock, SystemClock};
use bytes::Bytes;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt, TryStreamExt};
use parking_lot::Mutex;
use reqwest::header::{
    HeaderMap, HeaderName, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH,
    LAST_MODIFIED,
};
use reqwest::{Body, Client, ClientBuilder, RequestBuilder, Response, StatusCode};
use tracing::{debug, info};
use url::Url;

use crate::api::{ObjectResource, OBJECT_FIELDS};
use crate::auth::{token_manager, AccessTokenManager, Credentials, TokenEndpoint};
use crate::error::{check_status, is_retryable, ExchangeError};

/// Public GCS endpoint
pub const DEFAULT_BASE_URL: &str = "https://storage.googleapis.com";

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Blob store backed by a GCS bucket
pub struct GcsBlobStore {
    id: StoreId,
    bucket: String,
    base_url: Url,
    client: Client,
    token_manager: Option<Arc<dyn AccessTokenManager>>,
    policy: RetryPolicy<ExchangeError>,
}

impl GcsBlobStore {
    pub fn builder() -> GcsBlobStoreBuilder {
        GcsBlobStoreBuilder::default()
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `{base}/{segments...}`, each segment percent-encoded on its own
    fn endpoint_url(&self, segments: &[&str]) -> BlobResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BlobError::invalid_argument(format!("Base URL {} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn object_url(&self, name: &str) -> BlobResult<Url> {
        self.endpoint_url(&["storage", "v1", "b", self.bucket.as_str(), "o", name])
    }

    fn media_url(&self, name: &str) -> BlobResult<Url> {
        let mut url = self.object_url(name)?;
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }

    fn upload_url(&self, name: &str, fail_if_exists: bool) -> BlobResult<Url> {
        let mut url = self.endpoint_url(&["upload", "storage", "v1", "b", self.bucket.as_str(), "o"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("uploadType", "media").append_pair("name", name);
            if fail_if_exists {
                query.append_pair("ifGenerationMatch", "0");
            }
        }
        Ok(url)
    }

    /// Authorize once, then send `request` through the retry policy
    async fn exchange<F>(
        &self,
        description: &str,
        policy: &RetryPolicy<ExchangeError>,
        mut request: F,
    ) -> Result<Response, ExchangeError>
    where
        F: FnMut(&Client) -> Result<RequestBuilder, ExchangeError>,
    {
        let authorization = match &self.token_manager {
            Some(manager) => Some(manager.access_token().await?.bearer()),
            None => None,
        };

        let response = policy
            .run(description, || {
                let request = request(&self.client).map(|builder| match &authorization {
                    Some(bearer) => builder.header(AUTHORIZATION, bearer.as_str()),
                    None => builder,
                });
                async move {
                    let response = request?.send().await.map_err(ExchangeError::Transport)?;
                    debug!(
                        operation = description,
                        url = %response.url(),
                        status = %response.status(),
                        "HTTP exchange"
                    );
                    check_status(response).await
                }
            })
            .await?;
        Ok(response)
    }

    fn metadata_from_object(&self, path: Utf8PathBuf, object: ObjectResource) -> BlobResult<BlobMetadata> {
        let content_type = match object.content_type {
            Some(value) => ContentType::parse(&value)
                .map_err(|e| BlobError::general(format!("Malformed content type for {}", path), e))?,
            None => ContentType::octet_stream(),
        };

        let mut metadata = BlobMetadata::new(self.id.clone(), path, object.size, content_type);
        metadata.etag = object.etag;
        metadata.last_modified = object.updated;
        metadata.location = object.media_link;
        Ok(metadata)
    }

    fn metadata_from_headers(&self, path: Utf8PathBuf, headers: &HeaderMap) -> BlobMetadata {
        let header = |name: HeaderName| headers.get(name).and_then(|value| value.to_str().ok());

        let size = header(CONTENT_LENGTH)
            .and_then(|value| value.parse().ok())
            .unwrap_or(0);
        let content_type = header(CONTENT_TYPE)
            .and_then(|value| ContentType::parse(value).ok())
            .unwrap_or_else(ContentType::octet_stream);

        let mut metadata = BlobMetadata::new(self.id.clone(), path, size, content_type);
        metadata.etag = header(ETAG).map(str::to_string);
        metadata.last_modified = header(LAST_MODIFIED)
            .and_then(|value| DateTime::parse_from_rfc2822(value).ok())
            .map(|value| value.with_timezone(&Utc));
        metadata
    }
}

impl std::fmt::Debug for GcsBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcsBlobStore")
            .field("id", &self.id)
            .field("authorized", &self.token_manager.is_some())
            .finish_non_exhaustive()
    }
}

/// Stream the response body as blob data
fn body_stream(response: Response) -> ByteStream {
    response
        .bytes_stream()
        .map_err(|e| BlobError::general("Failed to read blob data", e))
        .boxed()
}

fn resolve(path: &Utf8Path) -> BlobResult<(Utf8PathBuf, String)> {
    let path = validate_blob_path(path)?;
    let name = object_name(&path);
    Ok((path, name))
}

/// Adapts a blob stream to the `Sync` bound reqwest puts on streamed bodies
struct SyncStream(Mutex<ByteStream>);

impl Stream for SyncStream {
    type Item = BlobResult<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().0.get_mut().poll_next_unpin(cx)
    }
}

/// Request body of an upload, re-created for every attempt
enum UploadBody {
    Bytes(Bytes),
    Stream(Option<ByteStream>),
}

impl UploadBody {
    fn next(&mut self) -> Result<Body, ExchangeError> {
        match self {
            UploadBody::Bytes(bytes) => Ok(Body::from(bytes.clone())),
            UploadBody::Stream(stream) => stream
                .take()
                .map(|stream| Body::wrap_stream(SyncStream(Mutex::new(stream))))
                .ok_or(ExchangeError::BodyConsumed),
        }
    }
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    fn id(&self) -> &StoreId {
        &self.id
    }

    async fn get_metadata(&self, path: &Utf8Path) -> BlobResult<BlobMetadata> {
        let (path, name) = resolve(path)?;
        let mut url = self.object_url(&name)?;
        url.query_pairs_mut().append_pair("fields", OBJECT_FIELDS);

        let response = self
            .exchange("get metadata", &self.policy, |client| Ok(client.get(url.clone())))
            .await
            .map_err(|e| e.into_blob_error(&name, "read metadata of"))?;
        let body = response
            .bytes()
            .await
            .map_err(|e| BlobError::general(format!("Failed to read metadata of {}", name), e))?;
        let object: ObjectResource = serde_json::from_slice(&body)
            .map_err(|e| BlobError::general(format!("Malformed metadata for {}", name), e))?;

        self.metadata_from_object(path, object)
    }

    async fn retrieve(&self, metadata: BlobMetadata) -> BlobResult<Blob> {
        ensure_owned(&self.id, &metadata)?;
        let name = object_name(metadata.path());
        let url = match &metadata.location {
            Some(link) => Url::parse(link)
                .map_err(|e| BlobError::general(format!("Malformed media link for {}", name), e))?,
            None => self.media_url(&name)?,
        };

        let response = self
            .exchange("retrieve", &self.policy, |client| Ok(client.get(url.clone())))
            .await
            .map_err(|e| e.into_blob_error(&name, "retrieve"))?;
        Ok(Blob::new(metadata, body_stream(response)))
    }

    /// Single round trip: the service evaluates the preconditions itself
    async fn retrieve_direct(
        &self,
        path: &Utf8Path,
        preconditions: &Preconditions,
    ) -> BlobResult<Option<Blob>> {
        let (path, name) = resolve(path)?;
        let url = self.media_url(&name)?;
        let if_none_match = (!preconditions.if_none_match.is_empty())
            .then(|| preconditions.if_none_match.join(", "));
        let if_modified_since = preconditions
            .if_modified_since
            .map(|since| since.format(HTTP_DATE_FORMAT).to_string());

        let response = self
            .exchange("retrieve", &self.policy, |client| {
                let mut request = client.get(url.clone());
                if let Some(etags) = &if_none_match {
                    request = request.header(IF_NONE_MATCH, etags.as_str());
                }
                if let Some(since) = &if_modified_since {
                    request = request.header(IF_MODIFIED_SINCE, since.as_str());
                }
                Ok(request)
            })
            .await
            .map_err(|e| e.into_blob_error(&name, "retrieve"))?;

        if response.status() == StatusCode::NOT_MODIFIED {
            debug!(path = %path, "Blob not modified");
            return Ok(None);
        }
        let metadata = self.metadata_from_headers(path, response.headers());
        Ok(Some(Blob::new(metadata, body_stream(response))))
    }

    async fn store(&self, path: &Utf8Path, input: BlobInput, fail_if_exists: bool) -> BlobResult<()> {
        input.content_type().ensure_concrete()?;
        let (_, name) = resolve(path)?;
        let url = self.upload_url(&name, fail_if_exists)?;

        let content_type = input.content_type().to_string();
        let size = input.size();
        // a streamed body is gone after the first attempt
        let policy = if input.is_replayable() {
            self.policy.clone()
        } else {
            self.policy.clone().retry_if(|_| false)
        };
        let mut body = match input.into_body() {
            BlobBody::Bytes(bytes) => UploadBody::Bytes(bytes),
            BlobBody::Stream(stream) => UploadBody::Stream(Some(stream)),
        };

        let result = self
            .exchange("store", &policy, |client| {
                let mut request = client
                    .post(url.clone())
                    .header(CONTENT_TYPE, content_type.as_str());
                if let Some(size) = size {
                    request = request.header(CONTENT_LENGTH, size);
                }
                Ok(request.body(body.next()?))
            })
            .await;

        match result {
            Ok(_) => {
                info!(bucket = %self.bucket, name = %name, "Stored blob");
                Ok(())
            },
            Err(e) if fail_if_exists && e.status() == Some(StatusCode::PRECONDITION_FAILED) => {
                Err(BlobError::AlreadyExists {
                    path: name,
                    source: Some(Box::new(e)),
                })
            },
            Err(e) => Err(e.into_blob_error(&name, "store")),
        }
    }

    async fn delete(&self, path: &Utf8Path) -> BlobResult<()> {
        let (_, name) = resolve(path)?;
        let url = self.object_url(&name)?;

        self.exchange("delete", &self.policy, |client| Ok(client.delete(url.clone())))
            .await
            .map_err(|e| e.into_blob_error(&name, "delete"))?;
        info!(bucket = %self.bucket, name = %name, "Deleted blob");
        Ok(())
    }
}

/// Builder for [`GcsBlobStore`]
pub struct GcsBlobStoreBuilder {
    bucket_name: Option<String>,
    base_url: String,
    credentials: Option<Credentials>,
    token_manager: Option<Arc<dyn AccessTokenManager>>,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
    backoff: Arc<dyn BackOff>,
    client: Option<Client>,
}

impl Default for GcsBlobStoreBuilder {
    fn default() -> Self {
        Self {
            bucket_name: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            credentials: None,
            token_manager: None,
            clock: Arc::new(SystemClock),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Arc::new(ExponentialBackOff::default().jitter(DEFAULT_JITTER_FACTOR)),
            client: None,
        }
    }
}

impl GcsBlobStoreBuilder {
    pub fn bucket_name(mut self, bucket_name: impl Into<String>) -> Self {
        self.bucket_name = Some(bucket_name.into());
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Credentials used to obtain access tokens; requests are anonymous without them
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Use an existing token manager instead of building one from credentials
    pub fn token_manager(mut self, token_manager: Arc<dyn AccessTokenManager>) -> Self {
        self.token_manager = Some(token_manager);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Retry ceiling for storage and token exchanges
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn backoff<B: BackOff + 'static>(mut self, backoff: B) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }

    pub fn http_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> BlobResult<GcsBlobStore> {
        let bucket = self.bucket_name.ok_or_else(|| BlobError::MissingFields {
            subject: "GCS blob store".to_string(),
            fields: vec!["bucket_name".to_string()],
        })?;

        let base_url = Url::parse(&self.base_url).map_err(|e| BlobError::ConfigValidation {
            field: "base_url".to_string(),
            reason: format!("'{}' is not a valid URL: {}", self.base_url, e),
        })?;
        let host = match base_url.host_str() {
            Some(host) if !base_url.cannot_be_a_base() => host.to_string(),
            _ => {
                return Err(BlobError::ConfigValidation {
                    field: "base_url".to_string(),
                    reason: format!("'{}' must be an absolute http(s) URL", self.base_url),
                })
            },
        };

        let client = match self.client {
            Some(client) => client,
            None => build_client()?,
        };

        let policy = RetryPolicy::new()
            .with_max_attempts(self.max_attempts)
            .retry_if(is_retryable)
            .with_backoff(Arc::clone(&self.backoff));

        let token_manager = match (self.token_manager, self.credentials) {
            (Some(manager), _) => Some(manager),
            (None, Some(credentials)) => {
                let token_policy = TokenEndpoint::default_policy()
                    .with_max_attempts(self.max_attempts)
                    .with_backoff(Arc::clone(&self.backoff));
                let endpoint = TokenEndpoint::new(client.clone(), Arc::clone(&self.clock), token_policy);
                Some(token_manager(credentials, endpoint, self.clock))
            },
            (None, None) => None,
        };

        let id = match base_url.port() {
            Some(port) => StoreId::new(format!("gcs://{}@{}:{}", bucket, host, port)),
            None => StoreId::new(format!("gcs://{}@{}", bucket, host)),
        };
        debug!(store = %id, authorized = token_manager.is_some(), "Created GCS blob store");

        Ok(GcsBlobStore {
            id,
            bucket,
            base_url,
            client,
            token_manager,
            policy,
        })
    }
}

/// HTTP client with connection pooling
fn build_client() -> BlobResult<Client> {
    ClientBuilder::new()
        .pool_max_idle_per_host(50)
        .pool_idle_timeout(Duration::from_secs(90))
        .connect_timeout(Duration::from_secs(30))
        // blob bytes must arrive exactly as stored
        .gzip(false)
        .user_agent(concat!("blobkit/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| BlobError::general("Failed to create HTTP client", e))
}
