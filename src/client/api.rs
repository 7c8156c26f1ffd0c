use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::storage::{FeedItem, Habitat, HeartState, PostDetail};
use crate::util::{validate_api_url, UrlValidationError};

const MAX_RESPONSE_SIZE: usize = 4 * 1024 * 1024; // 4MB
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_RETRIES: u32 = 2;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Request timed out")]
    Timeout,
    #[error("HTTP {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Response too large")]
    ResponseTooLarge,
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Invalid API URL: {0}")]
    InvalidBaseUrl(#[from] UrlValidationError),
    #[error("Sign-in required: pass --token or set one in the config")]
    MissingToken,
    /// The task running the request panicked before producing a result.
    #[error("Request task panicked: {0}")]
    Panicked(String),
}

impl FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout | FetchError::Network(_) | FetchError::IncompleteResponse { .. } => {
                true
            }
            FetchError::Api { status, .. } => *status >= 500,
            FetchError::ResponseTooLarge
            | FetchError::Decode(_)
            | FetchError::InvalidBaseUrl(_)
            | FetchError::MissingToken
            | FetchError::Panicked(_) => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Client for the habitat REST API.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    token: Option<SecretString>,
    retries: u32,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base", &self.base.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<SecretString>) -> Result<Self, FetchError> {
        let mut base = validate_api_url(base_url)?;
        // Relative joins replace the last path segment unless it ends in '/'.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        if token.is_some() && base.scheme() != "https" {
            let local = matches!(base.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));
            if !local {
                tracing::warn!(base_url = %base, "Sending bearer token over plain HTTP");
            }
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("habitat/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            http,
            base,
            token,
            retries: DEFAULT_RETRIES,
        })
    }

    /// Override the number of retries for transient GET failures.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    // ========================================================================
    // Endpoints
    // ========================================================================

    /// One feed page: newest posts without a cursor, older than `cursor`
    /// otherwise. An empty vec means the feed is exhausted.
    pub async fn fetch_page(
        &self,
        habitat_id: i64,
        cursor: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Vec<FeedItem>, FetchError> {
        let mut url = self.endpoint(&format!("posts/habitats/{habitat_id}"))?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(cursor) = cursor {
                query.append_pair("lastPostId", &cursor.to_string());
            }
            if let Some(limit) = limit {
                query.append_pair("limit", &limit.to_string());
            }
        }
        // Drop a dangling '?' when neither pair was added.
        if url.query() == Some("") {
            url.set_query(None);
        }
        self.get_json(url).await
    }

    pub async fn fetch_post(&self, post_id: i64) -> Result<PostDetail, FetchError> {
        let url = self.endpoint(&format!("posts/{post_id}"))?;
        self.get_json(url).await
    }

    pub async fn list_habitats(&self) -> Result<Vec<Habitat>, FetchError> {
        let url = self.endpoint("habitats")?;
        self.get_json(url).await
    }

    /// Toggle the caller's heart on a post. Not retried.
    pub async fn toggle_heart(&self, post_id: i64) -> Result<HeartState, FetchError> {
        let token = self.token.as_ref().ok_or(FetchError::MissingToken)?;
        let url = self.endpoint(&format!("posts/{post_id}/hearts"))?;
        let request = self.http.post(url).bearer_auth(token.expose_secret());
        let bytes = self.send(request).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    // ========================================================================
    // Plumbing
    // ========================================================================

    fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
        self.base
            .join(path)
            .map_err(|e| FetchError::InvalidBaseUrl(UrlValidationError::InvalidUrl(e)))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, FetchError> {
        let mut attempt = 0;
        loop {
            let mut request = self.http.get(url.clone());
            if let Some(token) = &self.token {
                request = request.bearer_auth(token.expose_secret());
            }

            match self.send(request).await {
                Ok(bytes) => return Ok(serde_json::from_slice(&bytes)?),
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    let delay = 1u64 << attempt; // 1s, 2s, 4s
                    tracing::debug!(
                        url = %url,
                        error = %e,
                        retry = attempt + 1,
                        delay_secs = delay,
                        "Retrying API request after transient error"
                    );
                    tokio::time::sleep(Duration::from_secs(delay)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Vec<u8>, FetchError> {
        let response = tokio::time::timeout(REQUEST_TIMEOUT, request.send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

        let status = response.status();
        let bytes = read_limited_bytes(response, MAX_RESPONSE_SIZE).await?;

        if !status.is_success() {
            return Err(FetchError::Api {
                status: status.as_u16(),
                message: error_message(&bytes)
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
            });
        }
        Ok(bytes)
    }
}

/// Pull `error` out of a `{"error": "..."}` body.
fn error_message(body: &[u8]) -> Option<String> {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        error: String,
    }
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .map(|b| b.error)
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::with_capacity(expected_length.unwrap_or(0).min(limit as u64) as usize);
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"[
        {
            "post_id": 12,
            "user_id": 3,
            "nickname": "Hare",
            "contents_url_array": ["https://cdn.example.com/a.png"],
            "human_content": "spring!",
            "created_at": "2024-04-01T10:00:00Z",
            "numOfHearts": 4,
            "numOfComments": 1,
            "is_heart": true,
            "user_image_url": null
        }
    ]"#;

    fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(&server.uri(), None).unwrap().with_retries(0)
    }

    #[tokio::test]
    async fn test_fetch_first_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/posts/habitats/7"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .expect(1)
            .mount(&server)
            .await;

        let items = client(&server).fetch_page(7, None, None).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, 12);
        assert_eq!(items[0].author_name, "Hare");
        assert_eq!(items[0].heart_count, 4);
        assert!(items[0].is_heart);
    }

    #[tokio::test]
    async fn test_fetch_page_sends_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/posts/habitats/7"))
            .and(query_param("lastPostId", "41"))
            .and(query_param("limit", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(1)
            .mount(&server)
            .await;

        let items = client(&server)
            .fetch_page(7, Some(41), Some(10))
            .await
            .unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_api_error_message_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(404).set_body_string(r#"{"error":"habitat 9 not found"}"#),
            )
            .mount(&server)
            .await;

        match client(&server).fetch_page(9, None, None).await {
            Err(FetchError::Api { status, message }) => {
                assert_eq!(status, 404);
                assert_eq!(message, "habitat 9 not found");
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_error_retried_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;

        let api = ApiClient::new(&server.uri(), None).unwrap().with_retries(1);
        assert!(api.list_habitats().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        assert!(matches!(
            client(&server).fetch_post(1).await,
            Err(FetchError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_toggle_heart_requires_token() {
        let server = MockServer::start().await;
        assert!(matches!(
            client(&server).toggle_heart(1).await,
            Err(FetchError::MissingToken)
        ));
    }

    #[tokio::test]
    async fn test_toggle_heart_sends_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/posts/5/hearts"))
            .and(header("authorization", "Bearer t0ken"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"is_heart":true,"numOfHearts":3}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let api = ApiClient::new(&server.uri(), Some(SecretString::from("t0ken"))).unwrap();
        let state = api.toggle_heart(5).await.unwrap();
        assert!(state.is_heart);
        assert_eq!(state.heart_count, 3);
    }

    #[test]
    fn test_base_path_is_preserved() {
        let api = ApiClient::new("http://127.0.0.1:9000/api", None).unwrap();
        assert_eq!(
            api.endpoint("habitats").unwrap().as_str(),
            "http://127.0.0.1:9000/api/habitats"
        );
        assert!(ApiClient::new("ftp://example.com", None).is_err());
    }

    #[test]
    fn test_debug_redacts_token() {
        let api = ApiClient::new("http://127.0.0.1:9000", Some(SecretString::from("secret")))
            .unwrap();
        let debug = format!("{:?}", api);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("REDACTED"));
    }
}
