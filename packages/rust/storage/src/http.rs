//! HTTP object store: `HEAD`/`GET`/`PUT` on `{base_url}/{key}`.
//!
//! Works against any bucket endpoint that accepts plain object requests
//! (pre-authorized gateways, S3-compatible proxies, a static file server
//! with uploads enabled).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::debug;
use url::Url;

use repodoc_shared::{RepoDocError, Result};

use crate::{ObjectMeta, ObjectStore, validate_key};

/// User-Agent string for object storage requests.
const USER_AGENT: &str = concat!("repodoc/", env!("CARGO_PKG_VERSION"));

/// Archives can be large; allow generous transfer time.
const TIMEOUT_SECS: u64 = 300;

/// Object store reached over HTTP.
pub struct HttpObjectStore {
    client: Client,
    base: String,
    token: Option<String>,
}

impl HttpObjectStore {
    pub fn new(base_url: Url, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .map_err(|e| RepoDocError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base: base_url.as_str().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url_for(&self, key: &str) -> Result<String> {
        validate_key(key)?;
        Ok(format!("{}/{key}", self.base))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }

    async fn send(&self, key: &str, request: RequestBuilder) -> Result<Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| RepoDocError::Network(format!("object {key}: {e}")))?;

        match response.status() {
            s if s.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(RepoDocError::ObjectNotFound {
                key: key.to_string(),
            }),
            s => Err(RepoDocError::ObjectStore(format!("object {key}: HTTP {s}"))),
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn head(&self, key: &str) -> Result<ObjectMeta> {
        let url = self.url_for(key)?;
        let response = self.send(key, self.client.head(&url)).await?;
        let size = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        Ok(ObjectMeta {
            key: key.to_string(),
            size,
        })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let url = self.url_for(key)?;
        let response = self.send(key, self.client.get(&url)).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| RepoDocError::Network(format!("object {key}: failed to read body: {e}")))?;
        debug!(key, size = body.len(), "fetched object");
        Ok(body.to_vec())
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        let url = self.url_for(key)?;
        let size = body.len();
        let request = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body);
        self.send(key, request).await?;
        debug!(key, size, "uploaded object");
        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_bytes, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer, token: Option<&str>) -> HttpObjectStore {
        let base = Url::parse(&format!("{}/bucket", server.uri())).unwrap();
        HttpObjectStore::new(base, token.map(String::from)).unwrap()
    }

    #[tokio::test]
    async fn get_and_put_roundtrip() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/bucket/state/freshness.json"))
            .and(header("authorization", "Bearer s3cret"))
            .and(body_bytes(b"{}\n".to_vec()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/bucket/state/freshness.json"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"{}\n".to_vec()))
            .mount(&server)
            .await;

        let store = store_for(&server, Some("s3cret"));
        store
            .put("state/freshness.json", b"{}\n".to_vec())
            .await
            .unwrap();
        assert_eq!(store.get("state/freshness.json").await.unwrap(), b"{}\n");
    }

    #[tokio::test]
    async fn not_found_differs_from_failure() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/bucket/missing.tar.gz"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/bucket/flaky.tar.gz"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let store = store_for(&server, None);

        let err = store.get("missing.tar.gz").await.unwrap_err();
        assert!(err.is_object_not_found());

        let err = store.get("flaky.tar.gz").await.unwrap_err();
        assert!(!err.is_object_not_found());
        assert!(matches!(err, RepoDocError::ObjectStore(_)));
    }

    #[tokio::test]
    async fn head_checks_existence() {
        let server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .and(path("/bucket/a.tar.gz"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        Mock::given(method("HEAD"))
            .and(path("/bucket/b.tar.gz"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = store_for(&server, None);
        let meta = store.head("a.tar.gz").await.unwrap();
        assert_eq!(meta.key, "a.tar.gz");
        assert!(store.head("b.tar.gz").await.unwrap_err().is_object_not_found());
    }
}
