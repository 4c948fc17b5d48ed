//! API client for the school backend.
//!
//! This module provides the `ApiClient` struct for conditional document
//! fetches, login validation and device token registration.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, StatusCode};
use tracing::{debug, warn};

use super::ApiError;
use crate::auth::Credentials;
use crate::push::{DeviceRegistrar, DeviceRegistration};

// ============================================================================
// Constants
// ============================================================================

/// Default backend used when the config does not name one.
pub const DEFAULT_BASE_URL: &str = "https://pius-gateway.eu-de.mybluemix.net/v2";

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Endpoint answering 200 for valid credentials
const VALIDATE_LOGIN_PATH: &str = "validateLogin";

/// Endpoint receiving push device tokens
const DEVICE_TOKEN_PATH: &str = "deviceToken";

/// Raw outcome of a conditional fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Option<String>,
}

/// How a fetch status is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// 200: new payload in the body
    Changed,
    /// 304: reuse the cached payload
    NotModified,
    /// Anything else
    Failed(u16),
}

impl FetchResponse {
    pub fn new(status: u16, body: Option<String>) -> Self {
        Self { status, body }
    }

    pub fn status(&self) -> FetchStatus {
        match self.status {
            200 => FetchStatus::Changed,
            304 => FetchStatus::NotModified,
            other => FetchStatus::Failed(other),
        }
    }
}

/// A request that carries the last known digest so the server can answer
/// "not modified".
#[async_trait]
pub trait ConditionalFetch: Send + Sync {
    /// Fetch `endpoint`. Non-success statuses are returned as a response;
    /// `Err` is reserved for transport failures.
    async fn fetch(&self, endpoint: &str, digest: Option<&str>) -> Result<FetchResponse, ApiError>;
}

/// API client for the school backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    credentials: Option<Credentials>,
}

impl ApiClient {
    /// Create a new API client for `base_url`
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials: None,
        })
    }

    /// Create a client with the given credentials, sharing the connection pool.
    pub fn with_credentials(&self, credentials: Option<Credentials>) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            credentials,
        }
    }

    pub fn set_credentials(&mut self, credentials: Option<Credentials>) {
        self.credentials = credentials;
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.credentials {
            Some(ref c) => request.basic_auth(&c.username, Some(&c.password)),
            None => request,
        }
    }

    /// Check credentials against the backend.
    /// Returns Ok(false) when the backend rejects them.
    pub async fn validate_login(&self, username: &str, password: &str) -> Result<bool, ApiError> {
        let response = self
            .client
            .get(self.url(VALIDATE_LOGIN_PATH))
            .basic_auth(username, Some(password))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ApiError::from_status(status, &body))
            }
        }
    }

    /// Register a push device token.
    pub async fn register_device(&self, registration: &DeviceRegistration) -> Result<(), ApiError> {
        let response = self
            .authorize(self.client.post(self.url(DEVICE_TOKEN_PATH)))
            .json(registration)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(grade = %registration.grade, "Device token registered");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }
}

#[async_trait]
impl ConditionalFetch for ApiClient {
    async fn fetch(&self, endpoint: &str, digest: Option<&str>) -> Result<FetchResponse, ApiError> {
        let url = self.url(endpoint);

        let mut request = self
            .authorize(self.client.get(&url))
            .header(header::ACCEPT, "application/json");
        if let Some(digest) = digest {
            request = request.header(header::IF_NONE_MATCH, digest);
        }

        let response = request.send().await.map_err(|e| {
            warn!(url = %url, error = %e, "Fetch failed");
            ApiError::NetworkError(e)
        })?;

        let status = response.status();
        let body = if status == StatusCode::NOT_MODIFIED {
            None
        } else {
            let text = response.text().await?;
            if text.is_empty() {
                None
            } else {
                Some(text)
            }
        };

        debug!(
            url = %url,
            status = status.as_u16(),
            sent_digest = digest.is_some(),
            body_len = body.as_ref().map(|b| b.len()).unwrap_or(0),
            "Fetch completed"
        );

        Ok(FetchResponse::new(status.as_u16(), body))
    }
}

#[async_trait]
impl DeviceRegistrar for ApiClient {
    async fn register(&self, registration: &DeviceRegistration) -> Result<(), ApiError> {
        self.register_device(registration).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{basic_auth, body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> ApiClient {
        ApiClient::new(server.uri()).unwrap()
    }

    #[test]
    fn test_fetch_status() {
        assert_eq!(FetchResponse::new(200, None).status(), FetchStatus::Changed);
        assert_eq!(FetchResponse::new(304, None).status(), FetchStatus::NotModified);
        assert_eq!(FetchResponse::new(500, None).status(), FetchStatus::Failed(500));
        assert_eq!(FetchResponse::new(204, None).status(), FetchStatus::Failed(204));
    }

    #[test]
    fn test_url_joining() {
        let client = ApiClient::new("https://example.org/v2/").unwrap();
        assert_eq!(client.url("calendar"), "https://example.org/v2/calendar");
        assert_eq!(client.url("/vertretungsplan/5A"), "https://example.org/v2/vertretungsplan/5A");
    }

    #[tokio::test]
    async fn test_fetch_sends_digest_and_handles_not_modified() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/calendar"))
            .and(header("if-none-match", "abc123"))
            .respond_with(ResponseTemplate::new(304))
            .expect(1)
            .mount(&server)
            .await;

        let response = test_client(&server).fetch("calendar", Some("abc123")).await.unwrap();
        assert_eq!(response.status(), FetchStatus::NotModified);
        assert_eq!(response.body, None);
    }

    #[tokio::test]
    async fn test_fetch_without_digest_returns_body() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/vertretungsplan"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"dates":[]}"#))
            .mount(&server)
            .await;

        let response = test_client(&server).fetch("vertretungsplan", None).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body.as_deref(), Some(r#"{"dates":[]}"#));

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].headers.get("if-none-match").is_none());
    }

    #[tokio::test]
    async fn test_fetch_failure_status_is_not_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/calendar"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let response = test_client(&server).fetch("calendar", None).await.unwrap();
        assert_eq!(response.status(), FetchStatus::Failed(500));
    }

    #[tokio::test]
    async fn test_fetch_uses_basic_auth_when_logged_in() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/vertretungsplan/5A"))
            .and(basic_auth("max", "geheim"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server).with_credentials(Some(Credentials::new("max", "geheim")));
        let response = client.fetch("vertretungsplan/5A", None).await.unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_validate_login() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/validateLogin"))
            .and(basic_auth("max", "geheim"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/validateLogin"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = test_client(&server);
        assert!(client.validate_login("max", "geheim").await.unwrap());
        assert!(!client.validate_login("max", "falsch").await.unwrap());
    }

    #[tokio::test]
    async fn test_validate_login_server_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/validateLogin"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = test_client(&server).validate_login("max", "geheim").await.unwrap_err();
        assert!(matches!(err, ApiError::ServerError(_)));
    }

    #[tokio::test]
    async fn test_register_device_posts_registration() {
        let server = MockServer::start().await;

        let registration = DeviceRegistration {
            token: "tok-1".into(),
            grade: "Q1".into(),
            course_list: vec!["M-LK1".into(), "E-GK2".into()],
            version: "0.4.0".into(),
            credential: "a94a8fe5ccb19ba61c4c0873d391e987982fbbd3".into(),
        };

        Mock::given(method("POST"))
            .and(path("/deviceToken"))
            .and(body_json(serde_json::json!({
                "deviceToken": "tok-1",
                "grade": "Q1",
                "courseList": ["M-LK1", "E-GK2"],
                "version": "0.4.0",
                "credential": "a94a8fe5ccb19ba61c4c0873d391e987982fbbd3"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        test_client(&server).register_device(&registration).await.unwrap();
    }
}
