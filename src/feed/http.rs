use crate::util::{validate_url, UrlValidationError};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::redirect::Policy;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_BODY: usize = 10 * 1024 * 1024; // 10MB
const MAX_REDIRECTS: usize = 5;

/// Browser-like User-Agent; some sites refuse unknown clients outright.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Errors from the raw fetch boundary.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request exceeded the configured timeout
    #[error("request timed out")]
    Timeout,
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Response body exceeded the configured size limit
    #[error("response too large")]
    ResponseTooLarge,
    /// The URL failed validation (bad scheme, credentials, private host)
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] UrlValidationError),
}

/// A fetched document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx response into [`FetchError::HttpStatus`].
    pub fn error_for_status(self) -> Result<Self, FetchError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(FetchError::HttpStatus(self.status))
        }
    }
}

/// The raw fetch collaborator.
///
/// Discovery and parsing only ever see this trait, so tests and alternative
/// fetchers (headless browsers, caches) can be swapped in. Implementations
/// report any HTTP status in [`HttpResponse::status`]; transport failures and
/// timeouts are errors.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchError>;
}

/// Settings for [`ReqwestClient`].
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout: Duration,
    pub max_body_bytes: usize,
    /// Permit loopback and private-network hosts (local servers, tests)
    pub allow_private_hosts: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_body_bytes: DEFAULT_MAX_BODY,
            allow_private_hosts: false,
        }
    }
}

/// [`HttpClient`] backed by a pooled `reqwest::Client`.
///
/// Every request is validated against the URL policy, bounded by the
/// configured timeout (connect, headers and body together) and capped in
/// body size.
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
    config: HttpConfig,
}

impl ReqwestClient {
    pub fn new(config: HttpConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(redirect_policy(config.allow_private_hosts))
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(30))
            .timeout(config.timeout)
            .build()?;

        Ok(Self { client, config })
    }

    async fn fetch(&self, url: &str) -> Result<HttpResponse, FetchError> {
        let response = self.client.get(url).send().await.map_err(classify)?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        // Error pages are not worth downloading
        let body = if response.status().is_success() {
            read_limited_bytes(response, self.config.max_body_bytes).await?
        } else {
            Vec::new()
        };

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        let validated = validate_url(url, self.config.allow_private_hosts)?;

        let result = tokio::time::timeout(self.config.timeout, self.fetch(validated.as_str()))
            .await
            .map_err(|_| FetchError::Timeout)?;

        if let Err(e) = &result {
            tracing::debug!(url = %url, error = %e, "Fetch failed");
        }
        result
    }
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(err)
    }
}

/// Follow a bounded number of redirects, refusing loops and targets that
/// fail the URL policy.
fn redirect_policy(allow_private_hosts: bool) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("redirect loop detected");
        }

        if let Err(e) = validate_url(url.as_str(), allow_private_hosts) {
            return attempt.error(e);
        }

        tracing::debug!(
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );
        attempt.follow()
    })
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(classify)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}


#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn local_client(timeout: Duration, max_body_bytes: usize) -> ReqwestClient {
        ReqwestClient::new(HttpConfig {
            timeout,
            max_body_bytes,
            allow_private_hosts: true,
            ..HttpConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_success_with_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .and(header_exists("user-agent"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<rss/>", "application/rss+xml"),
            )
            .mount(&server)
            .await;

        let client = local_client(Duration::from_secs(5), 1024);
        let response = client
            .get(&format!("{}/feed.xml", server.uri()))
            .await
            .unwrap();

        assert!(response.is_success());
        assert_eq!(response.content_type.as_deref(), Some("application/rss+xml"));
        assert_eq!(response.body, b"<rss/>");
    }

    #[tokio::test]
    async fn test_non_success_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
            .mount(&server)
            .await;

        let client = local_client(Duration::from_secs(5), 1024);
        let response = client.get(&server.uri()).await.unwrap();

        assert_eq!(response.status, 404);
        assert!(response.body.is_empty());
        assert!(matches!(
            response.error_for_status(),
            Err(FetchError::HttpStatus(404))
        ));
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let client = local_client(Duration::from_millis(200), 1024);
        let result = client.get(&server.uri()).await;

        assert!(matches!(result, Err(FetchError::Timeout)), "got {:?}", result);
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(2048)))
            .mount(&server)
            .await;

        let client = local_client(Duration::from_secs(5), 1024);
        let result = client.get(&server.uri()).await;

        assert!(matches!(result, Err(FetchError::ResponseTooLarge)));
    }

    #[tokio::test]
    async fn test_private_host_rejected_by_default() {
        let client = ReqwestClient::new(HttpConfig::default()).unwrap();
        let result = client.get("http://127.0.0.1:9/feed").await;

        assert!(matches!(result, Err(FetchError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_non_http_scheme_rejected() {
        let client = local_client(Duration::from_secs(1), 1024);
        let result = client.get("file:///etc/passwd").await;

        assert!(matches!(result, Err(FetchError::InvalidUrl(_))));
    }

    #[test]
    fn test_error_for_status_passes_success() {
        let response = HttpResponse {
            status: 204,
            content_type: None,
            body: Vec::new(),
        };
        assert!(response.error_for_status().is_ok());
    }
}
