//! # HTTP Fetching
//! The monitor core consumes "an HTTP GET with a timeout and header
//! injection" through the [`Fetcher`] trait; [`HttpFetcher`] is the
//! reqwest-backed implementation the binary uses. Tests swap in scripted
//! fetchers.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::redirect::Policy;
use thiserror::Error;

/// Default identification string, derived from the crate version.
pub fn default_user_agent() -> String {
    format!("webwatch/{}", env!("CARGO_PKG_VERSION"))
}

/// Options for building an HTTP client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeout: Duration,
    pub follow_redirects: bool,
    pub user_agent: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            follow_redirects: true,
            user_agent: default_user_agent(),
        }
    }
}

/// A single fetch attempt gone wrong.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("unexpected status code: {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Transport(String),
}

/// What a successful GET produced.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    /// Whether the status is in the accepted [200, 300) window.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs an HTTP GET for a monitor.
///
/// Implementations must be safe to call concurrently and must honor the
/// timeout they were configured with.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<FetchResponse, FetchError>;
}

/// reqwest-backed [`Fetcher`].
pub struct HttpFetcher {
    client: reqwest::Client,
    user_agent: String,
}

impl HttpFetcher {
    pub fn new(opts: &ClientOptions) -> Result<Self, reqwest::Error> {
        let redirect = if opts.follow_redirects {
            Policy::default()
        } else {
            Policy::none()
        };
        let client = reqwest::Client::builder()
            .timeout(opts.timeout)
            .redirect(redirect)
            .build()?;
        Ok(Self {
            client,
            user_agent: opts.user_agent.clone(),
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<FetchResponse, FetchError> {
        let request = apply_headers(self.client.get(url), headers, &self.user_agent);
        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?
            .to_vec();

        Ok(FetchResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Inject headers into a request: the default identification header only if
/// the caller didn't supply one, then all custom headers, overwriting any
/// with the same name.
pub fn apply_headers(
    mut request: reqwest::RequestBuilder,
    headers: &HashMap<String, String>,
    default_user_agent: &str,
) -> reqwest::RequestBuilder {
    let has_user_agent = headers.keys().any(|k| k.eq_ignore_ascii_case("user-agent"));
    if !has_user_agent {
        request = request.header(USER_AGENT, default_user_agent);
    }
    for (name, value) in headers {
        request = request.header(name.as_str(), value.as_str());
    }
    request
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(headers: &HashMap<String, String>) -> reqwest::Request {
        let client = reqwest::Client::new();
        apply_headers(client.get("http://example.com/"), headers, "webwatch/test")
            .build()
            .expect("build request")
    }

    #[test]
    fn default_user_agent_applied_when_absent() {
        let request = build(&HashMap::new());
        assert_eq!(
            request.headers().get(USER_AGENT).and_then(|v| v.to_str().ok()),
            Some("webwatch/test")
        );
    }

    #[test]
    fn custom_user_agent_wins_over_default() {
        let headers = HashMap::from([("User-Agent".to_owned(), "custom/1.0".to_owned())]);
        let request = build(&headers);
        assert_eq!(
            request.headers().get(USER_AGENT).and_then(|v| v.to_str().ok()),
            Some("custom/1.0")
        );
    }

    #[test]
    fn custom_headers_are_all_applied() {
        let headers = HashMap::from([
            ("X-Api-Key".to_owned(), "secret".to_owned()),
            ("Accept".to_owned(), "text/html".to_owned()),
        ]);
        let request = build(&headers);
        assert_eq!(
            request.headers().get("x-api-key").and_then(|v| v.to_str().ok()),
            Some("secret")
        );
        assert_eq!(
            request.headers().get("accept").and_then(|v| v.to_str().ok()),
            Some("text/html")
        );
    }

    #[test]
    fn success_window_is_200_to_299() {
        let mut response = FetchResponse {
            status: 200,
            content_type: None,
            body: Vec::new(),
        };
        assert!(response.is_success());
        response.status = 299;
        assert!(response.is_success());
        response.status = 300;
        assert!(!response.is_success());
        response.status = 199;
        assert!(!response.is_success());
    }
}
