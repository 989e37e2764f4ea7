//! Async HTTP client with configurable politeness (delay between requests).
//! Issues [RuleRequest]s and decodes their responses into a [Body].

use super::decode::decode_body;
use super::error::ScraperError;
use super::request::RuleRequest;
use crate::block::Body;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use url::Url;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; yireader/0.1; +https://github.com/yireader)";
const MAX_REDIRECTS: usize = 10;

/// A decoded response and the URL it was requested from.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub url: Url,
    pub body: Body,
}

/// Shared async client that enforces a minimum delay between requests.
#[derive(Debug)]
pub struct PoliteClient {
    inner: reqwest::Client,
    delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl PoliteClient {
    /// Build a polite client with default User-Agent and no delay.
    pub fn new() -> Result<Self, ScraperError> {
        Self::builder().build()
    }

    pub fn builder() -> PoliteClientBuilder {
        PoliteClientBuilder::default()
    }

    /// Send the request and decode the body. Non-2xx responses are errors.
    pub async fn fetch(&self, request: &RuleRequest) -> Result<Fetched, ScraperError> {
        let url = Url::parse(&request.url).map_err(|e| ScraperError::InvalidUrl {
            input: request.url.clone(),
            reason: e.to_string(),
        })?;

        let mut builder = self.inner.request(request.method.clone(), url.clone());
        for (name, value) in &request.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(n), Ok(v)) => builder = builder.header(n, v),
                _ => tracing::debug!(header = name.as_str(), "skipping invalid request header"),
            }
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        self.wait_delay().await;
        tracing::debug!(method = %request.method, url = %url, "fetching");
        let response = builder.send().await.map_err(|e| ScraperError::Network {
            url: request.url.clone(),
            source: e,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScraperError::HttpStatus {
                status: status.as_u16(),
                url: request.url.clone(),
            });
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let bytes = response.bytes().await.map_err(|e| ScraperError::BodyRead {
            url: request.url.clone(),
            source: e,
        })?;

        Ok(Fetched {
            url,
            body: decode_body(content_type.as_deref(), &bytes),
        })
    }

    /// Sleep until the configured delay has passed since the last request,
    /// then claim the slot.
    async fn wait_delay(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.delay {
                tokio::time::sleep(self.delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Builder for PoliteClient with optional User-Agent, delay and timeout.
#[derive(Debug, Default)]
pub struct PoliteClientBuilder {
    user_agent: Option<String>,
    delay_secs: u64,
    timeout_secs: Option<u64>,
}

impl PoliteClientBuilder {
    /// Set a custom User-Agent. If not set, a browser-like default is used.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Set delay between requests in seconds. Default 0.
    pub fn delay_secs(mut self, secs: u64) -> Self {
        self.delay_secs = secs;
        self
    }

    /// Set a request timeout in seconds. No timeout unless set.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn build(self) -> Result<PoliteClient, ScraperError> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let mut builder = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS));
        if let Some(secs) = self.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let inner = builder
            .build()
            .map_err(|e| ScraperError::Client { source: e })?;
        Ok(PoliteClient {
            inner,
            delay: Duration::from_secs(self.delay_secs),
            last_request: Mutex::new(None),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use reqwest::Method;
    use serde_json::json;

    #[tokio::test]
    async fn fetch_decodes_gbk_without_header_charset() -> Result<(), ScraperError> {
        let server = MockServer::start_async().await;
        let (encoded, _, _) =
            encoding_rs::GBK.encode("<html><head><meta charset=\"gbk\"></head><body>中文</body></html>");
        let body = encoded.into_owned();
        server
            .mock_async(|when, then| {
                when.method(GET).path("/page");
                then.status(200).header("content-type", "text/html").body(body);
            })
            .await;

        let client = PoliteClient::new()?;
        let fetched = client.fetch(&RuleRequest::get(server.url("/page"))).await?;
        match fetched.body {
            Body::Text(s) => assert!(s.contains("中文")),
            other => panic!("expected text, got {:?}", other),
        }
        Ok(())
    }

    #[tokio::test]
    async fn fetch_posts_body_and_headers() -> Result<(), ScraperError> {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/search")
                    .header("x-token", "abc")
                    .body("q=1");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{"ok":true}"#);
            })
            .await;

        let client = PoliteClient::new()?;
        let request = RuleRequest {
            method: Method::POST,
            url: server.url("/search"),
            body: Some("q=1".into()),
            headers: vec![
                ("X-Token".into(), "abc".into()),
                ("bad header".into(), "x".into()),
            ],
        };
        let fetched = client.fetch(&request).await?;
        mock.assert_async().await;
        assert_eq!(fetched.body, Body::Json(json!({"ok": true})));
        Ok(())
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() -> Result<(), String> {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.path("/gone");
                then.status(404);
            })
            .await;
        let client = PoliteClient::new().map_err(|e| e.to_string())?;
        match client.fetch(&RuleRequest::get(server.url("/gone"))).await {
            Err(ScraperError::HttpStatus { status: 404, .. }) => Ok(()),
            other => Err(format!("expected HttpStatus 404, got {:?}", other)),
        }
    }

    #[tokio::test]
    async fn invalid_url_is_rejected_before_sending() -> Result<(), String> {
        let client = PoliteClient::new().map_err(|e| e.to_string())?;
        match client.fetch(&RuleRequest::get("/relative/only")).await {
            Err(ScraperError::InvalidUrl { input, .. }) if input == "/relative/only" => Ok(()),
            other => Err(format!("expected InvalidUrl, got {:?}", other)),
        }
    }
}
