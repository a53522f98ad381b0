//! Content collector boundary and its HTTP adapter.

use std::time::Duration;

use async_trait::async_trait;
use opmon_core::{Platform, RawItem};
use serde::Serialize;
use thiserror::Error;

/// Failure reported by a collector.
///
/// The `transient: ` prefix of [`CollectorError::Transient`] is stored with
/// the failed run so an external retry policy can recognise it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollectorError {
    #[error("transient: {0}")]
    Transient(String),
    #[error("{0}")]
    Permanent(String),
}

impl CollectorError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, CollectorError::Transient(_))
    }
}

/// Fetches raw items for a keyword from one platform.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn collect(
        &self,
        keyword: &str,
        platform: Platform,
        count: u32,
    ) -> Result<Vec<RawItem>, CollectorError>;
}

#[derive(Serialize)]
struct CollectRequest<'a> {
    keyword: &'a str,
    platform: Platform,
    count: u32,
}

/// Collector backed by an external HTTP service (`POST {base}/collect`).
#[derive(Debug, Clone)]
pub struct HttpCollector {
    client: reqwest::Client,
    url: String,
}

impl HttpCollector {
    /// Builds a collector for the service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: format!("{}/collect", base_url.trim_end_matches('/')),
        })
    }
}

/// Network-level failures and 5xx responses are worth retrying; everything
/// else is permanent.
fn classify(err: &reqwest::Error) -> CollectorError {
    let transient =
        err.is_timeout() || err.is_connect() || err.status().is_some_and(|s| s.is_server_error());
    if transient {
        CollectorError::Transient(err.to_string())
    } else {
        CollectorError::Permanent(err.to_string())
    }
}

#[async_trait]
impl Collector for HttpCollector {
    async fn collect(
        &self,
        keyword: &str,
        platform: Platform,
        count: u32,
    ) -> Result<Vec<RawItem>, CollectorError> {
        let request = CollectRequest {
            keyword,
            platform,
            count,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify(&e))?
            .error_for_status()
            .map_err(|e| classify(&e))?;

        response
            .json::<Vec<RawItem>>()
            .await
            .map_err(|e| CollectorError::Permanent(format!("collector response parse error: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn collect_posts_request_and_parses_items() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collect"))
            .and(body_json(serde_json::json!({
                "keyword": "rust",
                "platform": "reddit",
                "count": 20
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "nativeId": "rd-1", "body": "first", "likeCount": 2 },
                { "nativeId": "rd-2", "body": "second", "publishedAt": "2026-03-01T00:00:00Z" }
            ])))
            .mount(&server)
            .await;

        let collector = HttpCollector::new(&server.uri(), 5).unwrap();
        let items = collector
            .collect("rust", Platform::Reddit, 20)
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].native_id, "rd-1");
        assert_eq!(items[0].like_count, 2);
        assert!(items[1].published_at.is_some());
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let collector = HttpCollector::new(&server.uri(), 5).unwrap();
        let err = collector
            .collect("rust", Platform::Twitter, 5)
            .await
            .unwrap_err();

        assert!(err.is_transient(), "got {err:?}");
        assert!(err.to_string().starts_with("transient: "));
    }

    #[tokio::test]
    async fn client_error_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let collector = HttpCollector::new(&server.uri(), 5).unwrap();
        let err = collector
            .collect("rust", Platform::Twitter, 5)
            .await
            .unwrap_err();

        assert!(!err.is_transient(), "got {err:?}");
    }

    #[tokio::test]
    async fn malformed_body_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let collector = HttpCollector::new(&server.uri(), 5).unwrap();
        let err = collector
            .collect("rust", Platform::Weibo, 5)
            .await
            .unwrap_err();

        assert!(matches!(err, CollectorError::Permanent(_)));
    }

    #[tokio::test]
    async fn unreachable_service_is_transient() {
        // Port 9 (discard) on localhost is not expected to accept HTTP.
        let collector = HttpCollector::new("http://127.0.0.1:9", 2).unwrap();
        let err = collector
            .collect("rust", Platform::Zhihu, 5)
            .await
            .unwrap_err();

        assert!(err.is_transient(), "got {err:?}");
    }
}
