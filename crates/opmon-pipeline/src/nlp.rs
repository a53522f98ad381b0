//! Sentiment classifier and keyword extractor boundaries, plus the HTTP
//! client for the NLP service that implements both.

use std::time::Duration;

use async_trait::async_trait;
use opmon_core::{KeywordScore, Sentiment, SentimentLabel};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NlpError {
    #[error("NLP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("NLP service returned an invalid result: {0}")]
    InvalidResponse(String),
}

/// Labels one piece of text.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Sentiment, NlpError>;
}

/// Extracts the top `top_k` keywords from a corpus, best first.
#[async_trait]
pub trait KeywordExtractor: Send + Sync {
    async fn extract(&self, corpus: &str, top_k: usize) -> Result<Vec<KeywordScore>, NlpError>;
}

#[derive(Serialize)]
struct TextInput<'a> {
    text: &'a str,
    language: &'a str,
}

#[derive(Deserialize)]
struct SentimentResponse {
    sentiment: String,
    score: f64,
    confidence: f64,
}

/// HTTP client for the NLP service.
#[derive(Debug, Clone)]
pub struct NlpClient {
    client: reqwest::Client,
    base_url: String,
    language: String,
}

impl NlpClient {
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, language: &str, timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            language: language.to_string(),
        })
    }
}

#[async_trait]
impl Classifier for NlpClient {
    async fn classify(&self, text: &str) -> Result<Sentiment, NlpError> {
        let response: SentimentResponse = self
            .client
            .post(format!("{}/sentiment", self.base_url))
            .json(&TextInput {
                text,
                language: &self.language,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let label = response
            .sentiment
            .parse::<SentimentLabel>()
            .map_err(|e| NlpError::InvalidResponse(e.to_string()))?;
        Sentiment::new(label, response.score, response.confidence)
            .map_err(|e| NlpError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl KeywordExtractor for NlpClient {
    async fn extract(&self, corpus: &str, top_k: usize) -> Result<Vec<KeywordScore>, NlpError> {
        let keywords = self
            .client
            .post(format!("{}/keywords", self.base_url))
            .query(&[("top_k", top_k)])
            .json(&TextInput {
                text: corpus,
                language: &self.language,
            })
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<KeywordScore>>()
            .await?;

        Ok(keywords)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn classify_parses_sentiment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sentiment"))
            .and(body_json(serde_json::json!({ "text": "很好", "language": "zh" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sentiment": "positive",
                "score": 0.91,
                "confidence": 0.8
            })))
            .mount(&server)
            .await;

        let client = NlpClient::new(&server.uri(), "zh", 5).unwrap();
        let sentiment = client.classify("很好").await.unwrap();

        assert_eq!(sentiment.label, SentimentLabel::Positive);
        assert!((sentiment.score - 0.91).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn classify_rejects_unknown_label() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sentiment"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sentiment": "ecstatic",
                "score": 0.5,
                "confidence": 0.5
            })))
            .mount(&server)
            .await;

        let client = NlpClient::new(&server.uri(), "zh", 5).unwrap();
        let err = client.classify("text").await.unwrap_err();
        assert!(matches!(err, NlpError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn classify_rejects_out_of_range_score() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sentiment": "negative",
                "score": 1.5,
                "confidence": 0.5
            })))
            .mount(&server)
            .await;

        let client = NlpClient::new(&server.uri(), "zh", 5).unwrap();
        assert!(client.classify("text").await.is_err());
    }

    #[tokio::test]
    async fn classify_surfaces_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = NlpClient::new(&server.uri(), "zh", 5).unwrap();
        let err = client.classify("text").await.unwrap_err();
        assert!(matches!(err, NlpError::Http(_)));
    }

    #[tokio::test]
    async fn extract_passes_top_k_and_parses_keywords() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/keywords"))
            .and(query_param("top_k", "30"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "word": "rust", "frequency": 12, "tfidf": 0.42 },
                { "word": "cargo", "frequency": 4, "tfidf": 0.17 }
            ])))
            .mount(&server)
            .await;

        let client = NlpClient::new(&server.uri(), "en", 5).unwrap();
        let keywords = client.extract("rust cargo rust", 30).await.unwrap();

        assert_eq!(keywords.len(), 2);
        assert_eq!(keywords[0].word, "rust");
        assert_eq!(keywords[0].frequency, 12);
    }
}
