//! Deterministic collaborators for exercising the pipeline without
//! external services.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opmon_core::{KeywordScore, Platform, RawItem, Sentiment, SentimentLabel};

use crate::collector::{Collector, CollectorError};
use crate::memory::MemoryStore;
use crate::nlp::{Classifier, KeywordExtractor, NlpError};
use crate::pipeline::{Pipeline, PipelineSettings};

/// Builds a raw item published at `published_at`.
#[must_use]
pub fn raw_item(native_id: &str, body: &str, published_at: DateTime<Utc>) -> RawItem {
    RawItem {
        native_id: native_id.to_string(),
        author: None,
        body: body.to_string(),
        like_count: 0,
        reply_count: 0,
        share_count: 0,
        url: None,
        published_at: Some(published_at),
    }
}

/// Returns a fixed response per platform; platforms without one yield no items.
#[derive(Debug, Default)]
pub struct ScriptedCollector {
    responses: Mutex<HashMap<Platform, Result<Vec<RawItem>, CollectorError>>>,
    calls: AtomicUsize,
}

impl ScriptedCollector {
    pub fn respond(&self, platform: Platform, response: Result<Vec<RawItem>, CollectorError>) {
        self.responses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(platform, response);
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Collector for ScriptedCollector {
    async fn collect(
        &self,
        _keyword: &str,
        platform: Platform,
        _count: u32,
    ) -> Result<Vec<RawItem>, CollectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&platform)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Labels by substring: `good` is positive (0.9), `bad` negative (0.1),
/// `fail` is a classifier error, anything else neutral (0.5).
#[derive(Debug, Default)]
pub struct KeywordClassifier {
    calls: AtomicUsize,
}

impl KeywordClassifier {
    /// Number of texts classified so far, failures included.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, text: &str) -> Result<Sentiment, NlpError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let (label, score) = if text.contains("fail") {
            return Err(NlpError::InvalidResponse("classifier refused".to_string()));
        } else if text.contains("good") {
            (SentimentLabel::Positive, 0.9)
        } else if text.contains("bad") {
            (SentimentLabel::Negative, 0.1)
        } else {
            (SentimentLabel::Neutral, 0.5)
        };
        Sentiment::new(label, score, 0.8).map_err(|e| NlpError::InvalidResponse(e.to_string()))
    }
}

/// Returns a fixed keyword list and records the last request.
#[derive(Debug, Default)]
pub struct StaticExtractor {
    keywords: Mutex<Vec<KeywordScore>>,
    last_request: Mutex<Option<(String, usize)>>,
}

impl StaticExtractor {
    pub fn set_keywords(&self, keywords: Vec<KeywordScore>) {
        *self
            .keywords
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = keywords;
    }

    #[must_use]
    pub fn last_request(&self) -> Option<(String, usize)> {
        self.last_request
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl KeywordExtractor for StaticExtractor {
    async fn extract(&self, corpus: &str, top_k: usize) -> Result<Vec<KeywordScore>, NlpError> {
        *self
            .last_request
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some((corpus.to_string(), top_k));
        Ok(self
            .keywords
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone())
    }
}

/// Handles to the doubles behind a [`test_pipeline`].
#[derive(Clone)]
pub struct TestDoubles {
    pub store: Arc<MemoryStore>,
    pub collector: Arc<ScriptedCollector>,
    pub classifier: Arc<KeywordClassifier>,
    pub extractor: Arc<StaticExtractor>,
}

/// A pipeline over [`MemoryStore`] with scripted collaborators.
#[must_use]
pub fn test_pipeline() -> (Arc<Pipeline>, TestDoubles) {
    let doubles = TestDoubles {
        store: Arc::new(MemoryStore::new()),
        collector: Arc::new(ScriptedCollector::default()),
        classifier: Arc::new(KeywordClassifier::default()),
        extractor: Arc::new(StaticExtractor::default()),
    };
    let pipeline = Pipeline::new(
        doubles.store.clone(),
        doubles.collector.clone(),
        doubles.classifier.clone(),
        doubles.extractor.clone(),
        PipelineSettings::default(),
    );
    (Arc::new(pipeline), doubles)
}
