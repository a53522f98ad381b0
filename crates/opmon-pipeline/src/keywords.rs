//! Keyword views over a task's collected text.

use opmon_core::keywords::{DEFAULT_MAX_ITEMS, DEFAULT_MAX_WORDS};
use opmon_core::{frequency_view, importance_view, ImportanceEntry, WeightedKeyword};
use serde::Serialize;

use crate::error::PipelineError;
use crate::pipeline::Pipeline;

/// Keywords requested from the extractor when the caller does not say.
pub const DEFAULT_TOP_K: usize = 30;

/// View limits for [`Pipeline::keyword_views`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeywordQuery {
    pub top_k: usize,
    pub max_words: usize,
    pub max_items: usize,
}

impl Default for KeywordQuery {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            max_words: DEFAULT_MAX_WORDS,
            max_items: DEFAULT_MAX_ITEMS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KeywordViews {
    /// Number of item bodies in the corpus.
    pub document_count: usize,
    pub frequency: Vec<WeightedKeyword>,
    pub importance: Vec<ImportanceEntry>,
}

impl Pipeline {
    /// Extracts keywords from every item body of the task and builds both
    /// ranking views. A task without items yields empty views and the
    /// extractor is not called.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ExternalService`] if the extractor fails, or
    /// [`PipelineError::Store`] if loading the corpus fails.
    pub async fn keyword_views(
        &self,
        task_id: i64,
        query: KeywordQuery,
    ) -> Result<KeywordViews, PipelineError> {
        let bodies = self.store.item_bodies(task_id).await?;
        if bodies.is_empty() {
            return Ok(KeywordViews::default());
        }

        let corpus = bodies.join("\n");
        let keywords = self
            .extractor
            .extract(&corpus, query.top_k)
            .await
            .map_err(|e| {
                tracing::warn!(task_id, error = %e, "pipeline: keyword extraction failed");
                PipelineError::ExternalService(e.to_string())
            })?;

        Ok(KeywordViews {
            document_count: bodies.len(),
            frequency: frequency_view(&keywords, query.max_words),
            importance: importance_view(&keywords, query.max_items),
        })
    }
}
