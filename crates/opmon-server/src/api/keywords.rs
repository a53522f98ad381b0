use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use opmon_pipeline::{KeywordQuery, KeywordViews};
use serde::Deserialize;

use crate::middleware::{CallerId, RequestId};

use super::{map_pipeline_error, resolve_task, ApiError, ApiResponse, AppState};

const MAX_TOP_K: usize = 200;

#[derive(Debug, Deserialize)]
pub(super) struct KeywordsQuery {
    pub top_k: Option<usize>,
    pub max_words: Option<usize>,
    pub max_items: Option<usize>,
}

impl KeywordsQuery {
    fn into_query(self) -> KeywordQuery {
        let defaults = KeywordQuery::default();
        KeywordQuery {
            top_k: self.top_k.unwrap_or(defaults.top_k).clamp(1, MAX_TOP_K),
            max_words: self.max_words.unwrap_or(defaults.max_words),
            max_items: self.max_items.unwrap_or(defaults.max_items),
        }
    }
}

/// GET /api/v1/tasks/{task_id}/keywords
pub(super) async fn task_keywords(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(caller): Extension<CallerId>,
    Path(task_id): Path<i64>,
    Query(query): Query<KeywordsQuery>,
) -> Result<Json<ApiResponse<KeywordViews>>, ApiError> {
    resolve_task(&state, task_id, caller, &req_id.0).await?;

    let views = state
        .pipeline
        .keyword_views(task_id, query.into_query())
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(views, req_id.0))
}
