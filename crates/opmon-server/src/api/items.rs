use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use opmon_core::{ClassifiedItem, Item};
use opmon_pipeline::AnalysisOutcome;
use serde::Deserialize;

use crate::middleware::{CallerId, RequestId};

use super::{
    map_pipeline_error, normalize_limit, normalize_offset, resolve_task, ApiError, ApiResponse,
    AppState,
};

#[derive(Debug, Deserialize)]
pub(super) struct ItemsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct AnalyzeQuery {
    pub limit: Option<i64>,
}

/// GET /api/v1/tasks/{task_id}/items: newest published first.
pub(super) async fn list_items(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(caller): Extension<CallerId>,
    Path(task_id): Path<i64>,
    Query(query): Query<ItemsQuery>,
) -> Result<Json<ApiResponse<Vec<Item>>>, ApiError> {
    resolve_task(&state, task_id, caller, &req_id.0).await?;

    let items = state
        .pipeline
        .list_items(
            task_id,
            normalize_limit(query.limit),
            normalize_offset(query.offset),
        )
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(items, req_id.0))
}

/// GET /api/v1/tasks/{task_id}/sentiments: classified items, most recently
/// analyzed first.
pub(super) async fn list_sentiments(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(caller): Extension<CallerId>,
    Path(task_id): Path<i64>,
    Query(query): Query<ItemsQuery>,
) -> Result<Json<ApiResponse<Vec<ClassifiedItem>>>, ApiError> {
    resolve_task(&state, task_id, caller, &req_id.0).await?;

    let classified = state
        .pipeline
        .list_classified_items(
            task_id,
            normalize_limit(query.limit),
            normalize_offset(query.offset),
        )
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(classified, req_id.0))
}

/// POST /api/v1/tasks/{task_id}/analyze: classify pending items now.
pub(super) async fn analyze_task(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(caller): Extension<CallerId>,
    Path(task_id): Path<i64>,
    Query(query): Query<AnalyzeQuery>,
) -> Result<Json<ApiResponse<AnalysisOutcome>>, ApiError> {
    resolve_task(&state, task_id, caller, &req_id.0).await?;

    let limit = query
        .limit
        .unwrap_or(state.pipeline.settings().analyze_batch)
        .max(1);
    let outcome = state
        .pipeline
        .analyze_pending(task_id, limit)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(outcome, req_id.0))
}
