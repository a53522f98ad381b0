use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use opmon_core::CollectionRun;
use opmon_pipeline::PlatformProgress;
use serde::Deserialize;

use crate::middleware::{CallerId, RequestId};

use super::{map_pipeline_error, normalize_limit, resolve_task, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct RunsQuery {
    pub limit: Option<i64>,
}

/// GET /api/v1/tasks/{task_id}/progress: latest run per platform.
pub(super) async fn task_progress(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(caller): Extension<CallerId>,
    Path(task_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<PlatformProgress>>>, ApiError> {
    resolve_task(&state, task_id, caller, &req_id.0).await?;

    let progress = state
        .pipeline
        .progress_for_task(task_id)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(progress, req_id.0))
}

/// GET /api/v1/tasks/{task_id}/runs
pub(super) async fn list_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(caller): Extension<CallerId>,
    Path(task_id): Path<i64>,
    Query(query): Query<RunsQuery>,
) -> Result<Json<ApiResponse<Vec<CollectionRun>>>, ApiError> {
    resolve_task(&state, task_id, caller, &req_id.0).await?;

    let runs = state
        .pipeline
        .list_runs(task_id, normalize_limit(query.limit))
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(runs, req_id.0))
}
