//! Task lifecycle handlers: create, list, read, status changes, and
//! trigger control.

use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use opmon_core::{CollectionRun, Task, TaskStatus};
use opmon_pipeline::Cadence;
use serde::Deserialize;

use crate::middleware::{CallerId, RequestId};

use super::{
    map_pipeline_error, normalize_limit, normalize_offset, resolve_task, ApiError, ApiResponse,
    AppState,
};

#[derive(Debug, Deserialize)]
pub(super) struct CreateTaskRequest {
    pub keyword: String,
    pub description: Option<String>,
    pub platforms: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct UpdateTaskRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct ListTasksQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct StartQuery {
    /// Six-field cron expression.
    pub cron: Option<String>,
    /// Fixed period in seconds; ignored when `cron` is given.
    pub every_secs: Option<u64>,
}

impl StartQuery {
    fn cadence(self) -> Option<Cadence> {
        match (self.cron, self.every_secs) {
            (Some(cron), _) => Some(Cadence::Cron(cron)),
            (None, Some(secs)) => Some(Cadence::Every(Duration::from_secs(secs))),
            (None, None) => None,
        }
    }
}

/// POST /api/v1/tasks
pub(super) async fn create_task(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(caller): Extension<CallerId>,
    Json(body): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Task>>), ApiError> {
    let task = state
        .pipeline
        .create_task(
            caller.0,
            &body.keyword,
            body.description.as_deref(),
            body.platforms.as_slice(),
        )
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok((StatusCode::CREATED, ApiResponse::new(task, req_id.0)))
}

/// GET /api/v1/tasks
pub(super) async fn list_tasks(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(caller): Extension<CallerId>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<ApiResponse<Vec<Task>>>, ApiError> {
    let tasks = state
        .pipeline
        .list_tasks(
            caller.0,
            normalize_limit(query.limit),
            normalize_offset(query.offset),
        )
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(tasks, req_id.0))
}

/// GET /api/v1/tasks/{task_id}
pub(super) async fn get_task(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(caller): Extension<CallerId>,
    Path(task_id): Path<i64>,
) -> Result<Json<ApiResponse<Task>>, ApiError> {
    let task = resolve_task(&state, task_id, caller, &req_id.0).await?;
    Ok(ApiResponse::new(task, req_id.0))
}

/// PATCH /api/v1/tasks/{task_id}
pub(super) async fn update_task(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(caller): Extension<CallerId>,
    Path(task_id): Path<i64>,
    Json(body): Json<UpdateTaskRequest>,
) -> Result<Json<ApiResponse<Task>>, ApiError> {
    let rid = &req_id.0;
    resolve_task(&state, task_id, caller, rid).await?;

    let status = body.status.parse::<TaskStatus>().map_err(|_| {
        ApiError::new(
            rid,
            "validation_error",
            format!(
                "status must be 'active', 'paused', or 'completed', got '{}'",
                body.status
            ),
        )
    })?;

    let task = state
        .scheduler
        .update_task_status(task_id, status)
        .await
        .map_err(|e| map_pipeline_error(rid.clone(), &e))?;

    Ok(ApiResponse::new(task, req_id.0))
}

/// POST /api/v1/tasks/{task_id}/start
pub(super) async fn start_task(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(caller): Extension<CallerId>,
    Path(task_id): Path<i64>,
    Query(query): Query<StartQuery>,
) -> Result<Json<ApiResponse<Task>>, ApiError> {
    resolve_task(&state, task_id, caller, &req_id.0).await?;

    let task = state
        .scheduler
        .start(task_id, query.cadence())
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(task, req_id.0))
}

/// POST /api/v1/tasks/{task_id}/stop
pub(super) async fn stop_task(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(caller): Extension<CallerId>,
    Path(task_id): Path<i64>,
) -> Result<Json<ApiResponse<Task>>, ApiError> {
    resolve_task(&state, task_id, caller, &req_id.0).await?;

    let task = state
        .scheduler
        .stop(task_id)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(task, req_id.0))
}

/// POST /api/v1/tasks/{task_id}/collect: manual collection; runs proceed
/// in the background.
pub(super) async fn collect_task(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(caller): Extension<CallerId>,
    Path(task_id): Path<i64>,
) -> Result<(StatusCode, Json<ApiResponse<Vec<CollectionRun>>>), ApiError> {
    resolve_task(&state, task_id, caller, &req_id.0).await?;

    let runs = state
        .scheduler
        .collect_now(task_id)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok((StatusCode::ACCEPTED, ApiResponse::new(runs, req_id.0)))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use super::super::test_support::{create_task, send, test_app};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn create_task_returns_created_task() {
        let (app, _, _) = test_app().await;
        let (status, json) = send(
            &app,
            "POST",
            "/api/v1/tasks",
            Some(3),
            Some(json!({
                "keyword": "  opinion ",
                "description": "weekly watch",
                "platforms": ["weibo", "twitter"]
            })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["data"]["keyword"], "opinion");
        assert_eq!(json["data"]["user_id"], 3);
        assert_eq!(json["data"]["status"], "active");
        assert_eq!(json["data"]["platforms"], json!(["weibo", "twitter"]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn create_task_rejects_unknown_platform() {
        let (app, _, _) = test_app().await;
        let (status, json) = send(
            &app,
            "POST",
            "/api/v1/tasks",
            Some(3),
            Some(json!({ "keyword": "kw", "platforms": ["myspace"] })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "validation_error");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn list_tasks_only_returns_callers_tasks() {
        let (app, _, _) = test_app().await;
        create_task(&app, 1, &["reddit"]).await;
        create_task(&app, 1, &["reddit"]).await;
        create_task(&app, 2, &["reddit"]).await;

        let (status, json) = send(&app, "GET", "/api/v1/tasks?limit=10", Some(1), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn other_users_task_is_forbidden() {
        let (app, _, _) = test_app().await;
        let task_id = create_task(&app, 1, &["reddit"]).await;

        let (status, json) =
            send(&app, "GET", &format!("/api/v1/tasks/{task_id}"), Some(2), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["error"]["code"], "forbidden");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unknown_task_is_not_found() {
        let (app, _, _) = test_app().await;
        let (status, _) = send(&app, "GET", "/api/v1/tasks/999", Some(1), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn start_and_stop_toggle_trigger() {
        let (app, state, _) = test_app().await;
        let task_id = create_task(&app, 1, &["reddit"]).await;

        let (status, json) = send(
            &app,
            "POST",
            &format!("/api/v1/tasks/{task_id}/start?cron=0%200%20*%20*%20*%20*"),
            Some(1),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{json}");
        assert_eq!(state.scheduler.scheduled_tasks().await, vec![task_id]);

        let (status, json) =
            send(&app, "POST", &format!("/api/v1/tasks/{task_id}/stop"), Some(1), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["status"], "paused");
        assert!(state.scheduler.scheduled_tasks().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn start_rejects_invalid_cron() {
        let (app, _, _) = test_app().await;
        let task_id = create_task(&app, 1, &["reddit"]).await;

        let (status, json) = send(
            &app,
            "POST",
            &format!("/api/v1/tasks/{task_id}/start?cron=garbage"),
            Some(1),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "validation_error");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn patch_completed_status_disarms_task() {
        let (app, state, _) = test_app().await;
        let task_id = create_task(&app, 1, &["reddit"]).await;
        state.scheduler.start(task_id, None).await.unwrap();

        let (status, json) = send(
            &app,
            "PATCH",
            &format!("/api/v1/tasks/{task_id}"),
            Some(1),
            Some(json!({ "status": "completed" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["status"], "completed");
        assert!(state.scheduler.scheduled_tasks().await.is_empty());

        let (status, _) = send(
            &app,
            "PATCH",
            &format!("/api/v1/tasks/{task_id}"),
            Some(1),
            Some(json!({ "status": "archived" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn collect_returns_pending_runs_per_platform() {
        let (app, _, _) = test_app().await;
        let task_id = create_task(&app, 1, &["reddit", "zhihu"]).await;

        let (status, json) = send(
            &app,
            "POST",
            &format!("/api/v1/tasks/{task_id}/collect"),
            Some(1),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(json["data"].as_array().map(Vec::len), Some(2));
        assert_eq!(json["data"][0]["status"], "pending");
    }
}
