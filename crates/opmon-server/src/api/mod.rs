mod items;
mod keywords;
mod runs;
mod stats;
mod tasks;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use opmon_core::Task;
use opmon_pipeline::{Pipeline, PipelineError, TaskScheduler};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::{request_id, require_caller, CallerId, RequestId, USER_ID_HEADER};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub scheduler: Arc<TaskScheduler>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
    scheduled_tasks: usize,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn new(data: T, request_id: String) -> Json<Self> {
        Json(Self {
            data,
            meta: ResponseMeta::new(request_id),
        })
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "forbidden" => StatusCode::FORBIDDEN,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "bad_gateway" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 200)
}

pub(super) fn normalize_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}

pub(super) fn map_pipeline_error(request_id: String, error: &PipelineError) -> ApiError {
    match error {
        PipelineError::NotFound => ApiError::new(request_id, "not_found", "task not found"),
        PipelineError::Forbidden { .. } => ApiError::new(request_id, "forbidden", error.to_string()),
        PipelineError::Invalid(_)
        | PipelineError::InvalidInterval(_)
        | PipelineError::InvalidRange { .. }
        | PipelineError::RangeTooLong { .. } => {
            ApiError::new(request_id, "validation_error", error.to_string())
        }
        PipelineError::InvalidState(_) | PipelineError::InvalidRunTransition { .. } => {
            ApiError::new(request_id, "conflict", error.to_string())
        }
        PipelineError::ExternalService(_) => {
            tracing::warn!(error = %error, "external service failed");
            ApiError::new(request_id, "bad_gateway", error.to_string())
        }
        PipelineError::Scheduler(_) | PipelineError::Store(_) => {
            tracing::error!(error = %error, "request failed");
            ApiError::new(request_id, "internal_error", "internal error")
        }
    }
}

/// Loads a task and checks the caller owns it.
pub(super) async fn resolve_task(
    state: &AppState,
    task_id: i64,
    caller: CallerId,
    request_id: &str,
) -> Result<Task, ApiError> {
    state
        .pipeline
        .get_owned_task(task_id, caller.0)
        .await
        .map_err(|e| map_pipeline_error(request_id.to_owned(), &e))
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static("x-request-id"),
            HeaderName::from_static(USER_ID_HEADER),
        ])
}

fn task_router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/tasks",
            get(tasks::list_tasks).post(tasks::create_task),
        )
        .route(
            "/api/v1/tasks/{task_id}",
            get(tasks::get_task).patch(tasks::update_task),
        )
        .route("/api/v1/tasks/{task_id}/start", post(tasks::start_task))
        .route("/api/v1/tasks/{task_id}/stop", post(tasks::stop_task))
        .route("/api/v1/tasks/{task_id}/collect", post(tasks::collect_task))
        .route("/api/v1/tasks/{task_id}/progress", get(runs::task_progress))
        .route("/api/v1/tasks/{task_id}/runs", get(runs::list_runs))
        .route("/api/v1/tasks/{task_id}/items", get(items::list_items))
        .route(
            "/api/v1/tasks/{task_id}/sentiments",
            get(items::list_sentiments),
        )
        .route("/api/v1/tasks/{task_id}/analyze", post(items::analyze_task))
        .route("/api/v1/tasks/{task_id}/stats", get(stats::task_stats))
        .route(
            "/api/v1/tasks/{task_id}/stats/compare",
            get(stats::compare_periods),
        )
        .route("/api/v1/tasks/{task_id}/keywords", get(keywords::task_keywords))
        .route_layer(axum::middleware::from_fn(require_caller))
}

pub fn build_app(state: AppState) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(task_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);
    let scheduled_tasks = state.scheduler.scheduled_tasks().await.len();

    match state.pipeline.store().ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                    scheduled_tasks,
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                        scheduled_tasks,
                    },
                    meta,
                }),
            )
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{send, test_app};
    use super::*;

    #[test]
    fn normalize_limit_applies_defaults_and_bounds() {
        assert_eq!(normalize_limit(None), 50);
        assert_eq!(normalize_limit(Some(0)), 1);
        assert_eq!(normalize_limit(Some(1_000)), 200);
        assert_eq!(normalize_limit(Some(25)), 25);
        assert_eq!(normalize_offset(Some(-5)), 0);
    }

    #[test]
    fn api_error_codes_map_to_statuses() {
        let cases = [
            ("validation_error", StatusCode::BAD_REQUEST),
            ("forbidden", StatusCode::FORBIDDEN),
            ("bad_gateway", StatusCode::BAD_GATEWAY),
            ("conflict", StatusCode::CONFLICT),
            ("internal_error", StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (code, expected) in cases {
            let response = ApiError::new("req-1", code, "message").into_response();
            assert_eq!(response.status(), expected, "{code}");
        }
    }

    #[test]
    fn pipeline_errors_map_to_api_codes() {
        let forbidden = map_pipeline_error("r".into(), &PipelineError::Forbidden { task_id: 1 });
        assert_eq!(forbidden.error.code, "forbidden");

        let range = map_pipeline_error(
            "r".into(),
            &PipelineError::InvalidRange {
                start: chrono::NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
                end: chrono::NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            },
        );
        assert_eq!(range.error.code, "validation_error");

        let too_long = map_pipeline_error(
            "r".into(),
            &PipelineError::RangeTooLong { days: 400, max: 366 },
        );
        assert_eq!(too_long.error.code, "validation_error");

        let upstream = map_pipeline_error("r".into(), &PipelineError::ExternalService("x".into()));
        assert_eq!(upstream.error.code, "bad_gateway");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn health_reports_ok_without_caller() {
        let (app, _, _) = test_app().await;
        let (status, json) = send(&app, "GET", "/api/v1/health", None, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["status"], "ok");
        assert!(json["meta"]["request_id"].is_string());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn task_routes_require_caller_header() {
        let (app, _, _) = test_app().await;
        let (status, json) = send(&app, "GET", "/api/v1/tasks", None, None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"]["code"], "unauthorized");
    }
}
