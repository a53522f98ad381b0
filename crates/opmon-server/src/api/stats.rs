use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{NaiveDate, Utc};
use opmon_core::DailyStat;
use opmon_pipeline::{DateRange, PeriodComparison, SentimentDistribution, DEFAULT_TREND_DAYS};
use serde::{Deserialize, Serialize};

use crate::middleware::{CallerId, RequestId};

use super::{map_pipeline_error, resolve_task, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct StatsQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    /// Trailing window ending today, used when no explicit range is given.
    pub days: Option<u32>,
    /// Recompute every day of the range before reading.
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Deserialize)]
pub(super) struct CompareQuery {
    pub period1_start: NaiveDate,
    pub period1_end: NaiveDate,
    pub period2_start: NaiveDate,
    pub period2_end: NaiveDate,
}

#[derive(Debug, Serialize)]
pub(super) struct StatsData {
    range: DateRange,
    daily: Vec<DailyStat>,
    distribution: SentimentDistribution,
}

fn resolve_range(query: &StatsQuery, req_id: &str) -> Result<DateRange, ApiError> {
    match (query.start, query.end) {
        (Some(start), Some(end)) => DateRange::new(start, end)
            .map_err(|e| map_pipeline_error(req_id.to_owned(), &e)),
        (None, None) => DateRange::last_days(
            Utc::now().date_naive(),
            query.days.unwrap_or(DEFAULT_TREND_DAYS),
        )
        .map_err(|e| map_pipeline_error(req_id.to_owned(), &e)),
        _ => Err(ApiError::new(
            req_id,
            "validation_error",
            "start and end must be given together",
        )),
    }
}

/// GET /api/v1/tasks/{task_id}/stats
pub(super) async fn task_stats(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(caller): Extension<CallerId>,
    Path(task_id): Path<i64>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<ApiResponse<StatsData>>, ApiError> {
    let rid = &req_id.0;
    resolve_task(&state, task_id, caller, rid).await?;
    let range = resolve_range(&query, rid)?;

    if query.refresh {
        state
            .pipeline
            .recompute_range(task_id, range.start, range.end)
            .await
            .map_err(|e| map_pipeline_error(rid.clone(), &e))?;
    }

    let daily = state
        .pipeline
        .stats_for_range(task_id, range.start, range.end)
        .await
        .map_err(|e| map_pipeline_error(rid.clone(), &e))?;
    let distribution = SentimentDistribution::from_stats(&daily);

    Ok(ApiResponse::new(
        StatsData {
            range,
            daily,
            distribution,
        },
        req_id.0,
    ))
}

/// GET /api/v1/tasks/{task_id}/stats/compare
pub(super) async fn compare_periods(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(caller): Extension<CallerId>,
    Path(task_id): Path<i64>,
    Query(query): Query<CompareQuery>,
) -> Result<Json<ApiResponse<PeriodComparison>>, ApiError> {
    let rid = &req_id.0;
    resolve_task(&state, task_id, caller, rid).await?;

    let period1 = DateRange::new(query.period1_start, query.period1_end)
        .map_err(|e| map_pipeline_error(rid.clone(), &e))?;
    let period2 = DateRange::new(query.period2_start, query.period2_end)
        .map_err(|e| map_pipeline_error(rid.clone(), &e))?;

    let comparison = state
        .pipeline
        .compare(task_id, period1, period2)
        .await
        .map_err(|e| map_pipeline_error(rid.clone(), &e))?;

    Ok(ApiResponse::new(comparison, req_id.0))
}
