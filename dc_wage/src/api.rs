//! HTTP API for the wage engine.
//!
//! This module exposes the period actions (create, calculate, approve,
//! mark paid, lock) and the record intake the demo server needs using
//! the [`axum`](https://crates.io/crates/axum) framework.  Handlers are
//! thin: all rules live in [`PeriodService`] and the models.

use crate::attendance::{AttendanceTemplate, RecordEdit};
use crate::cache::CachedRateSource;
use crate::config::WagePolicy;
use crate::error::{SourceError, WageError};
use crate::models::{Adjustment, DcRateProfile, ResolutionStatus};
use crate::service::PeriodService;
use crate::source::InMemorySource;
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

/// Application state shared across requests.
pub struct AppState {
    pub service: PeriodService,
    pub records: Arc<InMemorySource>,
    /// Present when the service reads rate profiles through a cache.
    pub rate_cache: Option<Arc<CachedRateSource>>,
    pub policy: WagePolicy,
}

impl IntoResponse for WageError {
    fn into_response(self) -> Response {
        let status = match &self {
            WageError::Validation(_) => StatusCode::BAD_REQUEST,
            WageError::MissingRateProfile { .. } | WageError::Incomplete { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            WageError::Conflict(_) | WageError::InvalidTransition { .. } => StatusCode::CONFLICT,
            WageError::NotFound(_) => StatusCode::NOT_FOUND,
            WageError::Source(SourceError::Transient(_)) => StatusCode::SERVICE_UNAVAILABLE,
            WageError::Source(SourceError::Permanent(_)) => StatusCode::BAD_GATEWAY,
            WageError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("request failed: {}", self);
        } else {
            info!("request rejected: {}", self);
        }
        let body = match &self {
            WageError::Incomplete { failures, succeeded } => json!({
                "error": self.to_string(),
                "failures": failures,
                "succeeded": succeeded.iter().map(|s| &s.contractor_id).collect::<Vec<_>>(),
            }),
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, WageError>;

#[derive(Debug, Deserialize)]
struct CreatePeriodRequest {
    project_id: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct ActionParams {
    #[serde(default)]
    force: bool,
    actor: Option<String>,
}

impl ActionParams {
    fn actor(&self) -> &str {
        self.actor.as_deref().unwrap_or("api")
    }
}

#[derive(Debug, Deserialize)]
struct SubmitAttendanceRequest {
    batch_id: String,
    template: AttendanceTemplate,
    contractor_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EditAttendanceRequest {
    edit: RecordEdit,
    editor: String,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiscrepancyStatusRequest {
    status: ResolutionStatus,
    actor: String,
    note: Option<String>,
}

/// Build the API router around the given state.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/periods", post(create_period).get(list_periods))
        .route("/api/periods/:id", get(get_period))
        .route("/api/periods/:id/calculate", post(calculate_period))
        .route("/api/periods/:id/approve", post(approve_period))
        .route("/api/periods/:id/pay", post(pay_period))
        .route("/api/periods/:id/lock", post(lock_period))
        .route("/api/attendance", post(submit_attendance))
        .route("/api/attendance/:id", post(edit_attendance).delete(delete_attendance))
        .route("/api/rates", post(add_rate_profile))
        .route("/api/adjustments", post(add_adjustment))
        .route("/api/discrepancies/:id/status", post(set_discrepancy_status))
        .with_state(state)
}

async fn create_period(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePeriodRequest>,
) -> ApiResult<impl IntoResponse> {
    let period = state
        .service
        .create_period(&req.project_id, req.start_date, req.end_date)
        .await?;
    Ok((StatusCode::CREATED, Json(period)))
}

async fn list_periods(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.service.list().await)
}

async fn get_period(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.get(&id).await?))
}

async fn calculate_period(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<ActionParams>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state.service.calculate(&id, params.force, params.actor()).await?;
    Ok(Json(outcome))
}

async fn approve_period(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<ActionParams>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.approve(&id, params.actor()).await?))
}

async fn pay_period(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<ActionParams>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.mark_paid(&id, params.actor()).await?))
}

async fn lock_period(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<ActionParams>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.lock(&id, params.actor()).await?))
}

async fn submit_attendance(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitAttendanceRequest>,
) -> ApiResult<impl IntoResponse> {
    let records = state
        .records
        .submit(&req.batch_id, &req.template, &req.contractor_ids, &state.policy)
        .await?;
    Ok((StatusCode::CREATED, Json(records)))
}

async fn edit_attendance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<EditAttendanceRequest>,
) -> ApiResult<impl IntoResponse> {
    let record = state
        .records
        .edit_record(&id, &req.edit, &req.editor, req.reason, Utc::now(), &state.policy)
        .await?;
    Ok(Json(record))
}

async fn delete_attendance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<ActionParams>,
) -> ApiResult<impl IntoResponse> {
    let record = state
        .records
        .delete_record(&id, params.actor(), None, Utc::now())
        .await?;
    Ok(Json(record))
}

async fn add_rate_profile(
    State(state): State<Arc<AppState>>,
    Json(profile): Json<DcRateProfile>,
) -> ApiResult<impl IntoResponse> {
    state.records.add_rate_profile(profile).await?;
    if let Some(cache) = &state.rate_cache {
        cache.invalidate_profiles();
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn add_adjustment(
    State(state): State<Arc<AppState>>,
    Json(adjustment): Json<Adjustment>,
) -> ApiResult<impl IntoResponse> {
    state.records.add_adjustment(adjustment).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_discrepancy_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<DiscrepancyStatusRequest>,
) -> ApiResult<impl IntoResponse> {
    let discrepancy = state
        .records
        .set_discrepancy_status(&id, req.status, &req.actor, req.note, Utc::now())
        .await?;
    Ok(Json(discrepancy))
}

/// Launch the API server.  It blocks until the server terminates
/// (e.g. when interrupted).
pub async fn serve(addr: &str, state: Arc<AppState>) -> Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", listener.local_addr()?);
    axum::serve(listener, router).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::WageCalculator;
    use crate::retry::RetryPolicy;
    use crate::store::PeriodStore;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    fn state() -> Arc<AppState> {
        let records = Arc::new(InMemorySource::new());
        let policy = WagePolicy::default();
        let service = PeriodService::new(
            records.clone(),
            Arc::new(PeriodStore::new()),
            Arc::new(WageCalculator::from_policy(policy.clone())),
            RetryPolicy::none(),
        );
        Arc::new(AppState {
            service,
            records,
            rate_cache: None,
            policy,
        })
    }

    async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(v) => Body::from(v.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn create_calculate_approve_over_http() {
        let router = build_router(state());

        let (status, _) = send(
            &router,
            "POST",
            "/api/rates",
            Some(json!({
                "contractor_id": "dc-1",
                "employee_id": "101527",
                "effective_date": "2025-01-01",
                "hourly_rate": "320",
                "professional_rate": "120",
                "phone_allowance": "200",
                "follower_count": 4
            })),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, records) = send(
            &router,
            "POST",
            "/api/attendance",
            Some(json!({
                "batch_id": "r-0102",
                "contractor_ids": ["dc-1"],
                "template": {
                    "project_id": "p-1",
                    "work_date": "2025-01-02",
                    "start_time": "08:00:00",
                    "end_time": "17:00:00",
                    "work_type": "regular",
                    "source": "manual"
                }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(records.as_array().unwrap().len(), 1);

        let (status, period) = send(
            &router,
            "POST",
            "/api/periods",
            Some(json!({"project_id": "p-1", "start_date": "2025-01-01", "end_date": "2025-01-16"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(period["id"], "p-1:202501-P1");
        assert_eq!(period["status"], "draft");

        let (status, outcome) = send(&router, "POST", "/api/periods/p-1:202501-P1/calculate?actor=ops", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["period"]["status"], "calculated");
        let regular: rust_decimal::Decimal = outcome["period"]["summaries"][0]["income"]["regular_wages"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(regular, rust_decimal_macros::dec!(2560));

        let (status, approved) = send(&router, "POST", "/api/periods/p-1:202501-P1/approve", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(approved["status"], "approved");

        let (status, body) = send(&router, "POST", "/api/periods/p-1:202501-P1/calculate", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("force"));
    }

    #[tokio::test]
    async fn invalid_span_is_bad_request() {
        let router = build_router(state());
        let (status, _) = send(
            &router,
            "POST",
            "/api/periods",
            Some(json!({"project_id": "p-1", "start_date": "2025-01-01", "end_date": "2025-01-15"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_profile_is_unprocessable() {
        let router = build_router(state());
        send(
            &router,
            "POST",
            "/api/attendance",
            Some(json!({
                "batch_id": "r-0102",
                "contractor_ids": ["dc-9"],
                "template": {
                    "project_id": "p-1",
                    "work_date": "2025-01-02",
                    "start_time": "08:00:00",
                    "end_time": "17:00:00",
                    "work_type": "regular",
                    "source": "manual"
                }
            })),
        )
        .await;
        send(
            &router,
            "POST",
            "/api/periods",
            Some(json!({"project_id": "p-1", "start_date": "2025-01-01", "end_date": "2025-01-16"})),
        )
        .await;
        let (status, body) = send(&router, "POST", "/api/periods/p-1:202501-P1/calculate", None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["failures"][0]["contractor_id"], "dc-9");

        let (_, period) = send(&router, "GET", "/api/periods/p-1:202501-P1", None).await;
        assert_eq!(period["status"], "draft");
    }

    #[tokio::test]
    async fn unknown_period_is_not_found() {
        let router = build_router(state());
        let (status, _) = send(&router, "GET", "/api/periods/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
