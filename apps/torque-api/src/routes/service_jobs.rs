//! Service jobs, their lines and their status history.

use axum::extract::State;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;

use torque_core::{
    NewServiceDetail, NewServiceJob, ServiceDetail, ServiceJob, ServiceJobFilter,
    ServiceJobHistory, StatusChange, UpdateServiceDetail, UpdateServiceJob,
};

use crate::error::ApiResult;
use crate::extract::{Json, PageParams, Path, Query};
use crate::response::{created, ok, Reply};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct Cleared {
    pub removed: usize,
}

pub fn service_jobs() -> Router<AppState> {
    Router::new()
        .route("/", get(list_jobs).post(create_job))
        .route("/{id}", get(get_job).patch(update_job).delete(delete_job))
        .route("/{id}/status", post(transition_job))
        .route("/{id}/totals", post(recompute_totals))
        .route(
            "/{id}/details",
            get(list_details).post(create_detail).delete(clear_details),
        )
        .route("/{id}/history", get(job_history))
}

pub fn service_details() -> Router<AppState> {
    Router::new().route(
        "/{id}",
        get(get_detail).patch(update_detail).delete(delete_detail),
    )
}

// =============================================================================
// Jobs
// =============================================================================

async fn list_jobs(
    State(state): State<AppState>,
    Query(filter): Query<ServiceJobFilter>,
    Query(page): Query<PageParams>,
) -> ApiResult<Reply<Vec<ServiceJob>>> {
    let jobs = state.db.service_jobs().list(filter, page.into()).await?;
    Ok(ok("Service jobs retrieved", jobs))
}

async fn create_job(
    State(state): State<AppState>,
    Json(input): Json<NewServiceJob>,
) -> ApiResult<Reply<ServiceJob>> {
    let job = state.db.service_jobs().create(input).await?;
    Ok(created("Service job created", job))
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<ServiceJob>> {
    Ok(ok("Service job retrieved", state.db.service_jobs().get(id).await?))
}

async fn update_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateServiceJob>,
) -> ApiResult<Reply<ServiceJob>> {
    let job = state.db.service_jobs().update(id, input).await?;
    Ok(ok("Service job updated", job))
}

async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<Option<()>>> {
    state.db.service_jobs().delete(id).await?;
    Ok(ok("Service job deleted", None))
}

async fn transition_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(change): Json<StatusChange>,
) -> ApiResult<Reply<ServiceJob>> {
    let job = state.db.service_jobs().transition(id, change).await?;
    Ok(ok("Service job status updated", job))
}

async fn recompute_totals(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<ServiceJob>> {
    let job = state.db.service_jobs().recompute_totals(id).await?;
    Ok(ok("Service job totals recomputed", job))
}

async fn job_history(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<Vec<ServiceJobHistory>>> {
    state.db.service_jobs().get(id).await?;
    let history = state.db.service_job_history().list_by_job(id).await?;
    Ok(ok("Service job history retrieved", history))
}

// =============================================================================
// Details
// =============================================================================

async fn list_details(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
) -> ApiResult<Reply<Vec<ServiceDetail>>> {
    state.db.service_jobs().get(job_id).await?;
    let details = state.db.service_details().list_by_job(job_id).await?;
    Ok(ok("Service details retrieved", details))
}

async fn create_detail(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
    Json(input): Json<NewServiceDetail>,
) -> ApiResult<Reply<ServiceDetail>> {
    let detail = state.db.service_details().create(job_id, input).await?;
    Ok(created("Service detail created", detail))
}

async fn clear_details(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
) -> ApiResult<Reply<Cleared>> {
    let removed = state.db.service_details().clear(job_id).await?;
    Ok(ok("Service details cleared", Cleared { removed }))
}

async fn get_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<ServiceDetail>> {
    Ok(ok("Service detail retrieved", state.db.service_details().get(id).await?))
}

async fn update_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateServiceDetail>,
) -> ApiResult<Reply<ServiceDetail>> {
    let detail = state.db.service_details().update(id, input).await?;
    Ok(ok("Service detail updated", detail))
}

async fn delete_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<Option<()>>> {
    state.db.service_details().delete(id).await?;
    Ok(ok("Service detail deleted", None))
}
