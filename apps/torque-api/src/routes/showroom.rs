//! Showroom stock and its reconditioning jobs.

use axum::extract::State;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;

use torque_core::{
    CompleteReconditioning, NewReconditioningDetail, NewReconditioningJob, NewVehicle,
    ReconditioningDetail, ReconditioningStatus, UpdateReconditioningDetail,
    UpdateReconditioningJob, UpdateVehicle, Vehicle, VehicleOwnership,
    VehicleReconditioningJob, VehicleSale, VehicleSaleStatus,
};

use crate::error::ApiResult;
use crate::extract::{Json, PageParams, Path, Query};
use crate::response::{created, ok, Reply};
use crate::state::AppState;

/// `?q=` searches; otherwise the ownership and sale-status filters apply.
#[derive(Debug, Default, Deserialize)]
pub struct VehicleQuery {
    pub q: Option<String>,
    pub ownership: Option<VehicleOwnership>,
    pub sale_status: Option<VehicleSaleStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReconditioningQuery {
    pub vehicle_id: Option<i64>,
    pub status: Option<ReconditioningStatus>,
}

pub fn vehicles() -> Router<AppState> {
    Router::new()
        .route("/", get(list_vehicles).post(create_vehicle))
        .route(
            "/{id}",
            get(get_vehicle).patch(update_vehicle).delete(delete_vehicle),
        )
        .route("/{id}/reconditioning-jobs", get(vehicle_reconditioning))
        .route("/{id}/sales", get(vehicle_sales))
}

pub fn reconditioning_jobs() -> Router<AppState> {
    Router::new()
        .route("/", get(list_jobs).post(create_job))
        .route("/{id}", get(get_job).patch(update_job))
        .route("/{id}/start", post(start_job))
        .route("/{id}/complete", post(complete_job))
        .route("/{id}/cancel", post(cancel_job))
        .route("/{id}/details", get(list_details).post(add_detail))
}

pub fn reconditioning_details() -> Router<AppState> {
    Router::new().route(
        "/{id}",
        get(get_detail).patch(update_detail).delete(delete_detail),
    )
}

// =============================================================================
// Vehicles
// =============================================================================

async fn list_vehicles(
    State(state): State<AppState>,
    Query(query): Query<VehicleQuery>,
    Query(page): Query<PageParams>,
) -> ApiResult<Reply<Vec<Vehicle>>> {
    let repo = state.db.vehicles();
    let vehicles = match query.q.as_deref() {
        Some(q) => repo.search(q, page.into()).await?,
        None => {
            repo.list(query.ownership, query.sale_status, page.into())
                .await?
        }
    };
    Ok(ok("Vehicles retrieved", vehicles))
}

async fn create_vehicle(
    State(state): State<AppState>,
    Json(input): Json<NewVehicle>,
) -> ApiResult<Reply<Vehicle>> {
    Ok(created("Vehicle created", state.db.vehicles().create(input).await?))
}

async fn get_vehicle(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<Vehicle>> {
    Ok(ok("Vehicle retrieved", state.db.vehicles().get(id).await?))
}

async fn update_vehicle(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateVehicle>,
) -> ApiResult<Reply<Vehicle>> {
    Ok(ok("Vehicle updated", state.db.vehicles().update(id, input).await?))
}

async fn delete_vehicle(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<Option<()>>> {
    state.db.vehicles().delete(id).await?;
    Ok(ok("Vehicle deleted", None))
}

async fn vehicle_reconditioning(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<Vec<VehicleReconditioningJob>>> {
    state.db.vehicles().get(id).await?;
    let jobs = state.db.reconditioning().list_by_vehicle(id).await?;
    Ok(ok("Reconditioning jobs retrieved", jobs))
}

async fn vehicle_sales(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<Vec<VehicleSale>>> {
    Ok(ok("Sales retrieved", state.db.sales().list_by_vehicle(id).await?))
}

// =============================================================================
// Reconditioning Jobs
// =============================================================================

async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ReconditioningQuery>,
    Query(page): Query<PageParams>,
) -> ApiResult<Reply<Vec<VehicleReconditioningJob>>> {
    let jobs = state
        .db
        .reconditioning()
        .list(query.vehicle_id, query.status, page.into())
        .await?;
    Ok(ok("Reconditioning jobs retrieved", jobs))
}

async fn create_job(
    State(state): State<AppState>,
    Json(input): Json<NewReconditioningJob>,
) -> ApiResult<Reply<VehicleReconditioningJob>> {
    let job = state.db.reconditioning().create(input).await?;
    Ok(created("Reconditioning job created", job))
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<VehicleReconditioningJob>> {
    let job = state.db.reconditioning().get(id).await?;
    Ok(ok("Reconditioning job retrieved", job))
}

async fn update_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateReconditioningJob>,
) -> ApiResult<Reply<VehicleReconditioningJob>> {
    let job = state.db.reconditioning().update(id, input).await?;
    Ok(ok("Reconditioning job updated", job))
}

async fn start_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<VehicleReconditioningJob>> {
    let job = state.db.reconditioning().start(id).await?;
    Ok(ok("Reconditioning job started", job))
}

/// Body may be `{}`; `actual_cost_cents` overrides the sum of the lines.
async fn complete_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<CompleteReconditioning>,
) -> ApiResult<Reply<VehicleReconditioningJob>> {
    let job = state.db.reconditioning().complete(id, input).await?;
    Ok(ok("Reconditioning job completed", job))
}

async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<VehicleReconditioningJob>> {
    let job = state.db.reconditioning().cancel(id).await?;
    Ok(ok("Reconditioning job cancelled", job))
}

// =============================================================================
// Reconditioning Details
// =============================================================================

async fn list_details(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
) -> ApiResult<Reply<Vec<ReconditioningDetail>>> {
    state.db.reconditioning().get(job_id).await?;
    let details = state.db.reconditioning().list_details(job_id).await?;
    Ok(ok("Reconditioning details retrieved", details))
}

async fn add_detail(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
    Json(input): Json<NewReconditioningDetail>,
) -> ApiResult<Reply<ReconditioningDetail>> {
    let detail = state.db.reconditioning().add_detail(job_id, input).await?;
    Ok(created("Reconditioning detail created", detail))
}

async fn get_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<ReconditioningDetail>> {
    let detail = state.db.reconditioning().get_detail(id).await?;
    Ok(ok("Reconditioning detail retrieved", detail))
}

async fn update_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateReconditioningDetail>,
) -> ApiResult<Reply<ReconditioningDetail>> {
    let detail = state.db.reconditioning().update_detail(id, input).await?;
    Ok(ok("Reconditioning detail updated", detail))
}

async fn delete_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<Option<()>>> {
    state.db.reconditioning().delete_detail(id).await?;
    Ok(ok("Reconditioning detail deleted", None))
}
