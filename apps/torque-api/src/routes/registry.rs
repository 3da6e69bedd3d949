//! Outlets, staff, customers and their vehicles.
//!
//! The outlet router also carries the service queue: it is the outlet's
//! queue, reordered per outlet.

use axum::extract::State;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;

use torque_core::{
    ChangePassword, Customer, CustomerVehicle, NewCustomer, NewCustomerVehicle, NewOutlet,
    NewUser, Outlet, OutletStatus, ServiceJob, UpdateCustomer, UpdateCustomerVehicle,
    UpdateOutlet, UpdateUser, User, VehicleSale,
};

use crate::error::ApiResult;
use crate::extract::{Json, PageParams, Path, Query};
use crate::response::{created, ok, Reply};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct OutletQuery {
    pub status: Option<OutletStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub outlet_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

pub fn outlets() -> Router<AppState> {
    Router::new()
        .route("/", get(list_outlets).post(create_outlet))
        .route(
            "/{id}",
            get(get_outlet).patch(update_outlet).delete(delete_outlet),
        )
        .route("/{id}/queue", get(outlet_queue))
        .route("/{id}/queue/today", get(outlet_today_queue))
        .route("/{id}/queue/reorder", post(reorder_queue))
}

pub fn users() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/{id}", get(get_user).patch(update_user).delete(delete_user))
        .route("/{id}/password", post(change_password))
}

pub fn customers() -> Router<AppState> {
    Router::new()
        .route("/", get(list_customers).post(create_customer))
        .route("/search", get(search_customers))
        .route("/phone/{phone}", get(customer_by_phone))
        .route(
            "/{id}",
            get(get_customer)
                .patch(update_customer)
                .delete(delete_customer),
        )
        .route("/{id}/restore", post(restore_customer))
        .route("/{id}/vehicles", get(customer_vehicles_of))
        .route("/{id}/service-jobs", get(customer_service_jobs))
        .route("/{id}/sales", get(customer_sales))
}

pub fn customer_vehicles() -> Router<AppState> {
    Router::new()
        .route("/", get(search_customer_vehicles).post(create_customer_vehicle))
        .route("/search", get(search_customer_vehicles))
        .route("/plate/{plate}", get(customer_vehicle_by_plate))
        .route("/chassis/{chassis}", get(customer_vehicle_by_chassis))
        .route("/engine/{engine}", get(customer_vehicle_by_engine))
        .route(
            "/{id}",
            get(get_customer_vehicle)
                .patch(update_customer_vehicle)
                .delete(delete_customer_vehicle),
        )
        .route("/{id}/restore", post(restore_customer_vehicle))
}

// =============================================================================
// Outlets
// =============================================================================

async fn list_outlets(
    State(state): State<AppState>,
    Query(query): Query<OutletQuery>,
    Query(page): Query<PageParams>,
) -> ApiResult<Reply<Vec<Outlet>>> {
    let outlets = state.db.outlets().list(query.status, page.into()).await?;
    Ok(ok("Outlets retrieved", outlets))
}

async fn create_outlet(
    State(state): State<AppState>,
    Json(input): Json<NewOutlet>,
) -> ApiResult<Reply<Outlet>> {
    let outlet = state.db.outlets().create(input).await?;
    Ok(created("Outlet created", outlet))
}

async fn get_outlet(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<Outlet>> {
    Ok(ok("Outlet retrieved", state.db.outlets().get(id).await?))
}

async fn update_outlet(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateOutlet>,
) -> ApiResult<Reply<Outlet>> {
    Ok(ok("Outlet updated", state.db.outlets().update(id, input).await?))
}

async fn delete_outlet(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<Option<()>>> {
    state.db.outlets().delete(id).await?;
    Ok(ok("Outlet deleted", None))
}

async fn outlet_queue(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<Vec<ServiceJob>>> {
    Ok(ok("Queue retrieved", state.db.service_jobs().queue(id).await?))
}

async fn outlet_today_queue(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<Vec<ServiceJob>>> {
    let jobs = state.db.service_jobs().today_queue(id).await?;
    Ok(ok("Today's queue retrieved", jobs))
}

/// Body is the job ids in their new order.
async fn reorder_queue(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(ids): Json<Vec<i64>>,
) -> ApiResult<Reply<Vec<ServiceJob>>> {
    let jobs = state.db.service_jobs().reorder(id, &ids).await?;
    Ok(ok("Queue reordered", jobs))
}

// =============================================================================
// Users
// =============================================================================

async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
    Query(page): Query<PageParams>,
) -> ApiResult<Reply<Vec<User>>> {
    let users = state.db.users().list(query.outlet_id, page.into()).await?;
    Ok(ok("Users retrieved", users))
}

async fn create_user(
    State(state): State<AppState>,
    Json(input): Json<NewUser>,
) -> ApiResult<Reply<User>> {
    Ok(created("User created", state.db.users().create(input).await?))
}

async fn get_user(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Reply<User>> {
    Ok(ok("User retrieved", state.db.users().get(id).await?))
}

async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateUser>,
) -> ApiResult<Reply<User>> {
    Ok(ok("User updated", state.db.users().update(id, input).await?))
}

async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<Option<()>>> {
    state.db.users().delete(id).await?;
    Ok(ok("User deleted", None))
}

async fn change_password(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<ChangePassword>,
) -> ApiResult<Reply<Option<()>>> {
    state.db.users().change_password(id, input).await?;
    Ok(ok("Password changed", None))
}

// =============================================================================
// Customers
// =============================================================================

async fn list_customers(
    State(state): State<AppState>,
    Query(page): Query<PageParams>,
) -> ApiResult<Reply<Vec<Customer>>> {
    Ok(ok("Customers retrieved", state.db.customers().list(page.into()).await?))
}

async fn search_customers(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
    Query(page): Query<PageParams>,
) -> ApiResult<Reply<Vec<Customer>>> {
    let customers = state.db.customers().search(&query.q, page.into()).await?;
    Ok(ok("Customers retrieved", customers))
}

async fn create_customer(
    State(state): State<AppState>,
    Json(input): Json<NewCustomer>,
) -> ApiResult<Reply<Customer>> {
    Ok(created("Customer created", state.db.customers().create(input).await?))
}

async fn get_customer(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<Customer>> {
    Ok(ok("Customer retrieved", state.db.customers().get(id).await?))
}

async fn customer_by_phone(
    State(state): State<AppState>,
    Path(phone): Path<String>,
) -> ApiResult<Reply<Customer>> {
    let customer = state.db.customers().get_by_phone(&phone).await?;
    Ok(ok("Customer retrieved", customer))
}

async fn update_customer(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateCustomer>,
) -> ApiResult<Reply<Customer>> {
    Ok(ok("Customer updated", state.db.customers().update(id, input).await?))
}

async fn delete_customer(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<Option<()>>> {
    state.db.customers().delete(id).await?;
    Ok(ok("Customer deleted", None))
}

async fn restore_customer(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<Customer>> {
    Ok(ok("Customer restored", state.db.customers().restore(id).await?))
}

async fn customer_vehicles_of(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<Vec<CustomerVehicle>>> {
    state.db.customers().get(id).await?;
    let vehicles = state.db.customer_vehicles().list_by_customer(id).await?;
    Ok(ok("Customer vehicles retrieved", vehicles))
}

async fn customer_service_jobs(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(page): Query<PageParams>,
) -> ApiResult<Reply<Vec<ServiceJob>>> {
    let jobs = state
        .db
        .service_jobs()
        .list_by_customer(id, page.into())
        .await?;
    Ok(ok("Service jobs retrieved", jobs))
}

async fn customer_sales(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<Vec<VehicleSale>>> {
    let sales = state.db.sales().list_by_customer(id).await?;
    Ok(ok("Sales retrieved", sales))
}

// =============================================================================
// Customer Vehicles
// =============================================================================

async fn search_customer_vehicles(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
    Query(page): Query<PageParams>,
) -> ApiResult<Reply<Vec<CustomerVehicle>>> {
    let vehicles = state
        .db
        .customer_vehicles()
        .search(&query.q, page.into())
        .await?;
    Ok(ok("Customer vehicles retrieved", vehicles))
}

async fn create_customer_vehicle(
    State(state): State<AppState>,
    Json(input): Json<NewCustomerVehicle>,
) -> ApiResult<Reply<CustomerVehicle>> {
    let vehicle = state.db.customer_vehicles().create(input).await?;
    Ok(created("Customer vehicle created", vehicle))
}

async fn get_customer_vehicle(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<CustomerVehicle>> {
    let vehicle = state.db.customer_vehicles().get(id).await?;
    Ok(ok("Customer vehicle retrieved", vehicle))
}

async fn customer_vehicle_by_plate(
    State(state): State<AppState>,
    Path(plate): Path<String>,
) -> ApiResult<Reply<CustomerVehicle>> {
    let vehicle = state.db.customer_vehicles().get_by_plate(&plate).await?;
    Ok(ok("Customer vehicle retrieved", vehicle))
}

async fn customer_vehicle_by_chassis(
    State(state): State<AppState>,
    Path(chassis): Path<String>,
) -> ApiResult<Reply<CustomerVehicle>> {
    let vehicle = state.db.customer_vehicles().get_by_chassis(&chassis).await?;
    Ok(ok("Customer vehicle retrieved", vehicle))
}

async fn customer_vehicle_by_engine(
    State(state): State<AppState>,
    Path(engine): Path<String>,
) -> ApiResult<Reply<CustomerVehicle>> {
    let vehicle = state.db.customer_vehicles().get_by_engine(&engine).await?;
    Ok(ok("Customer vehicle retrieved", vehicle))
}

async fn update_customer_vehicle(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateCustomerVehicle>,
) -> ApiResult<Reply<CustomerVehicle>> {
    let vehicle = state.db.customer_vehicles().update(id, input).await?;
    Ok(ok("Customer vehicle updated", vehicle))
}

async fn delete_customer_vehicle(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<Option<()>>> {
    state.db.customer_vehicles().delete(id).await?;
    Ok(ok("Customer vehicle deleted", None))
}

async fn restore_customer_vehicle(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<CustomerVehicle>> {
    let vehicle = state.db.customer_vehicles().restore(id).await?;
    Ok(ok("Customer vehicle restored", vehicle))
}
