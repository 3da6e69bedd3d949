//! Products, serial numbers and the labour catalog.

use axum::extract::State;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;

use torque_core::{
    NewProduct, NewSerialNumber, NewService, Product, ProductFilter, ProductSerialNumber,
    SerialStatus, Service, UpdateProduct, UpdateService,
};

use crate::error::ApiResult;
use crate::extract::{Json, PageParams, Path, Query};
use crate::response::{created, ok, Reply};
use crate::state::AppState;

use super::registry::SearchQuery;

/// `?q=` switches the product list to a search; the filters apply otherwise.
#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StockAdjustment {
    pub delta: i64,
}

#[derive(Debug, Deserialize)]
pub struct LowStockQuery {
    #[serde(default = "default_threshold")]
    pub threshold: i64,
}

fn default_threshold() -> i64 {
    5
}

#[derive(Debug, Default, Deserialize)]
pub struct SerialQuery {
    pub status: Option<SerialStatus>,
}

#[derive(Debug, Deserialize)]
pub struct SerialTransition {
    pub status: SerialStatus,
}

pub fn products() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/low-stock", get(low_stock))
        .route("/sku/{sku}", get(product_by_sku))
        .route("/barcode/{barcode}", get(product_by_barcode))
        .route(
            "/{id}",
            get(get_product).patch(update_product).delete(delete_product),
        )
        .route("/{id}/restore", post(restore_product))
        .route("/{id}/stock", post(adjust_stock))
        .route("/{id}/serials", get(list_serials).post(create_serial))
}

pub fn serial_numbers() -> Router<AppState> {
    Router::new()
        .route("/serial/{serial}", get(serial_by_number))
        .route("/{id}", get(get_serial).delete(delete_serial))
        .route("/{id}/status", post(transition_serial))
        .route("/{id}/restore", post(restore_serial))
        .route("/{id}/undelete", post(undelete_serial))
}

pub fn services() -> Router<AppState> {
    Router::new()
        .route("/", get(list_services).post(create_service))
        .route(
            "/{id}",
            get(get_service).patch(update_service).delete(delete_service),
        )
}

// =============================================================================
// Products
// =============================================================================

async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
    Query(filter): Query<ProductFilter>,
    Query(page): Query<PageParams>,
) -> ApiResult<Reply<Vec<Product>>> {
    let products = match query.q.as_deref() {
        Some(q) => state.db.products().search(q, page.into()).await?,
        None => state.db.products().list(filter, page.into()).await?,
    };
    Ok(ok("Products retrieved", products))
}

async fn create_product(
    State(state): State<AppState>,
    Json(input): Json<NewProduct>,
) -> ApiResult<Reply<Product>> {
    Ok(created("Product created", state.db.products().create(input).await?))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<Product>> {
    Ok(ok("Product retrieved", state.db.products().get(id).await?))
}

async fn product_by_sku(
    State(state): State<AppState>,
    Path(sku): Path<String>,
) -> ApiResult<Reply<Product>> {
    Ok(ok("Product retrieved", state.db.products().get_by_sku(&sku).await?))
}

async fn product_by_barcode(
    State(state): State<AppState>,
    Path(barcode): Path<String>,
) -> ApiResult<Reply<Product>> {
    let product = state.db.products().get_by_barcode(&barcode).await?;
    Ok(ok("Product retrieved", product))
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateProduct>,
) -> ApiResult<Reply<Product>> {
    Ok(ok("Product updated", state.db.products().update(id, input).await?))
}

async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<Option<()>>> {
    state.db.products().delete(id).await?;
    Ok(ok("Product deleted", None))
}

async fn restore_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<Product>> {
    Ok(ok("Product restored", state.db.products().restore(id).await?))
}

async fn adjust_stock(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<StockAdjustment>,
) -> ApiResult<Reply<Product>> {
    let product = state.db.products().update_stock(id, input.delta).await?;
    Ok(ok("Stock updated", product))
}

async fn low_stock(
    State(state): State<AppState>,
    Query(query): Query<LowStockQuery>,
) -> ApiResult<Reply<Vec<Product>>> {
    let products = state.db.products().low_stock(query.threshold).await?;
    Ok(ok("Low stock products retrieved", products))
}

// =============================================================================
// Serial Numbers
// =============================================================================

async fn list_serials(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
    Query(query): Query<SerialQuery>,
) -> ApiResult<Reply<Vec<ProductSerialNumber>>> {
    let serials = state
        .db
        .serial_numbers()
        .list_by_product(product_id, query.status)
        .await?;
    Ok(ok("Serial numbers retrieved", serials))
}

async fn create_serial(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
    Json(input): Json<NewSerialNumber>,
) -> ApiResult<Reply<ProductSerialNumber>> {
    let serial = state.db.serial_numbers().create(product_id, input).await?;
    Ok(created("Serial number created", serial))
}

async fn get_serial(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<ProductSerialNumber>> {
    Ok(ok("Serial number retrieved", state.db.serial_numbers().get(id).await?))
}

async fn serial_by_number(
    State(state): State<AppState>,
    Path(serial): Path<String>,
) -> ApiResult<Reply<ProductSerialNumber>> {
    let serial = state.db.serial_numbers().get_by_serial(&serial).await?;
    Ok(ok("Serial number retrieved", serial))
}

async fn transition_serial(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<SerialTransition>,
) -> ApiResult<Reply<ProductSerialNumber>> {
    let serial = state.db.serial_numbers().transition(id, input.status).await?;
    Ok(ok("Serial number updated", serial))
}

async fn restore_serial(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<ProductSerialNumber>> {
    let serial = state.db.serial_numbers().restore(id).await?;
    Ok(ok("Serial number available again", serial))
}

async fn delete_serial(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<Option<()>>> {
    state.db.serial_numbers().delete(id).await?;
    Ok(ok("Serial number deleted", None))
}

async fn undelete_serial(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<ProductSerialNumber>> {
    let serial = state.db.serial_numbers().undelete(id).await?;
    Ok(ok("Serial number restored", serial))
}

// =============================================================================
// Service Catalog
// =============================================================================

async fn list_services(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
    Query(page): Query<PageParams>,
) -> ApiResult<Reply<Vec<Service>>> {
    let services = if query.q.trim().is_empty() {
        state.db.services().list(page.into()).await?
    } else {
        state.db.services().search(&query.q, page.into()).await?
    };
    Ok(ok("Services retrieved", services))
}

async fn create_service(
    State(state): State<AppState>,
    Json(input): Json<NewService>,
) -> ApiResult<Reply<Service>> {
    Ok(created("Service created", state.db.services().create(input).await?))
}

async fn get_service(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<Service>> {
    Ok(ok("Service retrieved", state.db.services().get(id).await?))
}

async fn update_service(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateService>,
) -> ApiResult<Reply<Service>> {
    Ok(ok("Service updated", state.db.services().update(id, input).await?))
}

async fn delete_service(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<Option<()>>> {
    state.db.services().delete(id).await?;
    Ok(ok("Service deleted", None))
}
