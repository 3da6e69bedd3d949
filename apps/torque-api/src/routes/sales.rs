//! Vehicle sales, installment plans and the cash book.

use axum::extract::State;
use axum::routing::{get, post};
use axum::Router;
use chrono::NaiveDate;
use serde::Deserialize;

use torque_core::{
    CashFlow, CashFlowFilter, CashFlowSummary, Clock, InstallmentPayment, NewCashFlow,
    NewVehicleSale, PayInstallment, SaleReceipt, UpdateCashFlow, UpdateVehicleSale,
    VehicleInstallment, VehicleSale,
};

use crate::error::ApiResult;
use crate::extract::{Json, PageParams, Path, Query};
use crate::response::{created, ok, Reply};
use crate::state::AppState;

/// Overdue cut-off, today (UTC) when absent.
#[derive(Debug, Default, Deserialize)]
pub struct OverdueQuery {
    pub date: Option<NaiveDate>,
}

pub fn sales() -> Router<AppState> {
    Router::new()
        .route("/", get(list_sales).post(sell_vehicle))
        .route("/{id}", get(get_sale).patch(update_sale))
        .route("/{id}/installment", get(sale_installment))
}

pub fn installments() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(get_installment))
        .route("/{id}/payments", get(list_installment_payments))
        .route("/{id}/write-off", post(write_off))
}

pub fn installment_payments() -> Router<AppState> {
    Router::new()
        .route("/overdue", get(overdue_payments))
        .route("/{id}", get(get_payment))
        .route("/{id}/pay", post(pay_installment))
}

pub fn cash_flows() -> Router<AppState> {
    Router::new()
        .route("/", get(list_cash_flows).post(record_cash_flow))
        .route("/summary", get(cash_flow_summary))
        .route(
            "/{id}",
            get(get_cash_flow)
                .patch(update_cash_flow)
                .delete(delete_cash_flow),
        )
}

// =============================================================================
// Sales
// =============================================================================

async fn list_sales(
    State(state): State<AppState>,
    Query(page): Query<PageParams>,
) -> ApiResult<Reply<Vec<VehicleSale>>> {
    Ok(ok("Sales retrieved", state.db.sales().list(page.into()).await?))
}

/// Cash or installment sale. The receipt carries the generated schedule.
async fn sell_vehicle(
    State(state): State<AppState>,
    Json(input): Json<NewVehicleSale>,
) -> ApiResult<Reply<SaleReceipt>> {
    let receipt = state.db.sales().sell(input).await?;
    Ok(created("Vehicle sold", receipt))
}

async fn get_sale(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<VehicleSale>> {
    Ok(ok("Sale retrieved", state.db.sales().get(id).await?))
}

async fn update_sale(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateVehicleSale>,
) -> ApiResult<Reply<VehicleSale>> {
    Ok(ok("Sale updated", state.db.sales().update(id, input).await?))
}

async fn sale_installment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<VehicleInstallment>> {
    let installment = state.db.installments().get_by_sale(id).await?;
    Ok(ok("Installment retrieved", installment))
}

// =============================================================================
// Installments
// =============================================================================

async fn get_installment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<VehicleInstallment>> {
    Ok(ok("Installment retrieved", state.db.installments().get(id).await?))
}

async fn list_installment_payments(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<Vec<InstallmentPayment>>> {
    state.db.installments().get(id).await?;
    let payments = state.db.installments().payments(id).await?;
    Ok(ok("Installment payments retrieved", payments))
}

async fn write_off(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<VehicleInstallment>> {
    let installment = state.db.installments().write_off(id).await?;
    Ok(ok("Installment written off", installment))
}

async fn overdue_payments(
    State(state): State<AppState>,
    Query(query): Query<OverdueQuery>,
) -> ApiResult<Reply<Vec<InstallmentPayment>>> {
    let today = query.date.unwrap_or_else(|| state.db.clock().today());
    let payments = state.db.installments().overdue(today).await?;
    Ok(ok("Overdue payments retrieved", payments))
}

async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<InstallmentPayment>> {
    let payment = state.db.installments().get_payment(id).await?;
    Ok(ok("Installment payment retrieved", payment))
}

async fn pay_installment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<PayInstallment>,
) -> ApiResult<Reply<InstallmentPayment>> {
    let payment = state.db.installments().pay(id, input).await?;
    Ok(ok("Installment payment recorded", payment))
}

// =============================================================================
// Cash Flows
// =============================================================================

async fn list_cash_flows(
    State(state): State<AppState>,
    Query(filter): Query<CashFlowFilter>,
    Query(page): Query<PageParams>,
) -> ApiResult<Reply<Vec<CashFlow>>> {
    let flows = state.db.cash_flows().list(&filter, page.into()).await?;
    Ok(ok("Cash flows retrieved", flows))
}

async fn record_cash_flow(
    State(state): State<AppState>,
    Json(input): Json<NewCashFlow>,
) -> ApiResult<Reply<CashFlow>> {
    let flow = state.db.cash_flows().record(input).await?;
    Ok(created("Cash flow recorded", flow))
}

async fn cash_flow_summary(
    State(state): State<AppState>,
    Query(filter): Query<CashFlowFilter>,
) -> ApiResult<Reply<CashFlowSummary>> {
    let summary = state.db.cash_flows().summary(&filter).await?;
    Ok(ok("Cash flow summary retrieved", summary))
}

async fn get_cash_flow(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<CashFlow>> {
    Ok(ok("Cash flow retrieved", state.db.cash_flows().get(id).await?))
}

async fn update_cash_flow(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateCashFlow>,
) -> ApiResult<Reply<CashFlow>> {
    let flow = state.db.cash_flows().update(id, input).await?;
    Ok(ok("Cash flow updated", flow))
}

async fn delete_cash_flow(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Reply<Option<()>>> {
    state.db.cash_flows().delete(id).await?;
    Ok(ok("Cash flow deleted", None))
}
