//! # Routes
//!
//! One router per area, nested under its noun.
//!
//! ```text
//! /outlets            registry      /service-jobs          service_jobs
//! /users              registry      /service-details       service_jobs
//! /customers          registry      /vehicles              showroom
//! /customer-vehicles  registry      /reconditioning-jobs   showroom
//! /products           inventory     /reconditioning-details showroom
//! /serial-numbers     inventory     /sales                 sales
//! /services           inventory     /installments          sales
//! /health             health        /installment-payments  sales
//!                                   /cash-flows            sales
//! ```

pub mod health;
pub mod inventory;
pub mod registry;
pub mod sales;
pub mod service_jobs;
pub mod showroom;

use axum::http::Uri;
use axum::routing::get;
use axum::Router;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .nest("/outlets", registry::outlets())
        .nest("/users", registry::users())
        .nest("/customers", registry::customers())
        .nest("/customer-vehicles", registry::customer_vehicles())
        .nest("/products", inventory::products())
        .nest("/serial-numbers", inventory::serial_numbers())
        .nest("/services", inventory::services())
        .nest("/service-jobs", service_jobs::service_jobs())
        .nest("/service-details", service_jobs::service_details())
        .nest("/vehicles", showroom::vehicles())
        .nest("/reconditioning-jobs", showroom::reconditioning_jobs())
        .nest("/reconditioning-details", showroom::reconditioning_details())
        .nest("/sales", sales::sales())
        .nest("/installments", sales::installments())
        .nest("/installment-payments", sales::installment_payments())
        .nest("/cash-flows", sales::cash_flows())
        .fallback(not_found)
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(format!("No route for {}", uri.path()))
}
