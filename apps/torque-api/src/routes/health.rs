//! Liveness probe.

use axum::extract::State;
use serde::Serialize;

use torque_core::ErrorKind;

use crate::error::{ApiError, ApiResult};
use crate::response::{ok, Reply};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct Health {
    pub database: &'static str,
    pub version: &'static str,
}

pub async fn health(State(state): State<AppState>) -> ApiResult<Reply<Health>> {
    if !state.db.health_check().await {
        return Err(ApiError::new(ErrorKind::Downstream, "Database unavailable"));
    }
    Ok(ok(
        "Service healthy",
        Health {
            database: "up",
            version: env!("CARGO_PKG_VERSION"),
        },
    ))
}
