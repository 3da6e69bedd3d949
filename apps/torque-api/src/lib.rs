//! # torque-api: HTTP Edge for Torque POS
//!
//! Thin JSON-over-HTTP shell over `torque-db`: parse the request, call the
//! repository, wrap the result in the envelope.
//!
//! ## Request Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Request Lifecycle                                │
//! │                                                                         │
//! │  TCP ──► TraceLayer ──► TimeoutLayer ──► Router ──► Handler            │
//! │                              │                        │                 │
//! │                              │ elapsed:               │ State<AppState> │
//! │                              │ future dropped,        ▼                 │
//! │                              │ open tx rolls back   Repository          │
//! │                              ▼                        │                 │
//! │                         408 empty body                ▼                 │
//! │                                              Envelope / ApiError        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod extract;
pub mod response;
pub mod routes;
pub mod state;

use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use config::{ApiConfig, ConfigError};
pub use error::{ApiError, ApiResult};
pub use state::AppState;

/// Builds the application with its middleware stack.
pub fn build_router(state: AppState) -> Router {
    let timeout = state.config.request_timeout();

    routes::router()
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    use torque_core::FixedClock;
    use torque_db::{Database, DbConfig};

    async fn app() -> Router {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap(),
        ));
        let db = Database::new(DbConfig::in_memory())
            .await
            .unwrap()
            .with_clock(clock);
        build_router(AppState::new(db, ApiConfig::default()))
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    /// Outlet, technician, customer and bike; returns their ids.
    async fn workshop(app: &Router) -> (i64, i64, i64, i64) {
        let (status, outlet) =
            send(app, Method::POST, "/outlets", Some(json!({"name": "Main"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        let outlet_id = outlet["data"]["id"].as_i64().unwrap();

        let (status, tech) = send(
            app,
            Method::POST,
            "/users",
            Some(json!({
                "name": "Tech",
                "email": "Tech@Torque.test",
                "password": "workshop-secret",
                "role": "technician",
                "outlet_id": outlet_id
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(tech["data"]["email"], "tech@torque.test");
        assert!(tech["data"].get("password_hash").is_none());
        let tech_id = tech["data"]["id"].as_i64().unwrap();

        let (_, customer) = send(
            app,
            Method::POST,
            "/customers",
            Some(json!({"name": "Budi", "phone": "081234567890"})),
        )
        .await;
        let customer_id = customer["data"]["id"].as_i64().unwrap();

        let (status, bike) = send(
            app,
            Method::POST,
            "/customer-vehicles",
            Some(json!({
                "customer_id": customer_id,
                "plate_number": "B 1234 XYZ",
                "chassis_number": "MH1JFM1234",
                "engine_number": "JFM1E1234",
                "brand": "Honda",
                "model": "Vario"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let bike_id = bike["data"]["id"].as_i64().unwrap();

        (outlet_id, tech_id, customer_id, bike_id)
    }

    #[tokio::test]
    async fn test_health() {
        let app = app().await;
        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"]["database"], "up");
    }

    #[tokio::test]
    async fn test_envelope_and_input_errors() {
        let app = app().await;

        let (status, body) =
            send(&app, Method::POST, "/outlets", Some(json!({"name": "North"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "success");
        assert_eq!(body["message"], "Outlet created");
        let id = body["data"]["id"].as_i64().unwrap();

        let (status, body) = send(&app, Method::GET, &format!("/outlets/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "North");

        let (status, body) = send(&app, Method::GET, "/outlets/999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"], "NOT_FOUND");
        assert!(body["data"].is_null());

        let (status, body) = send(&app, Method::GET, "/outlets/abc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_INPUT");

        let (status, body) =
            send(&app, Method::POST, "/outlets", Some(json!({"city": "Bandung"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_INPUT");

        let (status, body) = send(&app, Method::GET, "/nowhere", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_conflict_and_integrity() {
        let app = app().await;
        let (_, _, customer_id, _) = workshop(&app).await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/customers",
            Some(json!({"name": "Other", "phone": "081234567890"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "CONFLICT");

        let (status, body) =
            send(&app, Method::DELETE, &format!("/customers/{}", customer_id), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "INTEGRITY");
    }

    #[tokio::test]
    async fn test_service_job_lifecycle() {
        let app = app().await;
        let (outlet_id, tech_id, customer_id, bike_id) = workshop(&app).await;

        let (status, job) = send(
            &app,
            Method::POST,
            "/service-jobs",
            Some(json!({
                "outlet_id": outlet_id,
                "customer_id": customer_id,
                "vehicle_id": bike_id,
                "received_by": tech_id,
                "problem_description": "Engine noise"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(job["data"]["queue_number"], 1);
        assert_eq!(job["data"]["status"], "queued");
        let job_id = job["data"]["id"].as_i64().unwrap();

        // queued → done skips the bench
        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/service-jobs/{}/status", job_id),
            Some(json!({"status": "done", "user_id": tech_id})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_TRANSITION");

        // nobody assigned yet
        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/service-jobs/{}/status", job_id),
            Some(json!({"status": "working", "user_id": tech_id})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_STATE");

        let (status, _) = send(
            &app,
            Method::PATCH,
            &format!("/service-jobs/{}", job_id),
            Some(json!({"technician_id": tech_id})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/service-jobs/{}/status", job_id),
            Some(json!({"status": "working", "user_id": tech_id, "notes": "on the lift"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "working");

        let (_, history) =
            send(&app, Method::GET, &format!("/service-jobs/{}/history", job_id), None).await;
        let entries = history["data"].as_array().unwrap();
        assert_eq!(entries.last().unwrap()["status"], "working");

        let (status, body) = send(
            &app,
            Method::GET,
            &format!("/service-jobs?status=working&outlet_id={}", outlet_id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (_, queue) =
            send(&app, Method::GET, &format!("/outlets/{}/queue", outlet_id), None).await;
        assert_eq!(queue["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_stock() {
        let app = app().await;
        let (_, product) = send(
            &app,
            Method::POST,
            "/products",
            Some(json!({
                "name": "Spark Plug",
                "cost_price_cents": 1800,
                "selling_price_cents": 3000,
                "stock": 2
            })),
        )
        .await;
        let id = product["data"]["id"].as_i64().unwrap();

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/products/{}/stock", id),
            Some(json!({"delta": -3})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "INSUFFICIENT_STOCK");

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/products/{}/stock", id),
            Some(json!({"delta": -2})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["stock"], 0);

        let (_, low) = send(&app, Method::GET, "/products/low-stock?threshold=0", None).await;
        assert_eq!(low["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cash_flow_summary_query() {
        let app = app().await;
        let (outlet_id, user_id, _, _) = workshop(&app).await;

        for (flow_type, cents, date) in [
            ("inflow", 50_000, "2024-01-10"),
            ("outflow", 12_000, "2024-01-12"),
            ("inflow", 99_000, "2023-12-30"),
        ] {
            let (status, _) = send(
                &app,
                Method::POST,
                "/cash-flows",
                Some(json!({
                    "outlet_id": outlet_id,
                    "flow_type": flow_type,
                    "source": "counter",
                    "amount_cents": cents,
                    "flow_date": date,
                    "user_id": user_id
                })),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, body) = send(
            &app,
            Method::GET,
            &format!("/cash-flows/summary?outlet_id={}&from=2024-01-01", outlet_id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["inflow_cents"], 50_000);
        assert_eq!(body["data"]["outflow_cents"], 12_000);
        assert_eq!(body["data"]["net_cents"], 38_000);

        let (status, body) = send(&app, Method::GET, "/cash-flows?from=someday", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_INPUT");
    }
}
