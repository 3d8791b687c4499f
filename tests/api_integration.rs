//! Integration tests for the taxishift HTTP API.
//!
//! These tests verify the full request/response cycle through the router.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum_test::TestServer;
use serde_json::json;
use tower::ServiceExt;

use taxishift::api::{AppState, router};
use taxishift::app::App;
use taxishift::config::CoreConfig;
use taxishift::scoring::{DisabledScorer, FixedScorer, TripScorer};
use taxishift::storage::Storage;

async fn create_state(scorer: Arc<dyn TripScorer>) -> AppState {
    let storage = Storage::new("sqlite::memory:").await.unwrap();
    AppState {
        app: App::new(storage, &CoreConfig::default(), scorer),
    }
}

async fn create_test_server() -> TestServer {
    let state = create_state(Arc::new(DisabledScorer)).await;
    TestServer::new(router(state)).unwrap()
}

fn ride_body() -> serde_json::Value {
    json!({
        "start_lat": 53.3498,
        "start_lng": -6.2603,
        "dest_lat": 53.4264,
        "dest_lng": -6.2499,
        "address": "Dublin Airport",
        "timestamp": "2024-03-01T08:10:00Z"
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = create_test_server().await;

    let response = server.get("/health").await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_health_endpoint_oneshot() {
    let state = create_state(Arc::new(DisabledScorer)).await;
    let app = router(state);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_shift_round_trip() {
    let server = create_test_server().await;

    let response = server
        .post("/drivers/driver-1/shift/start")
        .json(&json!({ "timestamp": "2024-03-01T08:00:00Z", "planned_duration_ms": 28800000 }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let shift: serde_json::Value = response.json();
    assert_eq!(shift["driver_id"], "driver-1");

    server
        .post("/drivers/driver-1/shift/pause")
        .json(&json!({ "timestamp": "2024-03-01T10:00:00Z" }))
        .await
        .assert_status_ok();

    let response = server.get("/drivers/driver-1/shift").await;
    response.assert_status_ok();
    let status: serde_json::Value = response.json();
    assert_eq!(status["is_on_shift"], true);
    assert_eq!(status["is_paused"], true);
    assert_eq!(status["last_signal"], "pause");

    let response = server
        .post("/drivers/driver-1/shift/continue")
        .json(&json!({ "timestamp": "2024-03-01T10:20:00Z" }))
        .await;
    response.assert_status_ok();
    let pause: serde_json::Value = response.json();
    assert_eq!(pause["duration_ms"], 20 * 60_000);

    let response = server
        .post("/drivers/driver-1/shift/stop")
        .json(&json!({ "timestamp": "2024-03-01T12:00:00Z" }))
        .await;
    response.assert_status_ok();
    let summary: serde_json::Value = response.json();
    assert_eq!(summary["total_duration_ms"], 4 * 3_600_000);
    assert_eq!(summary["break_time_ms"], 20 * 60_000);
    assert_eq!(summary["num_breaks"], 1);
}

#[tokio::test]
async fn test_illegal_signal_returns_conflict() {
    let server = create_test_server().await;

    let response = server
        .post("/drivers/driver-1/shift/pause")
        .json(&json!({}))
        .expect_failure()
        .await;

    response.assert_status(StatusCode::CONFLICT);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "invalid_transition");
}

#[tokio::test]
async fn test_ride_without_shift_is_rejected() {
    let server = create_test_server().await;

    let response = server
        .post("/drivers/driver-1/rides")
        .json(&ride_body())
        .expect_failure()
        .await;

    response.assert_status(StatusCode::CONFLICT);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "cannot_start_ride");
    assert_eq!(body["message"], "Cannot start ride: No active shift found");
}

#[tokio::test]
async fn test_ride_round_trip() {
    let server = create_test_server().await;

    server
        .post("/drivers/driver-1/shift/start")
        .json(&json!({ "timestamp": "2024-03-01T08:00:00Z" }))
        .await
        .assert_status(StatusCode::CREATED);

    let response = server.get("/drivers/driver-1/rides").await;
    let eligibility: serde_json::Value = response.json();
    assert_eq!(eligibility["can_start"], true);

    let response = server.post("/drivers/driver-1/rides").json(&ride_body()).await;
    response.assert_status(StatusCode::CREATED);
    let started: serde_json::Value = response.json();
    let ride_id = started["ride_id"].as_i64().unwrap();
    let shift_id = started["shift_id"].as_i64().unwrap();

    let response = server
        .post("/drivers/driver-1/rides")
        .json(&ride_body())
        .expect_failure()
        .await;
    response.assert_status(StatusCode::CONFLICT);
    let body: serde_json::Value = response.json();
    assert_eq!(body["message"], "Cannot start ride: active ride already exists");

    let response = server.get("/drivers/driver-1/rides/active").await;
    response.assert_status_ok();
    let status: serde_json::Value = response.json();
    assert_eq!(status["ride_id"], ride_id);
    assert_eq!(status["address"], "Dublin Airport");

    let response = server
        .post(&format!("/rides/{ride_id}/end"))
        .json(&json!({
            "timestamp": "2024-03-01T08:40:00Z",
            "fare_cents": 2850,
            "distance_km": 9.1
        }))
        .await;
    response.assert_status_ok();
    let summary: serde_json::Value = response.json();
    assert_eq!(summary["earnings_cents"], 2850);
    assert_eq!(summary["duration_ms"], 30 * 60_000);

    server
        .post(&format!("/rides/{ride_id}/end"))
        .json(&json!({}))
        .expect_failure()
        .await
        .assert_status(StatusCode::CONFLICT);

    server
        .get("/drivers/driver-1/rides/active")
        .expect_failure()
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let response = server.get(&format!("/shifts/{shift_id}/rides")).await;
    let rides: Vec<serde_json::Value> = response.json();
    assert_eq!(rides.len(), 1);

    server
        .delete(&format!("/rides/{ride_id}"))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let response = server.get(&format!("/shifts/{shift_id}/rides")).await;
    let rides: Vec<serde_json::Value> = response.json();
    assert!(rides.is_empty());

    let response = server
        .get(&format!("/shifts/{shift_id}/rides?include_deleted=true"))
        .await;
    let rides: Vec<serde_json::Value> = response.json();
    assert_eq!(rides.len(), 1);
}

#[tokio::test]
async fn test_evaluate_ride() {
    let state = create_state(Arc::new(FixedScorer(Some(3.7)))).await;
    let server = TestServer::new(router(state)).unwrap();

    let response = server
        .post("/rides/evaluate")
        .json(&json!({ "start_lat": 53.35, "start_lng": -6.26, "dest_lat": 53.43, "dest_lng": -6.25 }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["score"], 4);

    let response = server
        .post("/rides/evaluate")
        .json(&json!({ "start_lat": 91.0, "start_lng": -6.0, "dest_lat": 53.0, "dest_lng": -6.0 }))
        .expect_failure()
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "invalid_coordinate");
    assert!(body["message"].as_str().unwrap().contains("latitude"));
}

#[tokio::test]
async fn test_evaluate_ride_without_scorer() {
    let server = create_test_server().await;

    let response = server
        .post("/rides/evaluate")
        .json(&json!({ "start_lat": 53.35, "start_lng": -6.26, "dest_lat": 53.43, "dest_lng": -6.25 }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert!(body["score"].is_null());
}

#[tokio::test]
async fn test_sweep_for_unknown_driver() {
    let server = create_test_server().await;

    let response = server.post("/drivers/nobody/sweep").await;
    response.assert_status_ok();
    let report: serde_json::Value = response.json();
    assert_eq!(report["rides_closed"], 0);
    assert!(report["shift_finalized"].is_null());
    assert!(report["shift_deleted"].is_null());
}
