//! HTTP API handlers for taxishift.
//!
//! Handlers are a thin adapter over [`App`]: they pick the clock when the
//! client does not supply a timestamp, call one operation and render its
//! result. Domain failures come back as `{ "error": kind, "message": ... }`
//! through [`CoreError`]'s `IntoResponse`.
//!
//! Authentication happens upstream; the driver id in the path is trusted.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};
use chrono::Utc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::app::App;
use crate::error::CoreError;
use crate::model::{
    Coordinates, DriverId, EndRideRequest, EvaluateRideRequest, EvaluateRideResponse,
    ListRidesQuery, Pause, Ride, RideEligibility, RideId, RideStatus, RideStatusQuery,
    RideSummary, Shift, ShiftId, ShiftStatus, ShiftSummary, Signal, SignalRequest,
    StartRideRequest, StartRideResponse, SweepReport,
};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub app: App,
}

/// Build the HTTP router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/drivers/:driver_id/shift", get(get_shift_status))
        .route("/drivers/:driver_id/shift/start", post(start_shift))
        .route("/drivers/:driver_id/shift/pause", post(pause_shift))
        .route("/drivers/:driver_id/shift/continue", post(continue_shift))
        .route("/drivers/:driver_id/shift/stop", post(stop_shift))
        .route(
            "/drivers/:driver_id/rides",
            get(can_start_ride).post(start_ride),
        )
        .route("/drivers/:driver_id/rides/active", get(get_ride_status))
        .route("/drivers/:driver_id/sweep", post(sweep_expired))
        .route("/rides/evaluate", post(evaluate_ride))
        .route("/rides/:ride_id/end", post(end_ride))
        .route("/rides/:ride_id", delete(delete_ride))
        .route("/shifts/:shift_id/rides", get(list_rides))
        .route("/health", get(health_check))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// POST /drivers/:driver_id/shift/start
///
/// ```json
/// { "timestamp": "2024-03-01T08:00:00Z", "planned_duration_ms": 28800000 }
/// ```
///
/// Both fields are optional. Returns `201 Created` with the new shift.
#[instrument(skip(state, request))]
pub async fn start_shift(
    State(state): State<AppState>,
    Path(driver_id): Path<DriverId>,
    Json(request): Json<SignalRequest>,
) -> Result<(StatusCode, Json<Shift>), CoreError> {
    let timestamp = request.timestamp.unwrap_or_else(Utc::now);
    let shift = state
        .app
        .start_shift(&driver_id, timestamp, request.planned_duration_ms)
        .await?;
    Ok((StatusCode::CREATED, Json(shift)))
}

/// POST /drivers/:driver_id/shift/pause
#[instrument(skip(state, request))]
pub async fn pause_shift(
    State(state): State<AppState>,
    Path(driver_id): Path<DriverId>,
    Json(request): Json<SignalRequest>,
) -> Result<Json<Signal>, CoreError> {
    let timestamp = request.timestamp.unwrap_or_else(Utc::now);
    let signal = state
        .app
        .pause_shift(&driver_id, timestamp, request.planned_duration_ms)
        .await?;
    Ok(Json(signal))
}

/// POST /drivers/:driver_id/shift/continue
///
/// Returns the pause that just ended.
#[instrument(skip(state, request))]
pub async fn continue_shift(
    State(state): State<AppState>,
    Path(driver_id): Path<DriverId>,
    Json(request): Json<SignalRequest>,
) -> Result<Json<Pause>, CoreError> {
    let timestamp = request.timestamp.unwrap_or_else(Utc::now);
    let pause = state.app.continue_shift(&driver_id, timestamp).await?;
    Ok(Json(pause))
}

/// POST /drivers/:driver_id/shift/stop
///
/// Returns the final shift statistics.
#[instrument(skip(state, request))]
pub async fn stop_shift(
    State(state): State<AppState>,
    Path(driver_id): Path<DriverId>,
    Json(request): Json<SignalRequest>,
) -> Result<Json<ShiftSummary>, CoreError> {
    let timestamp = request.timestamp.unwrap_or_else(Utc::now);
    let summary = state.app.stop_shift(&driver_id, timestamp).await?;
    Ok(Json(summary))
}

/// GET /drivers/:driver_id/shift
#[instrument(skip(state))]
pub async fn get_shift_status(
    State(state): State<AppState>,
    Path(driver_id): Path<DriverId>,
) -> Result<Json<ShiftStatus>, CoreError> {
    let status = state.app.get_shift_status(&driver_id, Utc::now()).await?;
    Ok(Json(status))
}

/// POST /rides/evaluate
///
/// ```json
/// { "start_lat": 53.35, "start_lng": -6.26, "dest_lat": 53.43, "dest_lng": -6.25 }
/// ```
///
/// `score` is null when the scoring service is unavailable.
#[instrument(skip(state))]
pub async fn evaluate_ride(
    State(state): State<AppState>,
    Json(request): Json<EvaluateRideRequest>,
) -> Result<Json<EvaluateRideResponse>, CoreError> {
    let origin = Coordinates::new(request.start_lat, request.start_lng);
    let destination = Coordinates::new(request.dest_lat, request.dest_lng);
    let score = state
        .app
        .evaluate_ride(origin, destination, Utc::now())
        .await?;
    Ok(Json(EvaluateRideResponse { score }))
}

/// GET /drivers/:driver_id/rides
///
/// Whether the driver may start a ride right now.
#[instrument(skip(state))]
pub async fn can_start_ride(
    State(state): State<AppState>,
    Path(driver_id): Path<DriverId>,
) -> Result<Json<RideEligibility>, CoreError> {
    Ok(Json(state.app.can_start_ride(&driver_id).await?))
}

/// POST /drivers/:driver_id/rides
#[instrument(skip(state, request))]
pub async fn start_ride(
    State(state): State<AppState>,
    Path(driver_id): Path<DriverId>,
    Json(request): Json<StartRideRequest>,
) -> Result<(StatusCode, Json<StartRideResponse>), CoreError> {
    let started_at = request.timestamp.unwrap_or_else(Utc::now);
    let ride = state
        .app
        .start_ride(&driver_id, &request.ride, started_at)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(StartRideResponse {
            ride_id: ride.id,
            shift_id: ride.shift_id,
        }),
    ))
}

/// GET /drivers/:driver_id/rides/active?dest_lat=..&dest_lng=..
#[instrument(skip(state))]
pub async fn get_ride_status(
    State(state): State<AppState>,
    Path(driver_id): Path<DriverId>,
    Query(query): Query<RideStatusQuery>,
) -> Result<Json<RideStatus>, CoreError> {
    let status = state
        .app
        .get_ride_status(&driver_id, Utc::now(), query.destination())
        .await?;
    Ok(Json(status))
}

/// POST /rides/:ride_id/end
///
/// ```json
/// { "fare_cents": 1850, "distance_km": 7.4 }
/// ```
///
/// Omitted fare and distance are computed from the ride.
#[instrument(skip(state, request))]
pub async fn end_ride(
    State(state): State<AppState>,
    Path(ride_id): Path<RideId>,
    Json(request): Json<EndRideRequest>,
) -> Result<Json<RideSummary>, CoreError> {
    let ended_at = request.timestamp.unwrap_or_else(Utc::now);
    let summary = state
        .app
        .end_ride(ride_id, ended_at, request.fare_cents, request.distance_km)
        .await?;
    Ok(Json(summary))
}

/// DELETE /rides/:ride_id
#[instrument(skip(state))]
pub async fn delete_ride(
    State(state): State<AppState>,
    Path(ride_id): Path<RideId>,
) -> Result<StatusCode, CoreError> {
    state.app.delete_ride(ride_id, Utc::now()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /shifts/:shift_id/rides?include_deleted=true
#[instrument(skip(state))]
pub async fn list_rides(
    State(state): State<AppState>,
    Path(shift_id): Path<ShiftId>,
    Query(query): Query<ListRidesQuery>,
) -> Result<Json<Vec<Ride>>, CoreError> {
    let rides = state
        .app
        .list_rides(shift_id, query.include_deleted)
        .await?;
    Ok(Json(rides))
}

/// POST /drivers/:driver_id/sweep
///
/// Login hook. Always succeeds; the report says what was cleaned up.
#[instrument(skip(state))]
pub async fn sweep_expired(
    State(state): State<AppState>,
    Path(driver_id): Path<DriverId>,
) -> Json<SweepReport> {
    let report = state.app.sweep_expired(&driver_id, Utc::now()).await;
    info!(
        driver_id = %driver_id,
        rides_closed = report.rides_closed,
        shift_finalized = ?report.shift_finalized,
        shift_deleted = ?report.shift_deleted,
        "Expiry sweep finished"
    );
    Json(report)
}

pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}
