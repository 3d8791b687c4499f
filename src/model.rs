//! Data models for taxishift.
//!
//! Shifts, signals, pauses and rides as the lifecycles see them, plus the
//! request and response bodies exchanged with the HTTP layer.
//!
//! All timestamps are UTC and caller-supplied: the time a driver pressed
//! "pause" on the device is the authoritative pause time, not the time the
//! request reached the server.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a shift row.
pub type ShiftId = i64;

/// Identifier of a ride row.
pub type RideId = i64;

/// Opaque driver identifier issued by the upstream identity system.
///
/// The core never interprets it; it only scopes state by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverId(String);

impl DriverId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DriverId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DriverId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The four shift signals a driver can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Start,
    Pause,
    Continue,
    Stop,
}

impl SignalKind {
    pub const ALL: [SignalKind; 4] = [
        SignalKind::Start,
        SignalKind::Pause,
        SignalKind::Continue,
        SignalKind::Stop,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::Start => "start",
            SignalKind::Pause => "pause",
            SignalKind::Continue => "continue",
            SignalKind::Stop => "stop",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a stored signal name is not one of the four known kinds.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown signal kind: {0}")]
pub struct UnknownSignalKind(pub String);

impl FromStr for SignalKind {
    type Err = UnknownSignalKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(SignalKind::Start),
            "pause" => Ok(SignalKind::Pause),
            "continue" => Ok(SignalKind::Continue),
            "stop" => Ok(SignalKind::Stop),
            other => Err(UnknownSignalKind(other.to_string())),
        }
    }
}

/// A persisted shift signal.
///
/// Signals are append-only and scoped to one shift. `seq` numbers them
/// within the shift starting at 1; the storage layer refuses two signals
/// with the same sequence number, which is how concurrent signals for the
/// same driver are serialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub id: i64,
    pub shift_id: ShiftId,
    pub driver_id: DriverId,
    pub kind: SignalKind,
    pub seq: i64,
    pub timestamp: DateTime<Utc>,

    /// Planned break or shift length hint sent with the signal.
    pub planned_duration_ms: Option<i64>,
}

/// Final statistics written onto a shift when it stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShiftStatistics {
    pub total_duration_ms: i64,
    pub work_time_ms: i64,
    pub break_time_ms: i64,
    pub num_breaks: i64,
    pub average_break_ms: i64,
    pub total_earnings_cents: i64,
}

/// One working session of one driver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Shift {
    pub id: ShiftId,
    pub driver_id: DriverId,
    pub shift_start: DateTime<Utc>,

    /// `None` while the shift is active.
    pub shift_end: Option<DateTime<Utc>>,

    pub planned_duration_ms: Option<i64>,

    /// Present once the shift has been stopped.
    pub statistics: Option<ShiftStatistics>,
}

impl Shift {
    pub fn is_active(&self) -> bool {
        self.shift_end.is_none()
    }
}

/// Returned by `stop`: the durable record of a finished shift.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShiftSummary {
    pub shift_id: ShiftId,
    pub driver_id: DriverId,
    pub shift_start: DateTime<Utc>,
    pub shift_end: DateTime<Utc>,
    #[serde(flatten)]
    pub statistics: ShiftStatistics,
}

/// A completed break, materialized from a (`pause`, `continue`) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pause {
    pub id: i64,
    pub shift_id: ShiftId,
    pub pause_start: DateTime<Utc>,
    pub pause_end: DateTime<Utc>,
    pub duration_ms: i64,
}

/// Pause state derived from the latest signal of the active shift.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PauseStatus {
    pub is_paused: bool,
    pub pause_start: Option<DateTime<Utc>>,
    pub last_pause_end: Option<DateTime<Utc>>,
    pub elapsed_pause_ms: Option<i64>,
}

/// Response for the shift status query.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ShiftStatus {
    pub is_on_shift: bool,
    pub is_paused: bool,
    pub shift_id: Option<ShiftId>,
    pub shift_start: Option<DateTime<Utc>>,
    pub elapsed_ms: Option<i64>,
    pub last_signal: Option<SignalKind>,
    pub planned_duration_ms: Option<i64>,
    pub pause: PauseStatus,
}

/// A point on the earth in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A passenger trip inside a shift.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ride {
    pub id: RideId,
    pub shift_id: ShiftId,
    pub driver_id: DriverId,
    pub origin: Coordinates,
    pub destination: Coordinates,
    pub address: Option<String>,

    /// Score from the trip scoring service, 1 to 5.
    pub predicted_score: Option<u8>,

    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub distance_km: Option<f64>,
    pub earnings_cents: Option<i64>,

    /// Set when the ride has been soft-deleted.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Ride {
    pub fn is_active(&self) -> bool {
        self.end_time.is_none() && self.deleted_at.is_none()
    }
}

/// Input for starting a ride.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRide {
    pub start_lat: f64,
    pub start_lng: f64,
    pub dest_lat: f64,
    pub dest_lng: f64,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub predicted_score: Option<u8>,
}

impl NewRide {
    pub fn origin(&self) -> Coordinates {
        Coordinates::new(self.start_lat, self.start_lng)
    }

    pub fn destination(&self) -> Coordinates {
        Coordinates::new(self.dest_lat, self.dest_lng)
    }
}

/// Answer to "may this driver start a ride right now?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RideEligibility {
    pub can_start: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RideEligibility {
    pub fn allowed() -> Self {
        Self {
            can_start: true,
            reason: None,
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            can_start: false,
            reason: Some(reason.into()),
        }
    }
}

/// Progress of the driver's active ride.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RideStatus {
    pub ride_id: RideId,
    pub shift_id: ShiftId,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: i64,
    pub destination: Coordinates,
    pub address: Option<String>,
    pub estimated_distance_km: f64,
    pub estimated_fare_cents: i64,
}

/// Returned when a ride ends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RideSummary {
    pub ride_id: RideId,
    pub shift_id: ShiftId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: i64,
    pub distance_km: f64,
    pub earnings_cents: i64,
}

/// Outcome of one expiry sweep for one driver.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SweepReport {
    pub rides_closed: usize,
    pub shift_finalized: Option<ShiftId>,
    pub shift_deleted: Option<ShiftId>,
}

/// Request body for the shift signal endpoints.
///
/// `timestamp` defaults to the server clock when the client omits it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignalRequest {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub planned_duration_ms: Option<i64>,
}

/// Request body for POST /rides/evaluate.
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluateRideRequest {
    pub start_lat: f64,
    pub start_lng: f64,
    pub dest_lat: f64,
    pub dest_lng: f64,
}

/// Response for POST /rides/evaluate. `score` is null when the scoring
/// service could not answer.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluateRideResponse {
    pub score: Option<u8>,
}

/// Request body for POST /drivers/:driver_id/rides.
#[derive(Debug, Clone, Deserialize)]
pub struct StartRideRequest {
    #[serde(flatten)]
    pub ride: NewRide,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Response for POST /drivers/:driver_id/rides.
#[derive(Debug, Clone, Serialize)]
pub struct StartRideResponse {
    pub ride_id: RideId,
    pub shift_id: ShiftId,
}

/// Request body for POST /rides/:ride_id/end.
///
/// Fare and distance are computed from the ride when omitted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndRideRequest {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fare_cents: Option<i64>,
    #[serde(default)]
    pub distance_km: Option<f64>,
}

/// Query parameters for GET /drivers/:driver_id/rides/active.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RideStatusQuery {
    pub dest_lat: Option<f64>,
    pub dest_lng: Option<f64>,
}

impl RideStatusQuery {
    /// Destination override, only when both halves are given.
    pub fn destination(&self) -> Option<Coordinates> {
        match (self.dest_lat, self.dest_lng) {
            (Some(lat), Some(lng)) => Some(Coordinates::new(lat, lng)),
            _ => None,
        }
    }
}

/// Query parameters for ride listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListRidesQuery {
    #[serde(default)]
    pub include_deleted: bool,
}
