//! Error taxonomy for the shift and ride lifecycles.
//!
//! Every rejected operation carries a specific, stable reason. The HTTP
//! layer renders the [`CoreError::kind`] string alongside the display
//! message so clients can branch on it.

use std::fmt;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::model::{RideId, SignalKind};
use crate::storage::StorageError;

/// Which half of a coordinate pair was out of range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Latitude,
    Longitude,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Latitude => f.write_str("latitude"),
            Axis::Longitude => f.write_str("longitude"),
        }
    }
}

/// Errors raised by the lifecycle components.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The signal is not allowed from the driver's current state, or an
    /// active ride blocks it.
    #[error("Invalid transition: {reason}")]
    InvalidTransition {
        from: Option<SignalKind>,
        to: SignalKind,
        reason: String,
    },

    #[error("No active shift found")]
    NoActiveShift,

    #[error("No active ride found")]
    NoActiveRide,

    /// Pause materialization found something other than (`pause`, `continue`).
    #[error("Invalid signal sequence: {0}")]
    InvalidSignalSequence(String),

    #[error("Invalid {axis}: {value}")]
    InvalidCoordinate { axis: Axis, value: f64 },

    #[error("Ride not found: {0}")]
    RideNotFound(RideId),

    #[error("Ride already ended: {0}")]
    RideAlreadyEnded(RideId),

    #[error("Cannot start ride: {0}")]
    CannotStartRide(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Negative work time: total {total_ms} ms is less than breaks {break_ms} ms")]
    NegativeWorkTime { total_ms: i64, break_ms: i64 },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn transition(from: Option<SignalKind>, to: SignalKind, reason: impl Into<String>) -> Self {
        CoreError::InvalidTransition {
            from,
            to,
            reason: reason.into(),
        }
    }

    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::InvalidTransition { .. } => "invalid_transition",
            CoreError::NoActiveShift => "no_active_shift",
            CoreError::NoActiveRide => "no_active_ride",
            CoreError::InvalidSignalSequence(_) => "invalid_signal_sequence",
            CoreError::InvalidCoordinate { .. } => "invalid_coordinate",
            CoreError::RideNotFound(_) => "ride_not_found",
            CoreError::RideAlreadyEnded(_) => "ride_already_ended",
            CoreError::CannotStartRide(_) => "cannot_start_ride",
            CoreError::InvalidTimestamp(_) => "invalid_timestamp",
            CoreError::InvalidInput(_) => "invalid_input",
            CoreError::NegativeWorkTime { .. } => "negative_work_time",
            CoreError::Storage(StorageError::ConstraintViolation(_)) => "constraint_violation",
            CoreError::Storage(_) => "storage_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            CoreError::InvalidTransition { .. }
            | CoreError::InvalidSignalSequence(_)
            | CoreError::RideAlreadyEnded(_)
            | CoreError::CannotStartRide(_)
            | CoreError::Storage(StorageError::ConstraintViolation(_)) => StatusCode::CONFLICT,
            CoreError::NoActiveShift | CoreError::NoActiveRide | CoreError::RideNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            CoreError::InvalidCoordinate { .. }
            | CoreError::InvalidTimestamp(_)
            | CoreError::InvalidInput(_)
            | CoreError::NegativeWorkTime { .. } => StatusCode::BAD_REQUEST,
            CoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            error: self.kind(),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
