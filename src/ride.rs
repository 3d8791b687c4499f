//! Ride lifecycle.
//!
//! A ride may only start inside an active, unpaused shift that has no other
//! open ride. The check runs first for a readable rejection; the partial
//! unique index on `rides(shift_id)` is what actually closes the race
//! between two concurrent starts for the same shift.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::{info, instrument, warn};

use crate::calculator::{compute_distance_km, compute_fare, validate_coordinates};
use crate::config::FareConfig;
use crate::error::{CoreError, CoreResult};
use crate::model::{
    Coordinates, DriverId, NewRide, Ride, RideEligibility, RideId, RideStatus, RideSummary, Shift,
    ShiftId, SignalKind,
};
use crate::scoring::{TripScorer, normalize_score};
use crate::storage::{Storage, StorageError, rides, shifts, signals};

pub const NO_ACTIVE_SHIFT: &str = "No active shift found";
pub const SHIFT_PAUSED: &str = "Shift is paused";
pub const ACTIVE_RIDE_EXISTS: &str = "active ride already exists";

/// A ride insert that lost to the one-open-ride index is reported exactly
/// like the eligibility check would have reported it.
fn race_as_cannot_start(err: StorageError) -> CoreError {
    match err {
        StorageError::ConstraintViolation(_) => {
            CoreError::CannotStartRide(ACTIVE_RIDE_EXISTS.to_string())
        }
        other => CoreError::Storage(other),
    }
}

#[derive(Clone)]
pub struct RideLifecycle {
    storage: Storage,
    scorer: Arc<dyn TripScorer>,
    fare: FareConfig,
    scoring_timeout: Duration,
}

impl RideLifecycle {
    pub fn new(
        storage: Storage,
        scorer: Arc<dyn TripScorer>,
        fare: FareConfig,
        scoring_timeout: Duration,
    ) -> Self {
        Self {
            storage,
            scorer,
            fare,
            scoring_timeout,
        }
    }

    async fn eligibility_in(
        conn: &mut SqliteConnection,
        driver_id: &DriverId,
    ) -> CoreResult<(RideEligibility, Option<Shift>)> {
        let Some(shift) = shifts::find_active(conn, driver_id).await? else {
            return Ok((RideEligibility::denied(NO_ACTIVE_SHIFT), None));
        };

        let latest = signals::latest(conn, shift.id).await?;
        if latest.map(|s| s.kind) == Some(SignalKind::Pause) {
            return Ok((RideEligibility::denied(SHIFT_PAUSED), Some(shift)));
        }

        if rides::find_active_for_shift(conn, shift.id).await?.is_some() {
            return Ok((RideEligibility::denied(ACTIVE_RIDE_EXISTS), Some(shift)));
        }

        Ok((RideEligibility::allowed(), Some(shift)))
    }

    /// Whether the driver may start a ride now, with the reason if not.
    pub async fn can_start_ride(&self, driver_id: &DriverId) -> CoreResult<RideEligibility> {
        let mut conn = self.storage.acquire().await?;
        let (eligibility, _) = Self::eligibility_in(&mut conn, driver_id).await?;
        Ok(eligibility)
    }

    /// Ask the scoring service to rate a prospective trip.
    ///
    /// Coordinates are validated first. A slow, failing or unconfigured
    /// scoring service yields `Ok(None)` rather than an error.
    #[instrument(skip(self))]
    pub async fn evaluate_ride(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        at: DateTime<Utc>,
    ) -> CoreResult<Option<u8>> {
        validate_coordinates(origin)?;
        validate_coordinates(destination)?;

        let call = self.scorer.score_trip(origin, destination, at);
        let score = match tokio::time::timeout(self.scoring_timeout, call).await {
            Ok(Ok(raw)) => raw.and_then(normalize_score),
            Ok(Err(e)) => {
                warn!(error = %e, "Trip scoring failed, continuing without a score");
                None
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.scoring_timeout.as_millis() as u64,
                    "Trip scoring timed out, continuing without a score"
                );
                None
            }
        };

        Ok(score)
    }

    /// Open a ride on the driver's active shift.
    #[instrument(skip(self, ride), fields(driver_id = %driver_id))]
    pub async fn start_ride(
        &self,
        driver_id: &DriverId,
        ride: &NewRide,
        started_at: DateTime<Utc>,
    ) -> CoreResult<Ride> {
        validate_coordinates(ride.origin())?;
        validate_coordinates(ride.destination())?;
        if let Some(score) = ride.predicted_score {
            if !(1..=5).contains(&score) {
                return Err(CoreError::InvalidInput(format!(
                    "predicted score must be between 1 and 5, got {score}"
                )));
            }
        }

        let mut tx = self.storage.begin().await?;
        let (eligibility, shift) = Self::eligibility_in(&mut tx, driver_id).await?;
        let shift = match (eligibility.can_start, shift) {
            (true, Some(shift)) => shift,
            _ => {
                let reason = eligibility.reason.unwrap_or_else(|| NO_ACTIVE_SHIFT.to_string());
                return Err(CoreError::CannotStartRide(reason));
            }
        };
        if started_at < shift.shift_start {
            return Err(CoreError::InvalidTimestamp(format!(
                "ride start {started_at} precedes shift start {}",
                shift.shift_start
            )));
        }

        let created = rides::insert(&mut tx, shift.id, driver_id, ride, started_at)
            .await
            .map_err(race_as_cannot_start)?;
        tx.commit().await.map_err(StorageError::from)?;

        info!(
            driver_id = %driver_id,
            shift_id = shift.id,
            ride_id = created.id,
            predicted_score = ?created.predicted_score,
            "Ride started"
        );
        Ok(created)
    }

    /// Close a ride.
    ///
    /// `fare_cents` and `distance_km` are taken as given when present;
    /// otherwise distance is the great-circle distance from origin to
    /// destination and the fare follows from elapsed time and distance.
    #[instrument(skip(self))]
    pub async fn end_ride(
        &self,
        ride_id: RideId,
        ended_at: DateTime<Utc>,
        fare_cents: Option<i64>,
        distance_km: Option<f64>,
    ) -> CoreResult<RideSummary> {
        if fare_cents.is_some_and(|fare| fare < 0) {
            return Err(CoreError::InvalidInput("fare must not be negative".to_string()));
        }
        if distance_km.is_some_and(|km| !km.is_finite() || km < 0.0) {
            return Err(CoreError::InvalidInput(
                "distance must be a non-negative number".to_string(),
            ));
        }

        let mut tx = self.storage.begin().await?;
        let ride = rides::find_by_id(&mut tx, ride_id, false)
            .await?
            .ok_or(CoreError::RideNotFound(ride_id))?;
        if ride.end_time.is_some() {
            return Err(CoreError::RideAlreadyEnded(ride_id));
        }

        let duration_ms = (ended_at - ride.start_time).num_milliseconds();
        if duration_ms < 0 {
            return Err(CoreError::InvalidTimestamp(format!(
                "ride end {ended_at} precedes ride start {}",
                ride.start_time
            )));
        }

        let distance_km =
            distance_km.unwrap_or_else(|| compute_distance_km(ride.origin, ride.destination));
        let earnings_cents =
            fare_cents.unwrap_or_else(|| compute_fare(&self.fare, duration_ms, distance_km));

        if !rides::end(&mut tx, ride_id, ended_at, distance_km, earnings_cents).await? {
            return Err(CoreError::RideAlreadyEnded(ride_id));
        }
        tx.commit().await.map_err(StorageError::from)?;

        info!(
            ride_id,
            shift_id = ride.shift_id,
            duration_ms,
            distance_km,
            earnings_cents,
            "Ride ended"
        );

        Ok(RideSummary {
            ride_id,
            shift_id: ride.shift_id,
            start_time: ride.start_time,
            end_time: ended_at,
            duration_ms,
            distance_km,
            earnings_cents,
        })
    }

    /// Progress of the driver's open ride.
    ///
    /// `destination` replaces the stored destination for the estimate, e.g.
    /// when the passenger changed their mind mid-trip.
    pub async fn get_ride_status(
        &self,
        driver_id: &DriverId,
        now: DateTime<Utc>,
        destination: Option<Coordinates>,
    ) -> CoreResult<RideStatus> {
        if let Some(point) = destination {
            validate_coordinates(point)?;
        }

        let mut conn = self.storage.acquire().await?;
        let ride = rides::list_active_for_driver(&mut conn, driver_id)
            .await?
            .pop()
            .ok_or(CoreError::NoActiveRide)?;

        let destination = destination.unwrap_or(ride.destination);
        let elapsed_ms = (now - ride.start_time).num_milliseconds().max(0);
        let estimated_distance_km = compute_distance_km(ride.origin, destination);

        Ok(RideStatus {
            ride_id: ride.id,
            shift_id: ride.shift_id,
            started_at: ride.start_time,
            elapsed_ms,
            destination,
            address: ride.address,
            estimated_distance_km,
            estimated_fare_cents: compute_fare(&self.fare, elapsed_ms, estimated_distance_km),
        })
    }

    /// Soft-delete a ride. The row is kept for audit.
    #[instrument(skip(self))]
    pub async fn delete_ride(&self, ride_id: RideId, at: DateTime<Utc>) -> CoreResult<()> {
        let mut conn = self.storage.acquire().await?;
        if !rides::soft_delete(&mut conn, ride_id, at).await? {
            return Err(CoreError::RideNotFound(ride_id));
        }
        info!(ride_id, "Ride deleted");
        Ok(())
    }

    pub async fn list_rides(&self, shift_id: ShiftId, include_deleted: bool) -> CoreResult<Vec<Ride>> {
        let mut conn = self.storage.acquire().await?;
        Ok(rides::list_for_shift(&mut conn, shift_id, include_deleted).await?)
    }
}
