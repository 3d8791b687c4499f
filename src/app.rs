//! The operations exposed to the outside world.
//!
//! [`App`] wires the lifecycles to one storage and one scoring service and
//! is what the HTTP layer (or any other transport) talks to.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::CoreConfig;
use crate::error::CoreResult;
use crate::expiry::ExpiryReaper;
use crate::model::{
    Coordinates, DriverId, NewRide, Pause, Ride, RideEligibility, RideId, RideStatus, RideSummary,
    Shift, ShiftId, ShiftStatus, ShiftSummary, Signal, SweepReport,
};
use crate::pause::PauseTracker;
use crate::ride::RideLifecycle;
use crate::scoring::TripScorer;
use crate::shift::ShiftLifecycle;
use crate::storage::Storage;

#[derive(Clone)]
pub struct App {
    shifts: ShiftLifecycle,
    rides: RideLifecycle,
    pauses: PauseTracker,
    reaper: ExpiryReaper,
}

impl App {
    pub fn new(storage: Storage, config: &CoreConfig, scorer: Arc<dyn TripScorer>) -> Self {
        let shifts = ShiftLifecycle::new(storage.clone());
        let rides = RideLifecycle::new(
            storage.clone(),
            scorer,
            config.fare,
            config.scoring.timeout,
        );
        let pauses = PauseTracker::new(storage.clone());
        let reaper = ExpiryReaper::new(storage, shifts.clone(), config.expiry);

        Self {
            shifts,
            rides,
            pauses,
            reaper,
        }
    }

    pub fn shifts(&self) -> &ShiftLifecycle {
        &self.shifts
    }

    pub fn rides(&self) -> &RideLifecycle {
        &self.rides
    }

    pub fn pauses(&self) -> &PauseTracker {
        &self.pauses
    }

    pub async fn start_shift(
        &self,
        driver_id: &DriverId,
        timestamp: DateTime<Utc>,
        planned_duration_ms: Option<i64>,
    ) -> CoreResult<Shift> {
        self.shifts
            .handle_start(driver_id, timestamp, planned_duration_ms)
            .await
    }

    pub async fn pause_shift(
        &self,
        driver_id: &DriverId,
        timestamp: DateTime<Utc>,
        planned_duration_ms: Option<i64>,
    ) -> CoreResult<Signal> {
        self.shifts
            .handle_pause(driver_id, timestamp, planned_duration_ms)
            .await
    }

    pub async fn continue_shift(
        &self,
        driver_id: &DriverId,
        timestamp: DateTime<Utc>,
    ) -> CoreResult<Pause> {
        self.shifts.handle_continue(driver_id, timestamp).await
    }

    pub async fn stop_shift(
        &self,
        driver_id: &DriverId,
        timestamp: DateTime<Utc>,
    ) -> CoreResult<ShiftSummary> {
        self.shifts.handle_stop(driver_id, timestamp).await
    }

    pub async fn get_shift_status(
        &self,
        driver_id: &DriverId,
        now: DateTime<Utc>,
    ) -> CoreResult<ShiftStatus> {
        self.shifts.get_shift_status(driver_id, now).await
    }

    pub async fn can_start_ride(&self, driver_id: &DriverId) -> CoreResult<RideEligibility> {
        self.rides.can_start_ride(driver_id).await
    }

    pub async fn evaluate_ride(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        at: DateTime<Utc>,
    ) -> CoreResult<Option<u8>> {
        self.rides.evaluate_ride(origin, destination, at).await
    }

    pub async fn start_ride(
        &self,
        driver_id: &DriverId,
        ride: &NewRide,
        started_at: DateTime<Utc>,
    ) -> CoreResult<Ride> {
        self.rides.start_ride(driver_id, ride, started_at).await
    }

    pub async fn get_ride_status(
        &self,
        driver_id: &DriverId,
        now: DateTime<Utc>,
        destination: Option<Coordinates>,
    ) -> CoreResult<RideStatus> {
        self.rides.get_ride_status(driver_id, now, destination).await
    }

    pub async fn end_ride(
        &self,
        ride_id: RideId,
        ended_at: DateTime<Utc>,
        fare_cents: Option<i64>,
        distance_km: Option<f64>,
    ) -> CoreResult<RideSummary> {
        self.rides
            .end_ride(ride_id, ended_at, fare_cents, distance_km)
            .await
    }

    pub async fn delete_ride(&self, ride_id: RideId, at: DateTime<Utc>) -> CoreResult<()> {
        self.rides.delete_ride(ride_id, at).await
    }

    pub async fn list_rides(&self, shift_id: ShiftId, include_deleted: bool) -> CoreResult<Vec<Ride>> {
        self.rides.list_rides(shift_id, include_deleted).await
    }

    /// Best-effort cleanup for one driver. Never fails.
    pub async fn sweep_expired(&self, driver_id: &DriverId, now: DateTime<Utc>) -> SweepReport {
        self.reaper.sweep(driver_id, now).await
    }
}
