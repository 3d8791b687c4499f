//! Expiry sweep for abandoned rides and shifts.
//!
//! Runs for one driver at a time, typically on login. Nothing in here
//! surfaces an error to the caller: every failure is logged and the sweep
//! moves on, so a broken row never locks a driver out.

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use crate::config::ExpiryConfig;
use crate::error::{CoreError, CoreResult};
use crate::model::{DriverId, ShiftId, SweepReport};
use crate::shift::ShiftLifecycle;
use crate::storage::{Storage, StorageError, pauses, rides, shifts, signals};

/// What the idle-shift sweep did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShiftOutcome {
    Untouched,
    Finalized(ShiftId),
    Deleted(ShiftId),
}

#[derive(Clone)]
pub struct ExpiryReaper {
    storage: Storage,
    shifts: ShiftLifecycle,
    config: ExpiryConfig,
}

impl ExpiryReaper {
    pub fn new(storage: Storage, shifts: ShiftLifecycle, config: ExpiryConfig) -> Self {
        Self {
            storage,
            shifts,
            config,
        }
    }

    /// Close the driver's stale rides, then close or remove a stale shift.
    ///
    /// Safe to call repeatedly; a driver without an active shift is a no-op.
    #[instrument(skip(self), fields(driver_id = %driver_id))]
    pub async fn sweep(&self, driver_id: &DriverId, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        match self.expire_rides(driver_id, now).await {
            Ok(closed) => report.rides_closed = closed,
            Err(e) => warn!(driver_id = %driver_id, error = %e, "Ride expiry sweep failed"),
        }

        match self.expire_shift(driver_id, now).await {
            Ok(ShiftOutcome::Finalized(id)) => report.shift_finalized = Some(id),
            Ok(ShiftOutcome::Deleted(id)) => report.shift_deleted = Some(id),
            Ok(ShiftOutcome::Untouched) => {}
            Err(e) => warn!(driver_id = %driver_id, error = %e, "Shift expiry sweep failed"),
        }

        report
    }

    /// Force-end rides open longer than the configured maximum. Abandoned
    /// rides are closed with no distance and no earnings.
    async fn expire_rides(&self, driver_id: &DriverId, now: DateTime<Utc>) -> CoreResult<usize> {
        let max_age_ms = millis(self.config.ride_max_age);
        let mut conn = self.storage.acquire().await?;
        let open = rides::list_active_for_driver(&mut conn, driver_id).await?;

        let mut closed = 0;
        for ride in open {
            let age_ms = (now - ride.start_time).num_milliseconds();
            if age_ms <= max_age_ms {
                continue;
            }
            match rides::end(&mut conn, ride.id, now, 0.0, 0).await {
                Ok(true) => {
                    info!(ride_id = ride.id, shift_id = ride.shift_id, age_ms, "Expired ride closed");
                    closed += 1;
                }
                // Ended concurrently by the driver.
                Ok(false) => {}
                Err(e) => warn!(ride_id = ride.id, error = %e, "Failed to close expired ride"),
            }
        }

        Ok(closed)
    }

    /// Deal with a shift that has seen no signal for too long.
    ///
    /// A shift with rides is stopped at its last signal time so the rides
    /// keep their earnings. A shift that never had a ride is removed along
    /// with its history.
    async fn expire_shift(&self, driver_id: &DriverId, now: DateTime<Utc>) -> CoreResult<ShiftOutcome> {
        let max_idle_ms = millis(self.config.shift_max_idle);

        let (shift, last_activity, ride_count) = {
            let mut conn = self.storage.acquire().await?;
            let Some(shift) = shifts::find_active(&mut conn, driver_id).await? else {
                return Ok(ShiftOutcome::Untouched);
            };
            let last_activity = signals::latest(&mut conn, shift.id)
                .await?
                .map_or(shift.shift_start, |s| s.timestamp);
            if (now - last_activity).num_milliseconds() <= max_idle_ms {
                return Ok(ShiftOutcome::Untouched);
            }
            let ride_count = rides::count_for_shift(&mut conn, shift.id, true).await?;
            (shift, last_activity, ride_count)
        };

        if ride_count > 0 {
            let summary = self.shifts.handle_stop(driver_id, last_activity).await?;
            info!(
                driver_id = %driver_id,
                shift_id = shift.id,
                shift_end = %last_activity,
                "Idle shift finalized"
            );
            return Ok(ShiftOutcome::Finalized(summary.shift_id));
        }

        self.delete_if_unused(driver_id, shift.id, last_activity).await
    }

    /// Remove an idle shift and its history, provided nothing happened to
    /// it since `last_activity` was read.
    ///
    /// The checks are repeated under the write lock: a ride started or a
    /// signal recorded in the meantime leaves the shift in place.
    async fn delete_if_unused(
        &self,
        driver_id: &DriverId,
        shift_id: ShiftId,
        last_activity: DateTime<Utc>,
    ) -> CoreResult<ShiftOutcome> {
        let mut tx = self.storage.begin().await?;

        let Some(shift) = shifts::find_by_id(&mut tx, shift_id).await? else {
            return Ok(ShiftOutcome::Untouched);
        };
        if !shift.is_active() {
            return Ok(ShiftOutcome::Untouched);
        }
        let latest = signals::latest(&mut tx, shift_id)
            .await?
            .map_or(shift.shift_start, |s| s.timestamp);
        if latest != last_activity {
            info!(shift_id, "Shift saw new activity, not deleting");
            return Ok(ShiftOutcome::Untouched);
        }
        if rides::count_for_shift(&mut tx, shift_id, true).await? > 0 {
            info!(shift_id, "Shift gained a ride, not deleting");
            return Ok(ShiftOutcome::Untouched);
        }

        pauses::delete_for_shift(&mut tx, shift_id).await?;
        let purged = signals::delete_for_shift(&mut tx, shift_id).await?;
        if !shifts::delete(&mut tx, shift_id).await? {
            return Err(CoreError::NoActiveShift);
        }
        tx.commit().await.map_err(StorageError::from)?;

        info!(
            driver_id = %driver_id,
            shift_id,
            signals_purged = purged,
            "Idle shift without rides deleted"
        );
        Ok(ShiftOutcome::Deleted(shift_id))
    }
}

fn millis(duration: std::time::Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
