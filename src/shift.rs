//! Shift lifecycle.
//!
//! A driver's shift state is never cached in process memory. Each handler
//! reads the driver's open shift, the latest signal of that shift and any
//! open ride inside the same transaction that appends the new signal, so
//! several service instances sharing a database agree on the state.
//!
//! Exclusivity is ultimately enforced by the schema (one open shift per
//! driver, one signal per sequence number). A handler that loses a race to
//! a concurrent request gets a constraint violation from storage, which is
//! reported as the same [`CoreError::InvalidTransition`] the up-front check
//! would have produced.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::{info, instrument};

use crate::calculator::compute_statistics;
use crate::error::{CoreError, CoreResult};
use crate::model::{
    DriverId, Pause, Shift, ShiftStatus, ShiftSummary, Signal, SignalKind,
};
use crate::pause::PauseTracker;
use crate::signal::is_valid_transition;
use crate::storage::{Storage, StorageError, pauses, rides, shifts, signals};

const ACTIVE_SHIFT_EXISTS: &str = "Cannot start shift: active shift already exists";
const ACTIVE_RIDE_BLOCKS: &str = "active ride in progress";
const CONCURRENT_SIGNAL: &str = "another signal was recorded concurrently";

/// Everything the signal rules need to know about one driver.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverSignalState {
    pub shift: Option<Shift>,
    pub last_signal: Option<Signal>,
    pub ride_active: bool,
}

impl DriverSignalState {
    /// Read the driver's state from storage.
    pub(crate) async fn load(conn: &mut SqliteConnection, driver_id: &DriverId) -> CoreResult<Self> {
        let shift = shifts::find_active(conn, driver_id).await?;
        let last_signal = match &shift {
            Some(shift) => signals::latest(conn, shift.id).await?,
            None => None,
        };
        let ride_active = !rides::list_active_for_driver(conn, driver_id)
            .await?
            .is_empty();

        Ok(Self {
            shift,
            last_signal,
            ride_active,
        })
    }

    pub fn last_kind(&self) -> Option<SignalKind> {
        self.last_signal.as_ref().map(|s| s.kind)
    }

    pub fn is_paused(&self) -> bool {
        self.last_kind() == Some(SignalKind::Pause)
    }

    fn next_seq(&self) -> i64 {
        self.last_signal.as_ref().map_or(1, |s| s.seq + 1)
    }

    /// Apply the active-ride guard, the transition table and timestamp
    /// ordering to a proposed signal.
    fn check(&self, next: SignalKind, timestamp: DateTime<Utc>) -> CoreResult<()> {
        let last = self.last_kind();

        if self.ride_active {
            return Err(CoreError::transition(last, next, ACTIVE_RIDE_BLOCKS));
        }

        if !is_valid_transition(last, next) {
            let reason = match (last, next) {
                (Some(_), SignalKind::Start) if self.shift.is_some() => ACTIVE_SHIFT_EXISTS.to_string(),
                (None, next) => format!("cannot {next} without an active shift"),
                (Some(last), next) => format!("cannot {next} after {last}"),
            };
            return Err(CoreError::transition(last, next, reason));
        }

        if let Some(signal) = &self.last_signal {
            if timestamp < signal.timestamp {
                return Err(CoreError::InvalidTimestamp(format!(
                    "{next} at {timestamp} precedes last {} at {}",
                    signal.kind, signal.timestamp
                )));
            }
        }

        Ok(())
    }
}

/// Map a lost uniqueness race onto the transition error the check would
/// have raised had it run a moment later.
fn race_as_transition(
    err: StorageError,
    last: Option<SignalKind>,
    next: SignalKind,
    reason: &str,
) -> CoreError {
    match err {
        StorageError::ConstraintViolation(_) => CoreError::transition(last, next, reason),
        other => CoreError::Storage(other),
    }
}

#[derive(Clone)]
pub struct ShiftLifecycle {
    storage: Storage,
}

impl ShiftLifecycle {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Open a shift and record its `start` signal.
    #[instrument(skip(self), fields(driver_id = %driver_id))]
    pub async fn handle_start(
        &self,
        driver_id: &DriverId,
        timestamp: DateTime<Utc>,
        planned_duration_ms: Option<i64>,
    ) -> CoreResult<Shift> {
        let mut tx = self.storage.begin().await?;
        let state = DriverSignalState::load(&mut tx, driver_id).await?;
        state.check(SignalKind::Start, timestamp)?;

        let shift = shifts::insert(&mut tx, driver_id, timestamp, planned_duration_ms)
            .await
            .map_err(|e| race_as_transition(e, None, SignalKind::Start, ACTIVE_SHIFT_EXISTS))?;
        signals::insert(
            &mut tx,
            shift.id,
            driver_id,
            SignalKind::Start,
            1,
            timestamp,
            planned_duration_ms,
        )
        .await?;
        tx.commit().await.map_err(StorageError::from)?;

        info!(driver_id = %driver_id, shift_id = shift.id, "Shift started");
        Ok(shift)
    }

    /// Record a `pause` signal. The pause itself is recorded on `continue`.
    #[instrument(skip(self), fields(driver_id = %driver_id))]
    pub async fn handle_pause(
        &self,
        driver_id: &DriverId,
        timestamp: DateTime<Utc>,
        planned_duration_ms: Option<i64>,
    ) -> CoreResult<Signal> {
        let mut tx = self.storage.begin().await?;
        let state = DriverSignalState::load(&mut tx, driver_id).await?;
        state.check(SignalKind::Pause, timestamp)?;
        let shift = state.shift.as_ref().ok_or(CoreError::NoActiveShift)?;

        let signal = signals::insert(
            &mut tx,
            shift.id,
            driver_id,
            SignalKind::Pause,
            state.next_seq(),
            timestamp,
            planned_duration_ms,
        )
        .await
        .map_err(|e| race_as_transition(e, state.last_kind(), SignalKind::Pause, CONCURRENT_SIGNAL))?;
        tx.commit().await.map_err(StorageError::from)?;

        info!(
            driver_id = %driver_id,
            shift_id = shift.id,
            planned_duration_ms,
            "Shift paused"
        );
        Ok(signal)
    }

    /// Record a `continue` signal and the pause it completes.
    #[instrument(skip(self), fields(driver_id = %driver_id))]
    pub async fn handle_continue(
        &self,
        driver_id: &DriverId,
        timestamp: DateTime<Utc>,
    ) -> CoreResult<Pause> {
        let mut tx = self.storage.begin().await?;
        let state = DriverSignalState::load(&mut tx, driver_id).await?;
        state.check(SignalKind::Continue, timestamp)?;
        let shift = state.shift.as_ref().ok_or(CoreError::NoActiveShift)?;

        signals::insert(
            &mut tx,
            shift.id,
            driver_id,
            SignalKind::Continue,
            state.next_seq(),
            timestamp,
            None,
        )
        .await
        .map_err(|e| {
            race_as_transition(e, state.last_kind(), SignalKind::Continue, CONCURRENT_SIGNAL)
        })?;
        let pause = PauseTracker::materialize_in(&mut tx, driver_id).await?;
        tx.commit().await.map_err(StorageError::from)?;

        info!(driver_id = %driver_id, shift_id = shift.id, "Shift continued");
        Ok(pause)
    }

    /// Close the active shift, store its statistics and purge its signals.
    #[instrument(skip(self), fields(driver_id = %driver_id))]
    pub async fn handle_stop(
        &self,
        driver_id: &DriverId,
        timestamp: DateTime<Utc>,
    ) -> CoreResult<ShiftSummary> {
        let mut tx = self.storage.begin().await?;
        let state = DriverSignalState::load(&mut tx, driver_id).await?;
        let shift = state.shift.clone().ok_or(CoreError::NoActiveShift)?;
        state.check(SignalKind::Stop, timestamp)?;

        let summary = Self::finalize_in(&mut tx, &shift, timestamp).await?;
        tx.commit().await.map_err(StorageError::from)?;

        info!(
            driver_id = %driver_id,
            shift_id = shift.id,
            total_duration_ms = summary.statistics.total_duration_ms,
            break_time_ms = summary.statistics.break_time_ms,
            num_breaks = summary.statistics.num_breaks,
            total_earnings_cents = summary.statistics.total_earnings_cents,
            "Shift stopped"
        );
        Ok(summary)
    }

    async fn finalize_in(
        conn: &mut SqliteConnection,
        shift: &Shift,
        shift_end: DateTime<Utc>,
    ) -> CoreResult<ShiftSummary> {
        let shift_pauses = pauses::list_for_shift(conn, shift.id).await?;
        let earnings = rides::total_earnings(conn, shift.id).await?;
        let statistics = compute_statistics(shift.shift_start, shift_end, &shift_pauses, earnings)?;

        if !shifts::finalize(conn, shift.id, shift_end, &statistics).await? {
            return Err(CoreError::NoActiveShift);
        }
        signals::delete_for_shift(conn, shift.id).await?;

        Ok(ShiftSummary {
            shift_id: shift.id,
            driver_id: shift.driver_id.clone(),
            shift_start: shift.shift_start,
            shift_end,
            statistics,
        })
    }

    /// The driver's open shift, if any.
    pub async fn get_active_shift(&self, driver_id: &DriverId) -> CoreResult<Option<Shift>> {
        let mut conn = self.storage.acquire().await?;
        Ok(shifts::find_active(&mut conn, driver_id).await?)
    }

    /// Current signal state, as the validator sees it.
    pub async fn signal_state(&self, driver_id: &DriverId) -> CoreResult<DriverSignalState> {
        let mut conn = self.storage.acquire().await?;
        DriverSignalState::load(&mut conn, driver_id).await
    }

    /// True iff the driver has an active shift that is not paused.
    pub async fn driver_is_available(&self, driver_id: &DriverId) -> CoreResult<bool> {
        let state = self.signal_state(driver_id).await?;
        Ok(state.shift.is_some() && !state.is_paused())
    }

    pub async fn get_shift_status(
        &self,
        driver_id: &DriverId,
        now: DateTime<Utc>,
    ) -> CoreResult<ShiftStatus> {
        let mut conn = self.storage.acquire().await?;
        let state = DriverSignalState::load(&mut conn, driver_id).await?;

        let Some(shift) = &state.shift else {
            return Ok(ShiftStatus::default());
        };

        let pause = PauseTracker::status_in(&mut conn, shift.id, now).await?;

        Ok(ShiftStatus {
            is_on_shift: true,
            is_paused: pause.is_paused,
            shift_id: Some(shift.id),
            shift_start: Some(shift.shift_start),
            elapsed_ms: Some((now - shift.shift_start).num_milliseconds().max(0)),
            last_signal: state.last_kind(),
            planned_duration_ms: shift.planned_duration_ms,
            pause,
        })
    }
}
