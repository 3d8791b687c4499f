//! Pause tracking.
//!
//! A pause only becomes a record once it is over: the (`pause`, `continue`)
//! signal pair at the head of the shift history is turned into a [`Pause`].
//! Whether a driver is paused right now is never stored; it is read off
//! the latest signal every time.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::{info, instrument};

use crate::error::{CoreError, CoreResult};
use crate::model::{DriverId, Pause, PauseStatus, ShiftId, SignalKind};
use crate::storage::{Storage, StorageError, pauses, shifts, signals};

#[derive(Clone)]
pub struct PauseTracker {
    storage: Storage,
}

impl PauseTracker {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Record the pause that the driver's last two signals just completed.
    #[instrument(skip(self), fields(driver_id = %driver_id))]
    pub async fn materialize_pause(&self, driver_id: &DriverId) -> CoreResult<Pause> {
        let mut tx = self.storage.begin().await?;
        let pause = Self::materialize_in(&mut tx, driver_id).await?;
        tx.commit().await.map_err(StorageError::from)?;
        Ok(pause)
    }

    /// Same as [`materialize_pause`](Self::materialize_pause) on a caller's
    /// connection, so it can share a transaction with the `continue` signal.
    pub(crate) async fn materialize_in(
        conn: &mut SqliteConnection,
        driver_id: &DriverId,
    ) -> CoreResult<Pause> {
        let shift = shifts::find_active(conn, driver_id)
            .await?
            .ok_or(CoreError::NoActiveShift)?;

        let recent = signals::recent(conn, shift.id, 2).await?;
        let (pause_signal, continue_signal) = match recent.as_slice() {
            [latest, previous]
                if latest.kind == SignalKind::Continue && previous.kind == SignalKind::Pause =>
            {
                (previous, latest)
            }
            other => {
                let found: Vec<&str> = other.iter().rev().map(|s| s.kind.as_str()).collect();
                return Err(CoreError::InvalidSignalSequence(format!(
                    "expected (pause, continue), found ({})",
                    found.join(", ")
                )));
            }
        };

        let duration_ms =
            (continue_signal.timestamp - pause_signal.timestamp).num_milliseconds();
        if duration_ms < 0 {
            return Err(CoreError::InvalidSignalSequence(format!(
                "continue at {} precedes pause at {}",
                continue_signal.timestamp, pause_signal.timestamp
            )));
        }
        if pause_signal.timestamp < shift.shift_start {
            return Err(CoreError::InvalidSignalSequence(format!(
                "pause at {} precedes shift start {}",
                pause_signal.timestamp, shift.shift_start
            )));
        }

        let pause = pauses::insert(
            conn,
            shift.id,
            pause_signal.timestamp,
            continue_signal.timestamp,
            duration_ms,
        )
        .await?;

        info!(
            driver_id = %driver_id,
            shift_id = shift.id,
            duration_ms,
            "Pause recorded"
        );

        Ok(pause)
    }

    /// Whether the driver is paused, derived from the latest signal.
    ///
    /// A driver without an active shift is reported as not paused.
    pub async fn get_pause_status(
        &self,
        driver_id: &DriverId,
        now: DateTime<Utc>,
    ) -> CoreResult<PauseStatus> {
        let mut conn = self.storage.acquire().await?;
        match shifts::find_active(&mut conn, driver_id).await? {
            Some(shift) => Self::status_in(&mut conn, shift.id, now).await,
            None => Ok(PauseStatus::default()),
        }
    }

    pub(crate) async fn status_in(
        conn: &mut SqliteConnection,
        shift_id: ShiftId,
        now: DateTime<Utc>,
    ) -> CoreResult<PauseStatus> {
        let latest = signals::latest(conn, shift_id).await?;

        let status = match latest {
            Some(signal) if signal.kind == SignalKind::Pause => {
                let last_pause_end = signals::latest_of_kind(conn, shift_id, SignalKind::Continue)
                    .await?
                    .map(|s| s.timestamp);
                PauseStatus {
                    is_paused: true,
                    pause_start: Some(signal.timestamp),
                    last_pause_end,
                    elapsed_pause_ms: Some((now - signal.timestamp).num_milliseconds().max(0)),
                }
            }
            Some(signal) if signal.kind == SignalKind::Continue => PauseStatus {
                last_pause_end: Some(signal.timestamp),
                ..PauseStatus::default()
            },
            _ => PauseStatus::default(),
        };

        Ok(status)
    }
}
