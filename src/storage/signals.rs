//! Shift signal history.
//!
//! The history of a shift is ordered by its sequence number. It is only
//! kept while the shift is open; stopping a shift purges it.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::SqliteConnection;
use sqlx::sqlite::SqliteRow;

use super::{StorageError, StorageResult, from_millis, to_millis};
use crate::model::{DriverId, ShiftId, Signal, SignalKind};

const SIGNAL_COLUMNS: &str = "id, shift_id, driver_id, signal, seq, ts, planned_duration_ms";

fn row_to_signal(row: &SqliteRow) -> StorageResult<Signal> {
    let raw_kind: String = row.try_get("signal")?;
    let kind = raw_kind
        .parse::<SignalKind>()
        .map_err(|e| StorageError::CorruptRow(e.to_string()))?;

    Ok(Signal {
        id: row.try_get("id")?,
        shift_id: row.try_get("shift_id")?,
        driver_id: DriverId::new(row.try_get::<String, _>("driver_id")?),
        kind,
        seq: row.try_get("seq")?,
        timestamp: from_millis(row.try_get("ts")?)?,
        planned_duration_ms: row.try_get("planned_duration_ms")?,
    })
}

/// Append a signal at position `seq`.
///
/// Fails with a constraint violation if another signal already took that
/// position.
pub async fn insert(
    conn: &mut SqliteConnection,
    shift_id: ShiftId,
    driver_id: &DriverId,
    kind: SignalKind,
    seq: i64,
    timestamp: DateTime<Utc>,
    planned_duration_ms: Option<i64>,
) -> StorageResult<Signal> {
    let result = sqlx::query(
        r#"
        INSERT INTO shift_signals (shift_id, driver_id, signal, seq, ts, planned_duration_ms)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(shift_id)
    .bind(driver_id.as_str())
    .bind(kind.as_str())
    .bind(seq)
    .bind(to_millis(timestamp))
    .bind(planned_duration_ms)
    .execute(&mut *conn)
    .await?;

    Ok(Signal {
        id: result.last_insert_rowid(),
        shift_id,
        driver_id: driver_id.clone(),
        kind,
        seq,
        timestamp,
        planned_duration_ms,
    })
}

/// The most recent signals of a shift, newest first.
pub async fn recent(
    conn: &mut SqliteConnection,
    shift_id: ShiftId,
    limit: u32,
) -> StorageResult<Vec<Signal>> {
    let sql = format!(
        "SELECT {SIGNAL_COLUMNS} FROM shift_signals WHERE shift_id = ? ORDER BY seq DESC LIMIT ?"
    );
    let rows = sqlx::query(&sql)
        .bind(shift_id)
        .bind(i64::from(limit))
        .fetch_all(&mut *conn)
        .await?;

    rows.iter().map(row_to_signal).collect()
}

pub async fn latest(conn: &mut SqliteConnection, shift_id: ShiftId) -> StorageResult<Option<Signal>> {
    Ok(recent(conn, shift_id, 1).await?.into_iter().next())
}

/// The most recent signal of the given kind.
pub async fn latest_of_kind(
    conn: &mut SqliteConnection,
    shift_id: ShiftId,
    kind: SignalKind,
) -> StorageResult<Option<Signal>> {
    let sql = format!(
        "SELECT {SIGNAL_COLUMNS} FROM shift_signals \
         WHERE shift_id = ? AND signal = ? ORDER BY seq DESC LIMIT 1"
    );
    let row = sqlx::query(&sql)
        .bind(shift_id)
        .bind(kind.as_str())
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(row_to_signal).transpose()
}

/// Drop the whole signal history of a shift.
pub async fn delete_for_shift(conn: &mut SqliteConnection, shift_id: ShiftId) -> StorageResult<u64> {
    let result = sqlx::query("DELETE FROM shift_signals WHERE shift_id = ?")
        .bind(shift_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}
