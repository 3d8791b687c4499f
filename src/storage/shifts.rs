//! Shift records.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::SqliteConnection;
use sqlx::sqlite::SqliteRow;

use super::{StorageResult, from_millis, from_millis_opt, to_millis};
use crate::model::{DriverId, Shift, ShiftId, ShiftStatistics};

const SHIFT_COLUMNS: &str = "id, driver_id, shift_start, shift_end, planned_duration_ms, \
     total_duration_ms, work_time_ms, break_time_ms, num_breaks, average_break_ms, \
     total_earnings_cents";

fn row_to_shift(row: &SqliteRow) -> StorageResult<Shift> {
    let shift_end = from_millis_opt(row.try_get("shift_end")?)?;

    let statistics = match shift_end {
        Some(_) => Some(ShiftStatistics {
            total_duration_ms: row.try_get::<Option<i64>, _>("total_duration_ms")?.unwrap_or(0),
            work_time_ms: row.try_get::<Option<i64>, _>("work_time_ms")?.unwrap_or(0),
            break_time_ms: row.try_get::<Option<i64>, _>("break_time_ms")?.unwrap_or(0),
            num_breaks: row.try_get::<Option<i64>, _>("num_breaks")?.unwrap_or(0),
            average_break_ms: row.try_get::<Option<i64>, _>("average_break_ms")?.unwrap_or(0),
            total_earnings_cents: row
                .try_get::<Option<i64>, _>("total_earnings_cents")?
                .unwrap_or(0),
        }),
        None => None,
    };

    Ok(Shift {
        id: row.try_get("id")?,
        driver_id: DriverId::new(row.try_get::<String, _>("driver_id")?),
        shift_start: from_millis(row.try_get("shift_start")?)?,
        shift_end,
        planned_duration_ms: row.try_get("planned_duration_ms")?,
        statistics,
    })
}

/// Open a new shift. Fails with a constraint violation when the driver
/// already has an open one.
pub async fn insert(
    conn: &mut SqliteConnection,
    driver_id: &DriverId,
    shift_start: DateTime<Utc>,
    planned_duration_ms: Option<i64>,
) -> StorageResult<Shift> {
    let result = sqlx::query(
        r#"
        INSERT INTO shifts (driver_id, shift_start, planned_duration_ms)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(driver_id.as_str())
    .bind(to_millis(shift_start))
    .bind(planned_duration_ms)
    .execute(&mut *conn)
    .await?;

    Ok(Shift {
        id: result.last_insert_rowid(),
        driver_id: driver_id.clone(),
        shift_start,
        shift_end: None,
        planned_duration_ms,
        statistics: None,
    })
}

/// The driver's open shift, if any.
pub async fn find_active(
    conn: &mut SqliteConnection,
    driver_id: &DriverId,
) -> StorageResult<Option<Shift>> {
    let sql = format!(
        "SELECT {SHIFT_COLUMNS} FROM shifts WHERE driver_id = ? AND shift_end IS NULL"
    );
    let row = sqlx::query(&sql)
        .bind(driver_id.as_str())
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(row_to_shift).transpose()
}

pub async fn find_by_id(conn: &mut SqliteConnection, id: ShiftId) -> StorageResult<Option<Shift>> {
    let sql = format!("SELECT {SHIFT_COLUMNS} FROM shifts WHERE id = ?");
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(row_to_shift).transpose()
}

/// Close an open shift and store its statistics.
///
/// Returns `false` when the shift was already closed or does not exist.
pub async fn finalize(
    conn: &mut SqliteConnection,
    id: ShiftId,
    shift_end: DateTime<Utc>,
    stats: &ShiftStatistics,
) -> StorageResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE shifts
        SET shift_end = ?,
            total_duration_ms = ?,
            work_time_ms = ?,
            break_time_ms = ?,
            num_breaks = ?,
            average_break_ms = ?,
            total_earnings_cents = ?
        WHERE id = ? AND shift_end IS NULL
        "#,
    )
    .bind(to_millis(shift_end))
    .bind(stats.total_duration_ms)
    .bind(stats.work_time_ms)
    .bind(stats.break_time_ms)
    .bind(stats.num_breaks)
    .bind(stats.average_break_ms)
    .bind(stats.total_earnings_cents)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Remove a shift row. Callers delete dependent rows first.
pub async fn delete(conn: &mut SqliteConnection, id: ShiftId) -> StorageResult<bool> {
    let result = sqlx::query("DELETE FROM shifts WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() == 1)
}
