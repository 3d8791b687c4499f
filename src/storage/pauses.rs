//! Materialized pause records.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::SqliteConnection;
use sqlx::sqlite::SqliteRow;

use super::{StorageResult, from_millis, to_millis};
use crate::model::{Pause, ShiftId};

fn row_to_pause(row: &SqliteRow) -> StorageResult<Pause> {
    Ok(Pause {
        id: row.try_get("id")?,
        shift_id: row.try_get("shift_id")?,
        pause_start: from_millis(row.try_get("pause_start")?)?,
        pause_end: from_millis(row.try_get("pause_end")?)?,
        duration_ms: row.try_get("duration_ms")?,
    })
}

pub async fn insert(
    conn: &mut SqliteConnection,
    shift_id: ShiftId,
    pause_start: DateTime<Utc>,
    pause_end: DateTime<Utc>,
    duration_ms: i64,
) -> StorageResult<Pause> {
    let result = sqlx::query(
        r#"
        INSERT INTO shift_pauses (shift_id, pause_start, pause_end, duration_ms)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(shift_id)
    .bind(to_millis(pause_start))
    .bind(to_millis(pause_end))
    .bind(duration_ms)
    .execute(&mut *conn)
    .await?;

    Ok(Pause {
        id: result.last_insert_rowid(),
        shift_id,
        pause_start,
        pause_end,
        duration_ms,
    })
}

/// All pauses of a shift in chronological order.
pub async fn list_for_shift(conn: &mut SqliteConnection, shift_id: ShiftId) -> StorageResult<Vec<Pause>> {
    let rows = sqlx::query(
        r#"
        SELECT id, shift_id, pause_start, pause_end, duration_ms
        FROM shift_pauses
        WHERE shift_id = ?
        ORDER BY pause_start, id
        "#,
    )
    .bind(shift_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(row_to_pause).collect()
}

pub async fn delete_for_shift(conn: &mut SqliteConnection, shift_id: ShiftId) -> StorageResult<u64> {
    let result = sqlx::query("DELETE FROM shift_pauses WHERE shift_id = ?")
        .bind(shift_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}
