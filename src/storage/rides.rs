//! Ride records.
//!
//! Rides are soft-deletable: a deleted ride keeps its row with
//! `deleted_at` set. Default queries skip deleted rows; listings take an
//! `include_deleted` flag.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::SqliteConnection;
use sqlx::sqlite::SqliteRow;

use super::{StorageError, StorageResult, from_millis, from_millis_opt, to_millis};
use crate::model::{Coordinates, DriverId, NewRide, Ride, RideId, ShiftId};

const RIDE_COLUMNS: &str = "id, shift_id, driver_id, start_lat, start_lng, dest_lat, dest_lng, \
     address, predicted_score, start_time, end_time, distance_km, earnings_cents, deleted_at";

fn row_to_ride(row: &SqliteRow) -> StorageResult<Ride> {
    let predicted_score = row
        .try_get::<Option<i64>, _>("predicted_score")?
        .map(|score| {
            u8::try_from(score)
                .map_err(|_| StorageError::CorruptRow(format!("predicted score out of range: {score}")))
        })
        .transpose()?;

    Ok(Ride {
        id: row.try_get("id")?,
        shift_id: row.try_get("shift_id")?,
        driver_id: DriverId::new(row.try_get::<String, _>("driver_id")?),
        origin: Coordinates::new(row.try_get("start_lat")?, row.try_get("start_lng")?),
        destination: Coordinates::new(row.try_get("dest_lat")?, row.try_get("dest_lng")?),
        address: row.try_get("address")?,
        predicted_score,
        start_time: from_millis(row.try_get("start_time")?)?,
        end_time: from_millis_opt(row.try_get("end_time")?)?,
        distance_km: row.try_get("distance_km")?,
        earnings_cents: row.try_get("earnings_cents")?,
        deleted_at: from_millis_opt(row.try_get("deleted_at")?)?,
    })
}

/// Open a ride on a shift. Fails with a constraint violation when the shift
/// already has an open ride.
pub async fn insert(
    conn: &mut SqliteConnection,
    shift_id: ShiftId,
    driver_id: &DriverId,
    ride: &NewRide,
    start_time: DateTime<Utc>,
) -> StorageResult<Ride> {
    let result = sqlx::query(
        r#"
        INSERT INTO rides (
            shift_id, driver_id, start_lat, start_lng, dest_lat, dest_lng,
            address, predicted_score, start_time
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(shift_id)
    .bind(driver_id.as_str())
    .bind(ride.start_lat)
    .bind(ride.start_lng)
    .bind(ride.dest_lat)
    .bind(ride.dest_lng)
    .bind(ride.address.as_deref())
    .bind(ride.predicted_score.map(i64::from))
    .bind(to_millis(start_time))
    .execute(&mut *conn)
    .await?;

    Ok(Ride {
        id: result.last_insert_rowid(),
        shift_id,
        driver_id: driver_id.clone(),
        origin: ride.origin(),
        destination: ride.destination(),
        address: ride.address.clone(),
        predicted_score: ride.predicted_score,
        start_time,
        end_time: None,
        distance_km: None,
        earnings_cents: None,
        deleted_at: None,
    })
}

pub async fn find_by_id(
    conn: &mut SqliteConnection,
    id: RideId,
    include_deleted: bool,
) -> StorageResult<Option<Ride>> {
    let sql = format!(
        "SELECT {RIDE_COLUMNS} FROM rides WHERE id = ? AND (? OR deleted_at IS NULL)"
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(include_deleted)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(row_to_ride).transpose()
}

/// The open ride of a shift, if any.
pub async fn find_active_for_shift(
    conn: &mut SqliteConnection,
    shift_id: ShiftId,
) -> StorageResult<Option<Ride>> {
    let sql = format!(
        "SELECT {RIDE_COLUMNS} FROM rides \
         WHERE shift_id = ? AND end_time IS NULL AND deleted_at IS NULL"
    );
    let row = sqlx::query(&sql)
        .bind(shift_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(row_to_ride).transpose()
}

/// Every open ride of a driver, across shifts, oldest first.
pub async fn list_active_for_driver(
    conn: &mut SqliteConnection,
    driver_id: &DriverId,
) -> StorageResult<Vec<Ride>> {
    let sql = format!(
        "SELECT {RIDE_COLUMNS} FROM rides \
         WHERE driver_id = ? AND end_time IS NULL AND deleted_at IS NULL \
         ORDER BY start_time, id"
    );
    let rows = sqlx::query(&sql)
        .bind(driver_id.as_str())
        .fetch_all(&mut *conn)
        .await?;

    rows.iter().map(row_to_ride).collect()
}

pub async fn list_for_shift(
    conn: &mut SqliteConnection,
    shift_id: ShiftId,
    include_deleted: bool,
) -> StorageResult<Vec<Ride>> {
    let sql = format!(
        "SELECT {RIDE_COLUMNS} FROM rides \
         WHERE shift_id = ? AND (? OR deleted_at IS NULL) \
         ORDER BY start_time, id"
    );
    let rows = sqlx::query(&sql)
        .bind(shift_id)
        .bind(include_deleted)
        .fetch_all(&mut *conn)
        .await?;

    rows.iter().map(row_to_ride).collect()
}

pub async fn count_for_shift(
    conn: &mut SqliteConnection,
    shift_id: ShiftId,
    include_deleted: bool,
) -> StorageResult<i64> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) as total
        FROM rides
        WHERE shift_id = ? AND (? OR deleted_at IS NULL)
        "#,
    )
    .bind(shift_id)
    .bind(include_deleted)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row.try_get("total")?)
}

/// Sum of earnings over the finished, non-deleted rides of a shift.
pub async fn total_earnings(conn: &mut SqliteConnection, shift_id: ShiftId) -> StorageResult<i64> {
    let row = sqlx::query(
        r#"
        SELECT COALESCE(SUM(earnings_cents), 0) as total
        FROM rides
        WHERE shift_id = ? AND end_time IS NOT NULL AND deleted_at IS NULL
        "#,
    )
    .bind(shift_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row.try_get("total")?)
}

/// Close an open ride. Returns `false` if it was already closed.
pub async fn end(
    conn: &mut SqliteConnection,
    id: RideId,
    end_time: DateTime<Utc>,
    distance_km: f64,
    earnings_cents: i64,
) -> StorageResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE rides
        SET end_time = ?, distance_km = ?, earnings_cents = ?
        WHERE id = ? AND end_time IS NULL
        "#,
    )
    .bind(to_millis(end_time))
    .bind(distance_km)
    .bind(earnings_cents)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Mark a ride deleted. Returns `false` if it was missing or already deleted.
pub async fn soft_delete(
    conn: &mut SqliteConnection,
    id: RideId,
    deleted_at: DateTime<Utc>,
) -> StorageResult<bool> {
    let result = sqlx::query("UPDATE rides SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
        .bind(to_millis(deleted_at))
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() == 1)
}
