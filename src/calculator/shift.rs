//! Break aggregation for finished shifts.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{CoreError, CoreResult};
use crate::model::{Pause, ShiftStatistics};

/// Aggregated breaks of one shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BreakStats {
    pub total_break_time_ms: i64,
    pub number_of_breaks: i64,
    pub average_break_duration_ms: i64,
}

/// Sum, count and average the pauses that lie entirely inside the shift.
pub fn compute_breaks(
    shift_start: DateTime<Utc>,
    shift_end: DateTime<Utc>,
    pauses: &[Pause],
) -> BreakStats {
    let (total, count) = pauses
        .iter()
        .filter(|p| p.pause_start >= shift_start && p.pause_end <= shift_end)
        .fold((0_i64, 0_i64), |(total, count), p| {
            (total + p.duration_ms, count + 1)
        });

    BreakStats {
        total_break_time_ms: total,
        number_of_breaks: count,
        average_break_duration_ms: if count == 0 { 0 } else { total / count },
    }
}

/// Working time left once breaks are subtracted.
///
/// A negative result means the caller passed inconsistent figures and is
/// reported, never clamped.
pub fn compute_work_time(total_duration_ms: i64, break_time_ms: i64) -> CoreResult<i64> {
    let work = total_duration_ms - break_time_ms;
    if work < 0 {
        return Err(CoreError::NegativeWorkTime {
            total_ms: total_duration_ms,
            break_ms: break_time_ms,
        });
    }
    Ok(work)
}

/// Final statistics for a shift ending at `shift_end`.
pub fn compute_statistics(
    shift_start: DateTime<Utc>,
    shift_end: DateTime<Utc>,
    pauses: &[Pause],
    total_earnings_cents: i64,
) -> CoreResult<ShiftStatistics> {
    let total_duration_ms = (shift_end - shift_start).num_milliseconds();
    if total_duration_ms < 0 {
        return Err(CoreError::InvalidTimestamp(format!(
            "shift end {shift_end} precedes shift start {shift_start}"
        )));
    }

    let breaks = compute_breaks(shift_start, shift_end, pauses);
    let work_time_ms = compute_work_time(total_duration_ms, breaks.total_break_time_ms)?;

    Ok(ShiftStatistics {
        total_duration_ms,
        work_time_ms,
        break_time_ms: breaks.total_break_time_ms,
        num_breaks: breaks.number_of_breaks,
        average_break_ms: breaks.average_break_duration_ms,
        total_earnings_cents,
    })
}
