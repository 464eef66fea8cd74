//! Time normalisation.
//!
//! Converts a raw start/end pair into worked minutes.  Elapsed time is
//! floored to the policy's rounding granularity (never rounded up) and
//! regular records spanning the lunch window lose a fixed break.

use crate::config::WagePolicy;
use crate::error::{WageError, WageResult};
use crate::models::{AttendanceRecord, WorkType};
use chrono::{NaiveTime, Timelike};
use rust_decimal::Decimal;

const MINUTES_PER_DAY: i64 = 24 * 60;

/// Worked time for a single record, in whole minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NormalizedHours {
    pub total_minutes: u32,
    pub break_minutes: u32,
    pub net_minutes: u32,
}

impl NormalizedHours {
    pub fn total_hours(&self) -> Decimal {
        minutes_to_hours(self.total_minutes)
    }

    pub fn break_hours(&self) -> Decimal {
        minutes_to_hours(self.break_minutes)
    }

    pub fn net_hours(&self) -> Decimal {
        minutes_to_hours(self.net_minutes)
    }
}

/// Exact conversion of whole minutes to hours.
pub fn minutes_to_hours(minutes: u32) -> Decimal {
    Decimal::from(minutes) / Decimal::from(60)
}

/// Normalise a raw time span.
///
/// A span whose end precedes its start without the overnight flag, or
/// an overnight span longer than a day, is rejected.  Zero-length spans
/// are valid and yield zero hours.
pub fn normalize(
    start: NaiveTime,
    end: NaiveTime,
    work_type: WorkType,
    overnight: bool,
    policy: &WagePolicy,
) -> WageResult<NormalizedHours> {
    let mut elapsed = (end - start).num_minutes();
    if overnight {
        elapsed += MINUTES_PER_DAY;
    }
    if elapsed < 0 {
        return Err(WageError::validation(format!(
            "end time {} is before start time {} on a non-overnight record",
            end, start
        )));
    }
    if elapsed > MINUTES_PER_DAY {
        return Err(WageError::validation(format!(
            "span {}..{} exceeds 24 hours",
            start, end
        )));
    }

    let step = i64::from(policy.rounding_minutes.max(1));
    let total_minutes = (elapsed - elapsed % step) as u32;

    let break_minutes = if work_type == WorkType::Regular
        && start.hour() < policy.break_end_hour
        && end.hour() > policy.break_start_hour
    {
        policy.break_minutes
    } else {
        0
    };

    Ok(NormalizedHours {
        total_minutes,
        break_minutes,
        net_minutes: total_minutes.saturating_sub(break_minutes),
    })
}

/// Normalise an attendance record using its own type and overnight flag.
pub fn normalize_record(record: &AttendanceRecord, policy: &WagePolicy) -> WageResult<NormalizedHours> {
    normalize(
        record.start_time,
        record.end_time,
        record.work_type,
        record.overnight,
        policy,
    )
    .map_err(|err| match err {
        WageError::Validation(msg) => WageError::Validation(format!("record {}: {}", record.id, msg)),
        other => other,
    })
}
