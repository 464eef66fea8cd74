//! Scan discrepancy detection.
//!
//! Manually reported hours are compared with fingerprint-scan hours per
//! contractor and day.  Every comparison yields a `pending` record; the
//! detector never resolves or deletes anything.

use crate::config::WagePolicy;
use crate::error::WageResult;
use crate::models::{
    AttendanceRecord, RecordSource, ResolutionStatus, ScanDiscrepancy, Severity, ID_SEPARATOR,
};
use crate::normalize::{minutes_to_hours, normalize_record};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};

/// `warning` when the absolute difference exceeds the policy threshold.
pub fn classify(difference: Decimal, policy: &WagePolicy) -> Severity {
    if difference.abs() > policy.discrepancy_warning_hours {
        Severity::Warning
    } else {
        Severity::Info
    }
}

/// `{project}:{contractor}:{YYYYMMDD}`, one record per contractor-day.
pub fn discrepancy_id(project_id: &str, contractor_id: &str, work_date: NaiveDate) -> String {
    format!(
        "{}{sep}{}{sep}{}",
        project_id,
        contractor_id,
        work_date.format("%Y%m%d"),
        sep = ID_SEPARATOR
    )
}

/// Build the record for one contractor/day comparison.
pub fn compare(
    contractor_id: &str,
    project_id: &str,
    work_date: NaiveDate,
    reported_hours: Decimal,
    scanned_hours: Decimal,
    policy: &WagePolicy,
) -> ScanDiscrepancy {
    let difference = reported_hours - scanned_hours;
    ScanDiscrepancy {
        id: discrepancy_id(project_id, contractor_id, work_date),
        contractor_id: contractor_id.to_string(),
        project_id: project_id.to_string(),
        work_date,
        reported_hours,
        scanned_hours,
        difference,
        severity: classify(difference, policy),
        status: ResolutionStatus::Pending,
        resolution_note: None,
        resolved_by: None,
        resolved_at: None,
    }
}

#[derive(Default)]
struct DayTotals {
    manual: Option<u32>,
    scan: Option<u32>,
}

/// Compare manual and scan hours for every contractor/day that has
/// both.  Days covered by only one source produce nothing.
pub fn detect(records: &[AttendanceRecord], policy: &WagePolicy) -> WageResult<Vec<ScanDiscrepancy>> {
    let mut days: BTreeMap<(String, String, NaiveDate), DayTotals> = BTreeMap::new();
    for record in records.iter().filter(|r| !r.deleted) {
        let net = normalize_record(record, policy)?.net_minutes;
        let day = days
            .entry((
                record.contractor_id.clone(),
                record.project_id.clone(),
                record.work_date,
            ))
            .or_default();
        let slot = match record.source {
            RecordSource::Manual => &mut day.manual,
            RecordSource::Scan => &mut day.scan,
        };
        *slot = Some(slot.unwrap_or(0) + net);
    }

    Ok(days
        .into_iter()
        .filter_map(|((contractor, project, date), totals)| match totals {
            DayTotals {
                manual: Some(manual),
                scan: Some(scan),
            } => Some(compare(
                &contractor,
                &project,
                date,
                minutes_to_hours(manual),
                minutes_to_hours(scan),
                policy,
            )),
            _ => None,
        })
        .collect())
}

/// Detected records that have no existing counterpart for the same
/// contractor, project and day.  Existing records are left as they are.
pub fn new_discrepancies(existing: &[ScanDiscrepancy], detected: Vec<ScanDiscrepancy>) -> Vec<ScanDiscrepancy> {
    let known: HashSet<(&str, &str, NaiveDate)> = existing
        .iter()
        .map(|d| (d.contractor_id.as_str(), d.project_id.as_str(), d.work_date))
        .collect();
    detected
        .into_iter()
        .filter(|d| !known.contains(&(d.contractor_id.as_str(), d.project_id.as_str(), d.work_date)))
        .collect()
}

/// Differences at or below the surface threshold are noise worth
/// showing to operators only on request.
pub fn is_surfaced(discrepancy: &ScanDiscrepancy, policy: &WagePolicy) -> bool {
    discrepancy.difference.abs() > policy.discrepancy_surface_hours
}

/// True when any discrepancy is still pending or under investigation,
/// whatever its size.
pub fn has_unresolved<'a>(discrepancies: impl IntoIterator<Item = &'a ScanDiscrepancy>) -> bool {
    discrepancies.into_iter().any(|d| d.status.is_open())
}

/// Operator action.  Any status may be set from any other.
pub fn update_status(
    discrepancy: &mut ScanDiscrepancy,
    status: ResolutionStatus,
    actor: &str,
    note: Option<String>,
    at: DateTime<Utc>,
) {
    discrepancy.status = status;
    if note.is_some() {
        discrepancy.resolution_note = note;
    }
    if status.is_open() {
        discrepancy.resolved_by = None;
        discrepancy.resolved_at = None;
    } else {
        discrepancy.resolved_by = Some(actor.to_string());
        discrepancy.resolved_at = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkType;
    use chrono::NaiveTime;
    use rust_decimal_macros::dec;

    fn record(id: &str, source: RecordSource, start: u32, end: u32) -> AttendanceRecord {
        AttendanceRecord {
            id: id.to_string(),
            contractor_id: "dc-1".to_string(),
            project_id: "p-1".to_string(),
            work_date: NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(),
            start_time: NaiveTime::from_hms_opt(start, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end, 0, 0).unwrap(),
            work_type: WorkType::Regular,
            overnight: false,
            source,
            late_minutes: None,
            deleted: false,
            history: Vec::new(),
        }
    }

    #[test]
    fn severity_boundary_is_exclusive() {
        let policy = WagePolicy::default();
        assert_eq!(classify(dec!(2.0), &policy), Severity::Info);
        assert_eq!(classify(dec!(-2.0), &policy), Severity::Info);
        assert_eq!(classify(dec!(2.01), &policy), Severity::Warning);
        assert_eq!(classify(dec!(-2.01), &policy), Severity::Warning);
        assert_eq!(classify(Decimal::ZERO, &policy), Severity::Info);
    }

    #[test]
    fn detects_reported_minus_scanned() {
        let records = vec![
            record("m", RecordSource::Manual, 8, 17),
            record("s", RecordSource::Scan, 8, 14),
        ];
        let found = detect(&records, &WagePolicy::default()).unwrap();
        assert_eq!(found.len(), 1);
        let d = &found[0];
        assert_eq!(d.reported_hours, dec!(8));
        assert_eq!(d.scanned_hours, dec!(5));
        assert_eq!(d.difference, dec!(3));
        assert_eq!(d.severity, Severity::Warning);
        assert_eq!(d.status, ResolutionStatus::Pending);
    }

    #[test]
    fn exact_match_still_produces_an_info_record() {
        let records = vec![
            record("m", RecordSource::Manual, 8, 17),
            record("s", RecordSource::Scan, 8, 17),
        ];
        let found = detect(&records, &WagePolicy::default()).unwrap();
        assert_eq!(found[0].severity, Severity::Info);
        assert!(!is_surfaced(&found[0], &WagePolicy::default()));
    }

    #[test]
    fn single_source_days_are_skipped() {
        let records = vec![record("m", RecordSource::Manual, 8, 17)];
        assert!(detect(&records, &WagePolicy::default()).unwrap().is_empty());
    }

    #[test]
    fn existing_records_are_not_replaced() {
        let policy = WagePolicy::default();
        let records = vec![
            record("m", RecordSource::Manual, 8, 17),
            record("s", RecordSource::Scan, 8, 14),
        ];
        let mut existing = detect(&records, &policy).unwrap();
        update_status(&mut existing[0], ResolutionStatus::Ignored, "ops", None, Utc::now());
        let fresh = new_discrepancies(&existing, detect(&records, &policy).unwrap());
        assert!(fresh.is_empty());
        assert!(!has_unresolved(&existing));
    }

    #[test]
    fn reopening_clears_resolver() {
        let policy = WagePolicy::default();
        let mut d = compare("dc-1", "p-1", NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(), dec!(8), dec!(5), &policy);
        update_status(&mut d, ResolutionStatus::Resolved, "ops", Some("clock fault".into()), Utc::now());
        assert_eq!(d.resolved_by.as_deref(), Some("ops"));
        update_status(&mut d, ResolutionStatus::Investigating, "ops", None, Utc::now());
        assert!(d.resolved_by.is_none());
        assert_eq!(d.resolution_note.as_deref(), Some("clock fault"));
        assert!(has_unresolved([&d]));
    }

    #[test]
    fn small_pending_difference_still_counts_as_unresolved() {
        let policy = WagePolicy::default();
        let date = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        let mut d = compare("dc-1", "p-1", date, dec!(8), dec!(7.75), &policy);
        assert!(!is_surfaced(&d, &policy));
        assert!(has_unresolved([&d]));
        update_status(&mut d, ResolutionStatus::Ignored, "ops", Some("rounding".into()), Utc::now());
        assert!(!has_unresolved([&d]));
    }

    #[test]
    fn ids_do_not_collide_across_hyphenated_parts() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        assert_eq!(discrepancy_id("p-1", "dc-1", date), "p-1:dc-1:20250106");
        assert_ne!(discrepancy_id("p-1-dc", "1", date), discrepancy_id("p-1", "dc-1", date));
    }
}
