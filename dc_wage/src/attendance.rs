//! Attendance collection and record maintenance.
//!
//! Records are never mutated in place: an edit or soft delete returns a
//! new record carrying an audit entry describing what changed.

use crate::config::WagePolicy;
use crate::error::{WageError, WageResult};
use crate::models::{
    check_id, AttendanceRecord, EditHistoryEntry, FieldChange, RecordSource, WorkType, ID_SEPARATOR,
};
use crate::normalize::normalize;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Shared fields of one submission covering several contractors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceTemplate {
    pub project_id: String,
    pub work_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub work_type: WorkType,
    #[serde(default)]
    pub overnight: bool,
    pub source: RecordSource,
}

impl AttendanceTemplate {
    /// Materialise one independent record per contractor.  Duplicate
    /// contractor ids are collapsed.
    pub fn fan_out(
        &self,
        batch_id: &str,
        contractor_ids: &[String],
        policy: &WagePolicy,
    ) -> WageResult<Vec<AttendanceRecord>> {
        normalize(self.start_time, self.end_time, self.work_type, self.overnight, policy)?;
        check_id("batch", batch_id).map_err(WageError::validation)?;
        check_id("project", &self.project_id).map_err(WageError::validation)?;
        let unique: BTreeSet<&str> = contractor_ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .collect();
        if unique.is_empty() {
            return Err(WageError::validation("at least one contractor is required"));
        }
        for id in &unique {
            check_id("contractor", id).map_err(WageError::validation)?;
        }
        Ok(unique
            .into_iter()
            .map(|contractor_id| AttendanceRecord {
                id: format!("{}{}{}", batch_id, ID_SEPARATOR, contractor_id),
                contractor_id: contractor_id.to_string(),
                project_id: self.project_id.clone(),
                work_date: self.work_date,
                start_time: self.start_time,
                end_time: self.end_time,
                work_type: self.work_type,
                overnight: self.overnight,
                source: self.source,
                late_minutes: None,
                deleted: false,
                history: Vec::new(),
            })
            .collect())
    }
}

/// Fields an authorised edit may change.  `None` leaves a field as is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordEdit {
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub work_type: Option<WorkType>,
    pub overnight: Option<bool>,
    pub late_minutes: Option<u32>,
}

fn track<T: PartialEq + std::fmt::Debug>(
    changes: &mut Vec<FieldChange>,
    field: &str,
    current: &mut T,
    new: Option<T>,
) {
    if let Some(value) = new {
        if *current != value {
            changes.push(FieldChange {
                field: field.to_string(),
                old_value: format!("{:?}", current),
                new_value: format!("{:?}", value),
            });
            *current = value;
        }
    }
}

/// Apply `edit` to a copy of `record`, appending an audit entry.
pub fn apply_edit(
    record: &AttendanceRecord,
    edit: &RecordEdit,
    editor: &str,
    reason: Option<String>,
    at: DateTime<Utc>,
    policy: &WagePolicy,
) -> WageResult<AttendanceRecord> {
    if record.deleted {
        return Err(WageError::Conflict(format!("record {} is deleted", record.id)));
    }
    let mut updated = record.clone();
    let mut changes = Vec::new();
    track(&mut changes, "start_time", &mut updated.start_time, edit.start_time);
    track(&mut changes, "end_time", &mut updated.end_time, edit.end_time);
    track(&mut changes, "work_type", &mut updated.work_type, edit.work_type);
    track(&mut changes, "overnight", &mut updated.overnight, edit.overnight);
    track(&mut changes, "late_minutes", &mut updated.late_minutes, edit.late_minutes.map(Some));
    if changes.is_empty() {
        return Err(WageError::validation(format!("edit of record {} changes nothing", record.id)));
    }
    normalize(updated.start_time, updated.end_time, updated.work_type, updated.overnight, policy)?;
    updated.history.push(EditHistoryEntry {
        edited_by: editor.to_string(),
        edited_at: at,
        reason,
        changes,
    });
    Ok(updated)
}

/// Mark a record deleted while keeping it for audit.
pub fn soft_delete(
    record: &AttendanceRecord,
    editor: &str,
    reason: Option<String>,
    at: DateTime<Utc>,
) -> WageResult<AttendanceRecord> {
    if record.deleted {
        return Err(WageError::Conflict(format!("record {} is already deleted", record.id)));
    }
    let mut updated = record.clone();
    updated.deleted = true;
    updated.history.push(EditHistoryEntry {
        edited_by: editor.to_string(),
        edited_at: at,
        reason,
        changes: vec![FieldChange {
            field: "deleted".to_string(),
            old_value: "false".to_string(),
            new_value: "true".to_string(),
        }],
    });
    Ok(updated)
}

/// Live records of `project_id` dated within `[start, end)`.
pub fn collect<'a>(
    records: impl IntoIterator<Item = &'a AttendanceRecord>,
    project_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<&'a AttendanceRecord> {
    records
        .into_iter()
        .filter(|r| !r.deleted && r.project_id == project_id && r.work_date >= start && r.work_date < end)
        .collect()
}

/// Late minutes for one contractor-day.  An explicit value on any
/// manual record wins; otherwise the earliest manual regular start is
/// compared with the shift start.
pub fn late_minutes_for_day(day: &[&AttendanceRecord], policy: &WagePolicy) -> u32 {
    let manual = || day.iter().filter(|r| r.source == RecordSource::Manual && !r.deleted);
    if let Some(explicit) = manual().filter_map(|r| r.late_minutes).max() {
        return explicit;
    }
    manual()
        .filter(|r| r.work_type == WorkType::Regular)
        .map(|r| r.start_time)
        .min()
        .map(|start| (start - policy.shift_start).num_minutes().max(0) as u32)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn template() -> AttendanceTemplate {
        AttendanceTemplate {
            project_id: "p-1".into(),
            work_date: NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(),
            start_time: t(8, 0),
            end_time: t(17, 0),
            work_type: WorkType::Regular,
            overnight: false,
            source: RecordSource::Manual,
        }
    }

    #[test]
    fn fan_out_creates_one_record_per_contractor() {
        let ids = vec!["dc-2".to_string(), "dc-1".to_string(), "dc-2".to_string()];
        let records = template().fan_out("r1", &ids, &WagePolicy::default()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "r1:dc-1");
        assert_eq!(records[1].contractor_id, "dc-2");
        assert!(records.iter().all(|r| r.project_id == "p-1" && r.history.is_empty()));
    }

    #[test]
    fn fan_out_rejects_bad_span_and_empty_selection() {
        let mut bad = template();
        bad.end_time = t(7, 0);
        assert!(bad.fan_out("r1", &["dc-1".into()], &WagePolicy::default()).is_err());
        assert!(template().fan_out("r1", &[], &WagePolicy::default()).is_err());
        assert!(matches!(
            template().fan_out("r1", &["dc:1".into()], &WagePolicy::default()),
            Err(WageError::Validation(_))
        ));
    }

    #[test]
    fn edit_records_an_audit_entry() {
        let policy = WagePolicy::default();
        let record = template().fan_out("r1", &["dc-1".into()], &policy).unwrap().remove(0);
        let edit = RecordEdit {
            end_time: Some(t(18, 0)),
            start_time: Some(t(8, 0)),
            ..RecordEdit::default()
        };
        let updated = apply_edit(&record, &edit, "foreman", Some("forgot OT".into()), Utc::now(), &policy).unwrap();
        assert_eq!(updated.end_time, t(18, 0));
        assert_eq!(record.end_time, t(17, 0));
        assert_eq!(updated.history.len(), 1);
        assert_eq!(updated.history[0].changes.len(), 1);
        assert_eq!(updated.history[0].changes[0].field, "end_time");
    }

    #[test]
    fn empty_edit_is_rejected() {
        let policy = WagePolicy::default();
        let record = template().fan_out("r1", &["dc-1".into()], &policy).unwrap().remove(0);
        let result = apply_edit(&record, &RecordEdit::default(), "foreman", None, Utc::now(), &policy);
        assert!(matches!(result, Err(WageError::Validation(_))));
    }

    #[test]
    fn soft_deleted_records_are_not_collected() {
        let policy = WagePolicy::default();
        let records = template()
            .fan_out("r1", &["dc-1".into(), "dc-2".into()], &policy)
            .unwrap();
        let deleted = soft_delete(&records[0], "engineer", None, Utc::now()).unwrap();
        assert!(soft_delete(&deleted, "engineer", None, Utc::now()).is_err());
        let all = vec![deleted, records[1].clone()];
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 1, 16).unwrap();
        let live = collect(&all, "p-1", start, end);
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].contractor_id, "dc-2");
        assert!(collect(&all, "p-2", start, end).is_empty());
    }

    #[test]
    fn lateness_prefers_explicit_value() {
        let policy = WagePolicy::default();
        let mut record = template().fan_out("r1", &["dc-1".into()], &policy).unwrap().remove(0);
        record.start_time = t(8, 20);
        assert_eq!(late_minutes_for_day(&[&record], &policy), 20);
        record.late_minutes = Some(5);
        assert_eq!(late_minutes_for_day(&[&record], &policy), 5);
        record.late_minutes = None;
        record.start_time = t(7, 45);
        assert_eq!(late_minutes_for_day(&[&record], &policy), 0);
    }
}
