//! Data source abstraction.
//!
//! The engine reads attendance, rate profiles, adjustments and scan
//! discrepancies through [`WageDataSource`] so that storage stays
//! outside the calculation core.  [`InMemorySource`] backs the demo
//! server and the tests.

use crate::attendance::{apply_edit, soft_delete, AttendanceTemplate, RecordEdit};
use crate::config::WagePolicy;
use crate::discrepancy::update_status;
use crate::error::{SourceError, WageError, WageResult};
use crate::models::{check_id, Adjustment, AttendanceRecord, DcRateProfile, ResolutionStatus, ScanDiscrepancy};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

/// Capabilities the period calculation needs from storage.
///
/// Implementations must be thread-safe; calls may be retried when they
/// fail with [`SourceError::Transient`].
#[async_trait]
pub trait WageDataSource: Send + Sync {
    /// Contractors with at least one live record for the project in
    /// `[start, end)`.
    async fn contractors_with_attendance(
        &self,
        project_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<String>, SourceError>;

    async fn attendance(
        &self,
        contractor_id: &str,
        project_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, SourceError>;

    /// The profile with the latest effective date on or before `on_or_before`.
    async fn latest_rate_profile(
        &self,
        contractor_id: &str,
        on_or_before: NaiveDate,
    ) -> Result<Option<DcRateProfile>, SourceError>;

    async fn adjustments(&self, contractor_id: &str, period_code: &str) -> Result<Vec<Adjustment>, SourceError>;

    /// Discrepancies for the project dated within `[start, end)`.
    async fn discrepancies(
        &self,
        project_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ScanDiscrepancy>, SourceError>;

    /// Persist newly detected discrepancies.  Records whose id already
    /// exists are left untouched.
    async fn save_discrepancies(&self, discrepancies: Vec<ScanDiscrepancy>) -> Result<(), SourceError>;
}

#[derive(Default)]
struct Tables {
    records: HashMap<String, AttendanceRecord>,
    profiles: Vec<DcRateProfile>,
    adjustments: Vec<Adjustment>,
    discrepancies: HashMap<String, ScanDiscrepancy>,
}

#[derive(Default)]
pub struct InMemorySource {
    tables: RwLock<Tables>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_records(&self, records: Vec<AttendanceRecord>) -> WageResult<()> {
        for record in &records {
            check_id("project", &record.project_id)
                .and_then(|_| check_id("contractor", &record.contractor_id))
                .map_err(|msg| WageError::validation(format!("record {}: {}", record.id, msg)))?;
        }
        let mut tables = self.tables.write().await;
        if let Some(dup) = records.iter().find(|r| tables.records.contains_key(&r.id)) {
            return Err(WageError::Conflict(format!("record {} already exists", dup.id)));
        }
        for record in records {
            tables.records.insert(record.id.clone(), record);
        }
        Ok(())
    }

    /// Fan a template out to every contractor and store the records.
    pub async fn submit(
        &self,
        batch_id: &str,
        template: &AttendanceTemplate,
        contractor_ids: &[String],
        policy: &WagePolicy,
    ) -> WageResult<Vec<AttendanceRecord>> {
        let records = template.fan_out(batch_id, contractor_ids, policy)?;
        self.insert_records(records.clone()).await?;
        Ok(records)
    }

    pub async fn edit_record(
        &self,
        id: &str,
        edit: &RecordEdit,
        editor: &str,
        reason: Option<String>,
        at: DateTime<Utc>,
        policy: &WagePolicy,
    ) -> WageResult<AttendanceRecord> {
        let mut tables = self.tables.write().await;
        let current = tables
            .records
            .get(id)
            .ok_or_else(|| WageError::NotFound(format!("attendance record {}", id)))?;
        let updated = apply_edit(current, edit, editor, reason, at, policy)?;
        tables.records.insert(id.to_string(), updated.clone());
        Ok(updated)
    }

    pub async fn delete_record(
        &self,
        id: &str,
        editor: &str,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> WageResult<AttendanceRecord> {
        let mut tables = self.tables.write().await;
        let current = tables
            .records
            .get(id)
            .ok_or_else(|| WageError::NotFound(format!("attendance record {}", id)))?;
        let updated = soft_delete(current, editor, reason, at)?;
        tables.records.insert(id.to_string(), updated.clone());
        Ok(updated)
    }

    pub async fn record(&self, id: &str) -> Option<AttendanceRecord> {
        self.tables.read().await.records.get(id).cloned()
    }

    pub async fn add_rate_profile(&self, profile: DcRateProfile) -> WageResult<()> {
        profile
            .validate()
            .map_err(|msg| WageError::validation(format!("rate profile for {}: {}", profile.contractor_id, msg)))?;
        let mut tables = self.tables.write().await;
        tables
            .profiles
            .retain(|p| !(p.contractor_id == profile.contractor_id && p.effective_date == profile.effective_date));
        tables.profiles.push(profile);
        Ok(())
    }

    pub async fn add_adjustment(&self, adjustment: Adjustment) -> WageResult<()> {
        adjustment.validate().map_err(WageError::validation)?;
        self.tables.write().await.adjustments.push(adjustment);
        Ok(())
    }

    pub async fn discrepancy(&self, id: &str) -> Option<ScanDiscrepancy> {
        self.tables.read().await.discrepancies.get(id).cloned()
    }

    /// Operator resolution action.
    pub async fn set_discrepancy_status(
        &self,
        id: &str,
        status: ResolutionStatus,
        actor: &str,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> WageResult<ScanDiscrepancy> {
        let mut tables = self.tables.write().await;
        let discrepancy = tables
            .discrepancies
            .get_mut(id)
            .ok_or_else(|| WageError::NotFound(format!("discrepancy {}", id)))?;
        update_status(discrepancy, status, actor, note, at);
        Ok(discrepancy.clone())
    }
}

#[async_trait]
impl WageDataSource for InMemorySource {
    async fn contractors_with_attendance(
        &self,
        project_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<String>, SourceError> {
        let tables = self.tables.read().await;
        let ids: BTreeSet<String> = crate::attendance::collect(tables.records.values(), project_id, start, end)
            .into_iter()
            .map(|r| r.contractor_id.clone())
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn attendance(
        &self,
        contractor_id: &str,
        project_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, SourceError> {
        let tables = self.tables.read().await;
        let mut records: Vec<AttendanceRecord> =
            crate::attendance::collect(tables.records.values(), project_id, start, end)
                .into_iter()
                .filter(|r| r.contractor_id == contractor_id)
                .cloned()
                .collect();
        records.sort_by(|a, b| (a.work_date, a.start_time, &a.id).cmp(&(b.work_date, b.start_time, &b.id)));
        Ok(records)
    }

    async fn latest_rate_profile(
        &self,
        contractor_id: &str,
        on_or_before: NaiveDate,
    ) -> Result<Option<DcRateProfile>, SourceError> {
        let tables = self.tables.read().await;
        Ok(tables
            .profiles
            .iter()
            .filter(|p| p.contractor_id == contractor_id && p.effective_date <= on_or_before)
            .max_by_key(|p| p.effective_date)
            .cloned())
    }

    async fn adjustments(&self, contractor_id: &str, period_code: &str) -> Result<Vec<Adjustment>, SourceError> {
        let tables = self.tables.read().await;
        Ok(tables
            .adjustments
            .iter()
            .filter(|a| a.contractor_id == contractor_id && a.period_code == period_code)
            .cloned()
            .collect())
    }

    async fn discrepancies(
        &self,
        project_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ScanDiscrepancy>, SourceError> {
        let tables = self.tables.read().await;
        let mut found: Vec<ScanDiscrepancy> = tables
            .discrepancies
            .values()
            .filter(|d| d.project_id == project_id && d.work_date >= start && d.work_date < end)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    async fn save_discrepancies(&self, discrepancies: Vec<ScanDiscrepancy>) -> Result<(), SourceError> {
        let mut tables = self.tables.write().await;
        for discrepancy in discrepancies {
            tables.discrepancies.entry(discrepancy.id.clone()).or_insert(discrepancy);
        }
        Ok(())
    }
}
