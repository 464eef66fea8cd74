//! Data models for the wage engine.
//!
//! The `models` module defines the serialisable records the engine
//! consumes (attendance, rate profiles, adjustments, scan
//! discrepancies) and the per-contractor summary it produces.  Money
//! is carried as [`Decimal`]; hours are carried as whole minutes
//! internally and exposed as `Decimal` hours on summaries.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Joins the parts of composite ids such as period and discrepancy ids.
/// Project, contractor and batch ids may not contain it.
pub const ID_SEPARATOR: char = ':';

/// Rejects empty ids and ids containing [`ID_SEPARATOR`].
pub fn check_id(kind: &str, id: &str) -> Result<(), String> {
    if id.trim().is_empty() {
        return Err(format!("{} id is required", kind));
    }
    if id.contains(ID_SEPARATOR) {
        return Err(format!("{} id {:?} must not contain '{}'", kind, id, ID_SEPARATOR));
    }
    Ok(())
}

/// Upper bound for any single money amount or rate taken as input.
pub fn max_money_amount() -> Decimal {
    Decimal::from(1_000_000_000_000i64)
}

fn check_amount(name: &str, value: Decimal) -> Result<(), String> {
    if value < Decimal::ZERO {
        return Err(format!("{} must not be negative, got {}", name, value));
    }
    if value > max_money_amount() {
        return Err(format!("{} exceeds {}, got {}", name, max_money_amount(), value));
    }
    Ok(())
}

/// The kind of time an attendance record represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkType {
    Regular,
    OtMorning,
    OtNoon,
    OtEvening,
}

impl WorkType {
    pub fn is_overtime(self) -> bool {
        !matches!(self, WorkType::Regular)
    }
}

/// Where an attendance record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    /// Submitted by a foreman or engineer as a daily report or OT entry.
    Manual,
    /// Imported from the fingerprint clock.
    Scan,
}

/// One field change recorded when an attendance record is edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub old_value: String,
    pub new_value: String,
}

/// Audit entry produced by every edit or soft delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditHistoryEntry {
    pub edited_by: String,
    pub edited_at: DateTime<Utc>,
    pub reason: Option<String>,
    pub changes: Vec<FieldChange>,
}

/// A unified view over daily reports, OT records and scan data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: String,
    pub contractor_id: String,
    pub project_id: String,
    pub work_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub work_type: WorkType,
    /// The shift ends on the day after `work_date`.
    #[serde(default)]
    pub overnight: bool,
    pub source: RecordSource,
    /// Explicit late arrival in minutes.  When absent, lateness is
    /// derived from the start of the day's first regular record.
    #[serde(default)]
    pub late_minutes: Option<u32>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub history: Vec<EditHistoryEntry>,
}

/// A fixed per-period equipment surcharge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentSurcharge {
    pub name: String,
    pub amount: Decimal,
}

/// A contractor's effective-dated rate table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcRateProfile {
    pub contractor_id: String,
    pub employee_id: String,
    pub effective_date: NaiveDate,
    pub hourly_rate: Decimal,
    #[serde(default)]
    pub professional_rate: Decimal,
    #[serde(default)]
    pub phone_allowance: Decimal,
    #[serde(default)]
    pub accommodation_cost: Decimal,
    #[serde(default)]
    pub follower_count: u32,
    #[serde(default)]
    pub equipment: Vec<EquipmentSurcharge>,
    #[serde(default)]
    pub social_security_exempt: bool,
}

impl DcRateProfile {
    /// Checks the fields the calculator relies on.
    pub fn validate(&self) -> Result<(), String> {
        if self.hourly_rate <= Decimal::ZERO {
            return Err(format!("hourly_rate must be positive, got {}", self.hourly_rate));
        }
        let money = [
            ("hourly_rate", self.hourly_rate),
            ("professional_rate", self.professional_rate),
            ("phone_allowance", self.phone_allowance),
            ("accommodation_cost", self.accommodation_cost),
        ];
        for (name, value) in money {
            check_amount(name, value)?;
        }
        for item in &self.equipment {
            check_amount(&format!("equipment surcharge {}", item.name), item.amount)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentKind {
    Income,
    Expense,
}

/// An ad hoc income or expense line tagged to a contractor and period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adjustment {
    pub id: String,
    pub contractor_id: String,
    pub period_code: String,
    pub kind: AdjustmentKind,
    pub description: String,
    pub amount: Decimal,
}

impl Adjustment {
    pub fn validate(&self) -> Result<(), String> {
        check_amount(&format!("adjustment {}", self.id), self.amount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStatus {
    Pending,
    Investigating,
    Resolved,
    Ignored,
}

impl ResolutionStatus {
    pub fn is_open(self) -> bool {
        matches!(self, ResolutionStatus::Pending | ResolutionStatus::Investigating)
    }
}

/// A mismatch between reported and scanned hours for one contractor/day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanDiscrepancy {
    pub id: String,
    pub contractor_id: String,
    pub project_id: String,
    pub work_date: NaiveDate,
    pub reported_hours: Decimal,
    pub scanned_hours: Decimal,
    /// `reported_hours - scanned_hours`.
    pub difference: Decimal,
    pub severity: Severity,
    pub status: ResolutionStatus,
    #[serde(default)]
    pub resolution_note: Option<String>,
    #[serde(default)]
    pub resolved_by: Option<String>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// The audit trail of a social security contribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialSecurityCalculation {
    pub base: Decimal,
    pub rate: Decimal,
    /// `base * rate` before clamping.
    pub raw_amount: Decimal,
    pub contribution: Decimal,
    pub exempt: bool,
    pub clamped: Option<ClampBound>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClampBound {
    Minimum,
    Maximum,
}

/// Hour buckets for one contractor over one period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourBuckets {
    pub regular: Decimal,
    pub ot_morning: Decimal,
    pub ot_noon: Decimal,
    pub ot_evening: Decimal,
    pub total_ot: Decimal,
    pub total: Decimal,
}

/// Income lines of a wage summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomeLines {
    pub regular_wages: Decimal,
    pub ot_wages: Decimal,
    pub professional_fees: Decimal,
    pub phone_allowance: Decimal,
    pub additional_income: Decimal,
}

impl IncomeLines {
    pub fn total(&self) -> Decimal {
        self.regular_wages
            + self.ot_wages
            + self.professional_fees
            + self.phone_allowance
            + self.additional_income
    }
}

/// Expense lines of a wage summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseLines {
    pub accommodation: Decimal,
    pub follower_accommodation: Decimal,
    pub equipment_costs: Decimal,
    pub additional_expenses: Decimal,
    pub social_security: Decimal,
    pub late_deductions: Decimal,
}

impl ExpenseLines {
    pub fn total(&self) -> Decimal {
        self.accommodation
            + self.follower_accommodation
            + self.equipment_costs
            + self.additional_expenses
            + self.social_security
            + self.late_deductions
    }
}

/// The wage breakdown for one contractor in one period.
///
/// Summaries are always rebuilt from scratch; `net_wages` equals
/// `total_income - total_expenses` by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DcWageSummary {
    pub contractor_id: String,
    pub employee_id: String,
    pub rate_effective_date: NaiveDate,
    pub days_worked: u32,
    pub late_arrivals: u32,
    pub hours: HourBuckets,
    pub income: IncomeLines,
    pub expenses: ExpenseLines,
    pub social_security: SocialSecurityCalculation,
    pub total_income: Decimal,
    pub total_expenses: Decimal,
    pub net_wages: Decimal,
}
