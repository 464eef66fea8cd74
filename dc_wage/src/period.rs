//! Wage periods and their lifecycle.
//!
//! A [`WagePeriod`] is the aggregate root of a payroll run: a fixed
//! 15-day window for one project, the per-contractor summaries
//! embedded in it and the totals derived from them.  Status moves
//! strictly forward through `draft → calculated → approved → paid →
//! locked`.

use crate::error::{WageError, WageResult};
use crate::models::{check_id, DcWageSummary, ID_SEPARATOR};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exact length of every period, in days.
pub const PERIOD_LENGTH_DAYS: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodStatus {
    Draft,
    Calculated,
    Approved,
    Paid,
    Locked,
}

impl fmt::Display for PeriodStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeriodStatus::Draft => "draft",
            PeriodStatus::Calculated => "calculated",
            PeriodStatus::Approved => "approved",
            PeriodStatus::Paid => "paid",
            PeriodStatus::Locked => "locked",
        };
        f.write_str(name)
    }
}

/// Audit entry for a status change or recalculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: PeriodStatus,
    pub to: PeriodStatus,
    pub actor: String,
    pub at: DateTime<Utc>,
}

/// Period-level sums over the embedded summaries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodTotals {
    pub contractor_count: u32,
    pub regular_hours: Decimal,
    pub ot_hours: Decimal,
    pub gross_wages: Decimal,
    pub deductions: Decimal,
    pub net_wages: Decimal,
}

impl PeriodTotals {
    /// Elementwise sum over `summaries`.
    pub fn from_summaries(summaries: &[DcWageSummary]) -> Self {
        summaries.iter().fold(PeriodTotals::default(), |mut acc, s| {
            acc.contractor_count += 1;
            acc.regular_hours += s.hours.regular;
            acc.ot_hours += s.hours.total_ot;
            acc.gross_wages += s.total_income;
            acc.deductions += s.total_expenses;
            acc.net_wages += s.net_wages;
            acc
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WagePeriod {
    pub id: String,
    pub period_code: String,
    pub project_id: String,
    pub start_date: NaiveDate,
    /// Exclusive end of the window.
    pub end_date: NaiveDate,
    pub status: PeriodStatus,
    pub summaries: Vec<DcWageSummary>,
    pub totals: PeriodTotals,
    pub has_unresolved_discrepancies: bool,
    /// Bumped on every committed change.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub calculated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history: Vec<StatusChange>,
}

/// `YYYYMM-P1` for periods starting on the 1st, `YYYYMM-P2` otherwise.
pub fn period_code(start: NaiveDate) -> String {
    let half = if start.day() == 1 { "P1" } else { "P2" };
    format!("{}-{}", start.format("%Y%m"), half)
}

pub fn period_id(project_id: &str, code: &str) -> String {
    format!("{}{}{}", project_id, ID_SEPARATOR, code)
}

impl WagePeriod {
    /// Create a draft period.  The span must be exactly 15 days.
    pub fn new(
        project_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> WageResult<Self> {
        check_id("project", project_id).map_err(WageError::validation)?;
        let span = (end_date - start_date).num_days();
        if span != PERIOD_LENGTH_DAYS {
            return Err(WageError::validation(format!(
                "a wage period must span exactly {} days, got {} ({} to {})",
                PERIOD_LENGTH_DAYS, span, start_date, end_date
            )));
        }
        let code = period_code(start_date);
        Ok(Self {
            id: period_id(project_id, &code),
            period_code: code,
            project_id: project_id.to_string(),
            start_date,
            end_date,
            status: PeriodStatus::Draft,
            summaries: Vec::new(),
            totals: PeriodTotals::default(),
            has_unresolved_discrepancies: false,
            version: 0,
            created_at: now,
            calculated_at: None,
            history: Vec::new(),
        })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date < self.end_date
    }

    /// Whether a calculation pass may run.  Approved and paid periods
    /// need `force`; locked periods are never recalculated.
    pub fn ensure_recalculable(&self, force: bool) -> WageResult<()> {
        match self.status {
            PeriodStatus::Draft | PeriodStatus::Calculated => Ok(()),
            PeriodStatus::Approved | PeriodStatus::Paid if force => Ok(()),
            PeriodStatus::Approved | PeriodStatus::Paid => Err(WageError::Conflict(format!(
                "period {} is {}; recalculation requires force",
                self.id, self.status
            ))),
            PeriodStatus::Locked => Err(WageError::Conflict(format!(
                "period {} is locked and cannot be recalculated",
                self.id
            ))),
        }
    }

    /// Replace every summary and the derived fields in one step.
    /// Draft periods move to `calculated`; later statuses are kept.
    pub fn apply_calculation(
        &mut self,
        mut summaries: Vec<DcWageSummary>,
        has_unresolved_discrepancies: bool,
        actor: &str,
        now: DateTime<Utc>,
    ) {
        summaries.sort_by(|a, b| a.contractor_id.cmp(&b.contractor_id));
        self.totals = PeriodTotals::from_summaries(&summaries);
        self.summaries = summaries;
        self.has_unresolved_discrepancies = has_unresolved_discrepancies;
        self.calculated_at = Some(now);
        let from = self.status;
        if from == PeriodStatus::Draft {
            self.status = PeriodStatus::Calculated;
        }
        self.history.push(StatusChange {
            from,
            to: self.status,
            actor: actor.to_string(),
            at: now,
        });
    }

    fn advance(
        &mut self,
        expected: PeriodStatus,
        next: PeriodStatus,
        action: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> WageResult<()> {
        if self.status != expected {
            return Err(WageError::InvalidTransition {
                from: self.status.to_string(),
                action: action.to_string(),
            });
        }
        self.status = next;
        self.history.push(StatusChange {
            from: expected,
            to: next,
            actor: actor.to_string(),
            at: now,
        });
        Ok(())
    }

    pub fn approve(&mut self, actor: &str, now: DateTime<Utc>) -> WageResult<()> {
        self.advance(PeriodStatus::Calculated, PeriodStatus::Approved, "approve", actor, now)
    }

    pub fn mark_paid(&mut self, actor: &str, now: DateTime<Utc>) -> WageResult<()> {
        self.advance(PeriodStatus::Approved, PeriodStatus::Paid, "mark paid", actor, now)
    }

    pub fn lock(&mut self, actor: &str, now: DateTime<Utc>) -> WageResult<()> {
        self.advance(PeriodStatus::Paid, PeriodStatus::Locked, "lock", actor, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn period_codes() {
        assert_eq!(period_code(d(2025, 1, 1)), "202501-P1");
        assert_eq!(period_code(d(2025, 1, 16)), "202501-P2");
        assert_eq!(period_code(d(2025, 12, 2)), "202512-P2");
    }

    #[test]
    fn span_must_be_fifteen_days() {
        let now = Utc::now();
        assert!(matches!(
            WagePeriod::new("p-1", d(2025, 1, 1), d(2025, 1, 15), now),
            Err(WageError::Validation(_))
        ));
        assert!(matches!(
            WagePeriod::new("p-1", d(2025, 1, 1), d(2025, 1, 17), now),
            Err(WageError::Validation(_))
        ));
        let period = WagePeriod::new("p-1", d(2025, 1, 1), d(2025, 1, 16), now).unwrap();
        assert_eq!(period.id, "p-1:202501-P1");
        assert_eq!(period.status, PeriodStatus::Draft);
        assert!(period.contains(d(2025, 1, 15)));
        assert!(!period.contains(d(2025, 1, 16)));
    }

    #[test]
    fn lifecycle_moves_forward_only() {
        let now = Utc::now();
        let mut period = WagePeriod::new("p-1", d(2025, 1, 1), d(2025, 1, 16), now).unwrap();
        assert!(matches!(period.approve("ops", now), Err(WageError::InvalidTransition { .. })));
        period.apply_calculation(Vec::new(), false, "ops", now);
        assert_eq!(period.status, PeriodStatus::Calculated);
        period.approve("ops", now).unwrap();
        assert!(matches!(period.approve("ops", now), Err(WageError::InvalidTransition { .. })));
        period.mark_paid("ops", now).unwrap();
        period.lock("ops", now).unwrap();
        assert_eq!(period.status, PeriodStatus::Locked);
        assert_eq!(period.history.len(), 4);
    }

    #[test]
    fn recalculation_guard() {
        let now = Utc::now();
        let mut period = WagePeriod::new("p-1", d(2025, 1, 16), d(2025, 1, 31), now).unwrap();
        assert!(period.ensure_recalculable(false).is_ok());
        period.apply_calculation(Vec::new(), false, "ops", now);
        assert!(period.ensure_recalculable(false).is_ok());
        period.approve("ops", now).unwrap();
        assert!(matches!(period.ensure_recalculable(false), Err(WageError::Conflict(_))));
        assert!(period.ensure_recalculable(true).is_ok());
        period.apply_calculation(Vec::new(), false, "ops", now);
        assert_eq!(period.status, PeriodStatus::Approved);
        period.mark_paid("ops", now).unwrap();
        period.lock("ops", now).unwrap();
        assert!(matches!(period.ensure_recalculable(true), Err(WageError::Conflict(_))));
    }
}
