//! Period actions.
//!
//! [`PeriodService`] wires the data source, the calculator and the
//! period store together.  Each action claims the period, works on an
//! in-memory copy and commits once at the end, so a failed or abandoned
//! action leaves the stored period exactly as it was.

use crate::calculator::WageCalculator;
use crate::engine::{run_period, ContractorData, PeriodInputs};
use crate::error::{WageError, WageResult};
use crate::models::ScanDiscrepancy;
use crate::period::WagePeriod;
use crate::retry::{with_retry, RetryPolicy};
use crate::source::WageDataSource;
use crate::store::PeriodStore;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of a successful calculation pass.
#[derive(Debug, Clone, Serialize)]
pub struct CalculationOutcome {
    pub period: WagePeriod,
    pub new_discrepancies: Vec<ScanDiscrepancy>,
}

pub struct PeriodService {
    source: Arc<dyn WageDataSource>,
    store: Arc<PeriodStore>,
    calculator: Arc<WageCalculator>,
    retry: RetryPolicy,
}

impl PeriodService {
    pub fn new(
        source: Arc<dyn WageDataSource>,
        store: Arc<PeriodStore>,
        calculator: Arc<WageCalculator>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            source,
            store,
            calculator,
            retry,
        }
    }

    pub async fn create_period(
        &self,
        project_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> WageResult<WagePeriod> {
        let period = WagePeriod::new(project_id, start, end, Utc::now())?;
        let period = self.store.insert(period).await?;
        info!("created wage period {}", period.id);
        Ok(period)
    }

    pub async fn get(&self, period_id: &str) -> WageResult<WagePeriod> {
        self.store.get(period_id).await
    }

    pub async fn list(&self) -> Vec<WagePeriod> {
        self.store.list().await
    }

    async fn gather(&self, period: &WagePeriod) -> WageResult<PeriodInputs> {
        let (project, start, end) = (period.project_id.as_str(), period.start_date, period.end_date);
        let contractor_ids = with_retry(&self.retry, "list contractors", || {
            self.source.contractors_with_attendance(project, start, end)
        })
        .await?;

        let mut contractors = Vec::with_capacity(contractor_ids.len());
        for contractor_id in contractor_ids {
            let id = contractor_id.as_str();
            let records = with_retry(&self.retry, "fetch attendance", || {
                self.source.attendance(id, project, start, end)
            })
            .await?;
            let profile = with_retry(&self.retry, "fetch rate profile", || {
                self.source.latest_rate_profile(id, start)
            })
            .await?;
            let adjustments = with_retry(&self.retry, "fetch adjustments", || {
                self.source.adjustments(id, &period.period_code)
            })
            .await?;
            contractors.push(ContractorData {
                contractor_id,
                records,
                profile,
                adjustments,
            });
        }

        let existing_discrepancies = with_retry(&self.retry, "fetch discrepancies", || {
            self.source.discrepancies(project, start, end)
        })
        .await?;

        Ok(PeriodInputs {
            period_start: start,
            contractors,
            existing_discrepancies,
        })
    }

    /// Run a full calculation pass.  Approved and paid periods need
    /// `force`; locked periods are refused.
    pub async fn calculate(&self, period_id: &str, force: bool, actor: &str) -> WageResult<CalculationOutcome> {
        let guard = self.store.begin(period_id)?;
        let mut period = self.store.get(period_id).await?;
        period.ensure_recalculable(force)?;
        if force && period.status > crate::period::PeriodStatus::Calculated {
            warn!("forced recalculation of {} period {} by {}", period.status, period.id, actor);
        }

        let inputs = self.gather(&period).await?;
        info!(
            "calculating period {} for {} contractor(s)",
            period.id,
            inputs.contractors.len()
        );
        let calculator = Arc::clone(&self.calculator);
        let calculation = tokio::task::spawn_blocking(move || run_period(&inputs, &calculator))
            .await
            .map_err(|e| WageError::Internal(format!("calculation task failed: {}", e)))??;

        if !calculation.new_discrepancies.is_empty() {
            let fresh = calculation.new_discrepancies.clone();
            with_retry(&self.retry, "save discrepancies", || {
                self.source.save_discrepancies(fresh.clone())
            })
            .await?;
        }

        period.apply_calculation(
            calculation.summaries,
            calculation.has_unresolved_discrepancies,
            actor,
            Utc::now(),
        );
        let period = self.store.commit(&guard, period).await?;
        info!(
            "period {} calculated: net wages {}, unresolved discrepancies: {}",
            period.id, period.totals.net_wages, period.has_unresolved_discrepancies
        );
        Ok(CalculationOutcome {
            period,
            new_discrepancies: calculation.new_discrepancies,
        })
    }

    async fn transition<F>(&self, period_id: &str, action: F) -> WageResult<WagePeriod>
    where
        F: FnOnce(&mut WagePeriod) -> WageResult<()>,
    {
        let guard = self.store.begin(period_id)?;
        let mut period = self.store.get(period_id).await?;
        action(&mut period)?;
        let period = self.store.commit(&guard, period).await?;
        info!("period {} is now {}", period.id, period.status);
        Ok(period)
    }

    pub async fn approve(&self, period_id: &str, actor: &str) -> WageResult<WagePeriod> {
        self.transition(period_id, |p| p.approve(actor, Utc::now())).await
    }

    pub async fn mark_paid(&self, period_id: &str, actor: &str) -> WageResult<WagePeriod> {
        self.transition(period_id, |p| p.mark_paid(actor, Utc::now())).await
    }

    pub async fn lock(&self, period_id: &str, actor: &str) -> WageResult<WagePeriod> {
        self.transition(period_id, |p| p.lock(actor, Utc::now())).await
    }
}
