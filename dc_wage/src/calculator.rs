//! Wage calculation for a single contractor.
//!
//! [`WageCalculator::calculate`] is a pure function of its input: it
//! performs no I/O and returns the same summary for the same input.
//! Every money line is rounded to currency precision on its own, and
//! totals are exact sums of those lines.

use crate::config::WagePolicy;
use crate::error::{WageError, WageResult};
use crate::models::{
    Adjustment, AdjustmentKind, DcRateProfile, DcWageSummary, ExpenseLines, HourBuckets, IncomeLines,
};
use crate::normalize::minutes_to_hours;
use crate::social_security::{contribution, exemption_from_policy, ExemptionPolicy};
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;

/// Round to two decimal places, halves away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn hours_display(minutes: u32) -> Decimal {
    minutes_to_hours(minutes).round_dp(4)
}

/// Worked minutes per bucket for a whole period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketMinutes {
    pub regular: u32,
    pub ot_morning: u32,
    pub ot_noon: u32,
    pub ot_evening: u32,
}

impl BucketMinutes {
    pub fn overtime(&self) -> u32 {
        self.ot_morning + self.ot_noon + self.ot_evening
    }

    pub fn total(&self) -> u32 {
        self.regular + self.overtime()
    }
}

/// Everything the calculator needs for one contractor and one period.
#[derive(Debug, Clone)]
pub struct ContractorPeriodInput {
    pub contractor_id: String,
    pub profile: DcRateProfile,
    pub minutes: BucketMinutes,
    pub days_worked: u32,
    /// Late minutes for each worked day; days on time may be omitted.
    pub late_minutes: Vec<u32>,
    pub adjustments: Vec<Adjustment>,
}

pub struct WageCalculator {
    policy: WagePolicy,
    exemption: Arc<dyn ExemptionPolicy>,
}

impl WageCalculator {
    pub fn new(policy: WagePolicy, exemption: Arc<dyn ExemptionPolicy>) -> Self {
        Self { policy, exemption }
    }

    /// Calculator using the exemption rule named by the policy.
    pub fn from_policy(policy: WagePolicy) -> Self {
        let exemption = exemption_from_policy(&policy);
        Self::new(policy, exemption)
    }

    pub fn policy(&self) -> &WagePolicy {
        &self.policy
    }

    /// Pay owed for `minutes` at `rate` per hour.
    fn pay(minutes: u32, rate: Decimal) -> Decimal {
        round_money(Decimal::from(minutes) * rate / Decimal::from(60))
    }

    /// One hour's pay for every day at or above the late threshold.
    pub fn late_deduction(&self, late_minutes: &[u32], hourly_rate: Decimal) -> (u32, Decimal) {
        let late_days = late_minutes
            .iter()
            .filter(|&&m| m >= self.policy.late_threshold_minutes)
            .count() as u32;
        (late_days, round_money(hourly_rate * Decimal::from(late_days)))
    }

    pub fn calculate(&self, input: &ContractorPeriodInput) -> WageResult<DcWageSummary> {
        let profile = &input.profile;
        profile.validate().map_err(|msg| {
            WageError::validation(format!("rate profile for {}: {}", input.contractor_id, msg))
        })?;
        for adjustment in &input.adjustments {
            adjustment
                .validate()
                .map_err(|msg| WageError::validation(format!("{} for {}", msg, input.contractor_id)))?;
        }

        let minutes = input.minutes;
        let rate = profile.hourly_rate;

        let income = IncomeLines {
            regular_wages: Self::pay(minutes.regular, rate),
            ot_wages: Self::pay(minutes.overtime(), rate * self.policy.ot_multiplier),
            professional_fees: Self::pay(minutes.regular, profile.professional_rate),
            phone_allowance: round_money(profile.phone_allowance),
            additional_income: round_money(sum_adjustments(&input.adjustments, AdjustmentKind::Income)),
        };
        let gross = income.total();

        let exempt = self.exemption.is_exempt(profile);
        let social_security = contribution(gross, exempt, &self.policy);
        let (late_arrivals, late_deductions) = self.late_deduction(&input.late_minutes, rate);

        let expenses = ExpenseLines {
            accommodation: round_money(profile.accommodation_cost),
            follower_accommodation: round_money(
                self.policy.follower_accommodation * Decimal::from(profile.follower_count),
            ),
            equipment_costs: round_money(profile.equipment.iter().map(|e| e.amount).sum()),
            additional_expenses: round_money(sum_adjustments(&input.adjustments, AdjustmentKind::Expense)),
            social_security: social_security.contribution,
            late_deductions,
        };

        let total_income = gross;
        let total_expenses = expenses.total();
        Ok(DcWageSummary {
            contractor_id: input.contractor_id.clone(),
            employee_id: profile.employee_id.clone(),
            rate_effective_date: profile.effective_date,
            days_worked: input.days_worked,
            late_arrivals,
            hours: HourBuckets {
                regular: hours_display(minutes.regular),
                ot_morning: hours_display(minutes.ot_morning),
                ot_noon: hours_display(minutes.ot_noon),
                ot_evening: hours_display(minutes.ot_evening),
                total_ot: hours_display(minutes.overtime()),
                total: hours_display(minutes.total()),
            },
            income,
            expenses,
            social_security,
            total_income,
            total_expenses,
            net_wages: total_income - total_expenses,
        })
    }
}

fn sum_adjustments(adjustments: &[Adjustment], kind: AdjustmentKind) -> Decimal {
    adjustments.iter().filter(|a| a.kind == kind).map(|a| a.amount).sum()
}
