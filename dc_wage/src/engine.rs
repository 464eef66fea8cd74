//! Period calculation engine.
//!
//! The `engine` module turns the raw inputs gathered for a period into
//! wage summaries.  It uses the [`rayon`] crate to calculate each
//! contractor in parallel; nothing a contractor's calculation reads
//! depends on another contractor.  Detected discrepancies and the
//! failure list are merged afterwards on a single thread.

use crate::attendance::late_minutes_for_day;
use crate::calculator::{BucketMinutes, ContractorPeriodInput, WageCalculator};
use crate::discrepancy::{detect, has_unresolved, is_surfaced, new_discrepancies};
use crate::error::{ContractorFailure, WageError, WageResult};
use crate::models::{
    Adjustment, AttendanceRecord, DcRateProfile, DcWageSummary, RecordSource, ScanDiscrepancy, WorkType,
};
use crate::normalize::normalize_record;
use chrono::NaiveDate;
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Normalised attendance of one contractor over a period.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttendanceTally {
    pub minutes: BucketMinutes,
    pub days_worked: u32,
    pub late_minutes: Vec<u32>,
}

/// Bucket the net minutes of every live manual record and work out
/// lateness per day.  Scan records only feed discrepancy detection.
pub fn tally(records: &[AttendanceRecord], policy: &crate::config::WagePolicy) -> WageResult<AttendanceTally> {
    let mut result = AttendanceTally::default();
    let mut days: BTreeMap<NaiveDate, Vec<&AttendanceRecord>> = BTreeMap::new();
    for record in records
        .iter()
        .filter(|r| !r.deleted && r.source == RecordSource::Manual)
    {
        let net = normalize_record(record, policy)?.net_minutes;
        let bucket = match record.work_type {
            WorkType::Regular => &mut result.minutes.regular,
            WorkType::OtMorning => &mut result.minutes.ot_morning,
            WorkType::OtNoon => &mut result.minutes.ot_noon,
            WorkType::OtEvening => &mut result.minutes.ot_evening,
        };
        *bucket += net;
        days.entry(record.work_date).or_default().push(record);
    }
    result.days_worked = days.len() as u32;
    result.late_minutes = days
        .values()
        .map(|day| late_minutes_for_day(day, policy))
        .filter(|&minutes| minutes > 0)
        .collect();
    Ok(result)
}

/// Raw inputs for one contractor, as fetched from the data source.
#[derive(Debug, Clone)]
pub struct ContractorData {
    pub contractor_id: String,
    pub records: Vec<AttendanceRecord>,
    pub profile: Option<DcRateProfile>,
    pub adjustments: Vec<Adjustment>,
}

/// Everything a calculation pass reads.
#[derive(Debug, Clone)]
pub struct PeriodInputs {
    pub period_start: NaiveDate,
    pub contractors: Vec<ContractorData>,
    pub existing_discrepancies: Vec<ScanDiscrepancy>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeriodCalculation {
    /// Sorted by contractor id.
    pub summaries: Vec<DcWageSummary>,
    pub new_discrepancies: Vec<ScanDiscrepancy>,
    pub has_unresolved_discrepancies: bool,
}

fn calculate_contractor(
    data: &ContractorData,
    period_start: NaiveDate,
    calculator: &WageCalculator,
) -> WageResult<(DcWageSummary, Vec<ScanDiscrepancy>)> {
    let profile = match &data.profile {
        Some(profile) if profile.effective_date <= period_start => profile.clone(),
        _ => {
            return Err(WageError::MissingRateProfile {
                contractor_id: data.contractor_id.clone(),
                on_or_before: period_start,
            })
        }
    };
    let policy = calculator.policy();
    let tally = tally(&data.records, policy)?;
    let detected = detect(&data.records, policy)?;
    let input = ContractorPeriodInput {
        contractor_id: data.contractor_id.clone(),
        profile,
        minutes: tally.minutes,
        days_worked: tally.days_worked,
        late_minutes: tally.late_minutes,
        adjustments: data.adjustments.clone(),
    };
    Ok((calculator.calculate(&input)?, detected))
}

/// Calculate every contractor of a period.
///
/// Fails with [`WageError::Incomplete`] when any contractor could not
/// be calculated, carrying both the failures and the summaries that
/// did succeed.
pub fn run_period(inputs: &PeriodInputs, calculator: &WageCalculator) -> WageResult<PeriodCalculation> {
    let outcomes: Vec<(String, WageResult<(DcWageSummary, Vec<ScanDiscrepancy>)>)> = inputs
        .contractors
        .par_iter()
        .map(|data| {
            (
                data.contractor_id.clone(),
                calculate_contractor(data, inputs.period_start, calculator),
            )
        })
        .collect();

    let mut summaries = Vec::with_capacity(outcomes.len());
    let mut detected = Vec::new();
    let mut failures = Vec::new();
    for (contractor_id, outcome) in outcomes {
        match outcome {
            Ok((summary, found)) => {
                summaries.push(summary);
                detected.extend(found);
            }
            Err(err) => {
                warn!("wage calculation failed for contractor {}: {}", contractor_id, err);
                failures.push(ContractorFailure {
                    contractor_id,
                    reason: err.to_string(),
                });
            }
        }
    }
    summaries.sort_by(|a, b| a.contractor_id.cmp(&b.contractor_id));

    if !failures.is_empty() {
        return Err(WageError::Incomplete {
            failures,
            succeeded: summaries,
        });
    }

    let fresh = new_discrepancies(&inputs.existing_discrepancies, detected);
    let has_unresolved_discrepancies = has_unresolved(inputs.existing_discrepancies.iter().chain(fresh.iter()));
    debug!(
        "calculated {} contractor(s), {} new discrepancies ({} above the noise threshold)",
        summaries.len(),
        fresh.len(),
        fresh.iter().filter(|d| is_surfaced(d, calculator.policy())).count()
    );
    Ok(PeriodCalculation {
        summaries,
        new_discrepancies: fresh,
        has_unresolved_discrepancies,
    })
}
