//! Error types for the wage engine.
//!
//! Validation failures are reported before any calculation starts,
//! missing dependencies are collected per contractor, and conflicts
//! are surfaced to the caller without retrying.  Only
//! [`SourceError::Transient`] is ever retried.

use crate::models::DcWageSummary;
use serde::Serialize;
use thiserror::Error;

/// Errors raised by a [`crate::source::WageDataSource`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("transient source failure: {0}")]
    Transient(String),
    #[error("source failure: {0}")]
    Permanent(String),
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Transient(_))
    }
}

/// Why a single contractor could not be calculated.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ContractorFailure {
    pub contractor_id: String,
    pub reason: String,
}

#[derive(Error, Debug)]
pub enum WageError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("no rate profile effective on or before {on_or_before} for contractor {contractor_id}")]
    MissingRateProfile {
        contractor_id: String,
        on_or_before: chrono::NaiveDate,
    },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("cannot {action} a period in status {from}")]
    InvalidTransition { from: String, action: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("calculation incomplete: {} contractor(s) failed", .failures.len())]
    Incomplete {
        failures: Vec<ContractorFailure>,
        succeeded: Vec<DcWageSummary>,
    },
    #[error("internal error: {0}")]
    Internal(String),
}

impl WageError {
    pub fn validation(msg: impl Into<String>) -> Self {
        WageError::Validation(msg.into())
    }
}

pub type WageResult<T> = std::result::Result<T, WageError>;
