//! Period storage with per-period mutual exclusion.
//!
//! Every mutating action on a period takes a [`PeriodGuard`] first; a
//! second action on the same period while the guard is held fails with
//! a conflict.  Commits additionally check the version the caller read,
//! so a stale write is rejected instead of overwriting newer state.

use crate::error::{WageError, WageResult};
use crate::period::WagePeriod;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
pub struct PeriodStore {
    periods: RwLock<HashMap<String, WagePeriod>>,
    busy: Mutex<HashSet<String>>,
}

/// Held for the duration of one mutating action on a period.
pub struct PeriodGuard<'a> {
    store: &'a PeriodStore,
    period_id: String,
}

impl Drop for PeriodGuard<'_> {
    fn drop(&mut self) {
        let mut busy = self.store.busy.lock().unwrap_or_else(|e| e.into_inner());
        busy.remove(&self.period_id);
        debug!("released period {}", self.period_id);
    }
}

impl PeriodStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim exclusive write access to a period.
    pub fn begin(&self, period_id: &str) -> WageResult<PeriodGuard<'_>> {
        let mut busy = self.busy.lock().unwrap_or_else(|e| e.into_inner());
        if !busy.insert(period_id.to_string()) {
            return Err(WageError::Conflict(format!(
                "another action is already running on period {}",
                period_id
            )));
        }
        Ok(PeriodGuard {
            store: self,
            period_id: period_id.to_string(),
        })
    }

    pub async fn insert(&self, period: WagePeriod) -> WageResult<WagePeriod> {
        let mut periods = self.periods.write().await;
        if periods.contains_key(&period.id) {
            return Err(WageError::Conflict(format!("period {} already exists", period.id)));
        }
        periods.insert(period.id.clone(), period.clone());
        Ok(period)
    }

    pub async fn get(&self, period_id: &str) -> WageResult<WagePeriod> {
        self.periods
            .read()
            .await
            .get(period_id)
            .cloned()
            .ok_or_else(|| WageError::NotFound(format!("period {}", period_id)))
    }

    pub async fn list(&self) -> Vec<WagePeriod> {
        let mut periods: Vec<WagePeriod> = self.periods.read().await.values().cloned().collect();
        periods.sort_by(|a, b| a.id.cmp(&b.id));
        periods
    }

    /// Replace the stored period if its version still matches the one
    /// `period` was read at.  The committed copy carries the next version.
    pub async fn commit(&self, _guard: &PeriodGuard<'_>, mut period: WagePeriod) -> WageResult<WagePeriod> {
        let mut periods = self.periods.write().await;
        let current = periods
            .get(&period.id)
            .ok_or_else(|| WageError::NotFound(format!("period {}", period.id)))?;
        if current.version != period.version {
            return Err(WageError::Conflict(format!(
                "period {} changed (version {} != {})",
                period.id, current.version, period.version
            )));
        }
        period.version += 1;
        periods.insert(period.id.clone(), period.clone());
        Ok(period)
    }
}
