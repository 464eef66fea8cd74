//! Injectable query caching.
//!
//! Lookups that are read far more often than they change (rate
//! profiles) can be cached behind [`QueryCache`].  The cache is passed
//! in explicitly; tests and callers that need fresh reads use
//! [`NoCache`].

use crate::error::SourceError;
use crate::models::{Adjustment, AttendanceRecord, DcRateProfile, ScanDiscrepancy};
use crate::source::WageDataSource;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

pub trait QueryCache<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;
    fn set(&self, key: K, value: V);
    fn invalidate(&self, key: &K);
    fn clear(&self);
}

/// Stores nothing.
pub struct NoCache;

impl<K, V> QueryCache<K, V> for NoCache {
    fn get(&self, _key: &K) -> Option<V> {
        None
    }
    fn set(&self, _key: K, _value: V) {}
    fn invalidate(&self, _key: &K) {}
    fn clear(&self) {}
}

/// Entries expire `ttl` after they were set.
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (Instant, V)>>,
}

impl<K, V> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> QueryCache<K, V> for TtlCache<K, V>
where
    K: Eq + Hash + Send,
    V: Clone + Send,
{
    fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some((stored_at, value)) if stored_at.elapsed() < self.ttl => return Some(value.clone()),
            Some(_) => {}
            None => return None,
        }
        entries.remove(key);
        None
    }

    /// Expired entries are swept on every insert.
    fn set(&self, key: K, value: V) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let ttl = self.ttl;
        entries.retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
        entries.insert(key, (Instant::now(), value));
    }

    fn invalidate(&self, key: &K) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
    }

    fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }
}

pub type RateProfileKey = (String, NaiveDate);

/// Wraps a source and caches rate profile lookups.  Misses (no profile
/// on file) are not cached.
pub struct CachedRateSource {
    inner: Arc<dyn WageDataSource>,
    cache: Arc<dyn QueryCache<RateProfileKey, DcRateProfile>>,
}

impl CachedRateSource {
    pub fn new(
        inner: Arc<dyn WageDataSource>,
        cache: Arc<dyn QueryCache<RateProfileKey, DcRateProfile>>,
    ) -> Self {
        Self { inner, cache }
    }

    /// Drop every cached profile, e.g. after rate tables change.
    pub fn invalidate_profiles(&self) {
        self.cache.clear();
    }
}

#[async_trait]
impl WageDataSource for CachedRateSource {
    async fn contractors_with_attendance(
        &self,
        project_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<String>, SourceError> {
        self.inner.contractors_with_attendance(project_id, start, end).await
    }

    async fn attendance(
        &self,
        contractor_id: &str,
        project_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, SourceError> {
        self.inner.attendance(contractor_id, project_id, start, end).await
    }

    async fn latest_rate_profile(
        &self,
        contractor_id: &str,
        on_or_before: NaiveDate,
    ) -> Result<Option<DcRateProfile>, SourceError> {
        let key = (contractor_id.to_string(), on_or_before);
        if let Some(profile) = self.cache.get(&key) {
            debug!("rate profile cache hit for {} at {}", contractor_id, on_or_before);
            return Ok(Some(profile));
        }
        let found = self.inner.latest_rate_profile(contractor_id, on_or_before).await?;
        if let Some(profile) = &found {
            self.cache.set(key, profile.clone());
        }
        Ok(found)
    }

    async fn adjustments(&self, contractor_id: &str, period_code: &str) -> Result<Vec<Adjustment>, SourceError> {
        self.inner.adjustments(contractor_id, period_code).await
    }

    async fn discrepancies(
        &self,
        project_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ScanDiscrepancy>, SourceError> {
        self.inner.discrepancies(project_id, start, end).await
    }

    async fn save_discrepancies(&self, discrepancies: Vec<ScanDiscrepancy>) -> Result<(), SourceError> {
        self.inner.save_discrepancies(discrepancies).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemorySource;
    use rust_decimal_macros::dec;

    fn profile(rate: rust_decimal::Decimal) -> DcRateProfile {
        DcRateProfile {
            contractor_id: "dc-1".into(),
            employee_id: "101527".into(),
            effective_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            hourly_rate: rate,
            professional_rate: dec!(0),
            phone_allowance: dec!(0),
            accommodation_cost: dec!(0),
            follower_count: 0,
            equipment: Vec::new(),
            social_security_exempt: false,
        }
    }

    #[test]
    fn ttl_cache_expires_entries() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::ZERO);
        cache.set("a", 1);
        assert_eq!(cache.get(&"a"), None);

        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_secs(60));
        cache.set("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));
        cache.invalidate(&"a");
        assert_eq!(cache.get(&"a"), None);
    }

    #[test]
    fn insert_sweeps_expired_keys() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::ZERO);
        cache.set("2025-01-01", 1);
        cache.set("2025-01-16", 2);
        cache.set("2025-02-01", 3);
        let entries = cache.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key("2025-02-01"));
    }

    #[tokio::test]
    async fn cached_profile_survives_until_invalidated() {
        let inner = Arc::new(InMemorySource::new());
        inner.add_rate_profile(profile(dec!(300))).await.unwrap();
        let cache = TtlCache::<RateProfileKey, DcRateProfile>::new(Duration::from_secs(60));
        let cached = CachedRateSource::new(inner.clone(), Arc::new(cache));
        let date = NaiveDate::from_ymd_opt(2025, 1, 16).unwrap();

        let first = cached.latest_rate_profile("dc-1", date).await.unwrap().unwrap();
        assert_eq!(first.hourly_rate, dec!(300));

        inner.add_rate_profile(profile(dec!(350))).await.unwrap();
        let stale = cached.latest_rate_profile("dc-1", date).await.unwrap().unwrap();
        assert_eq!(stale.hourly_rate, dec!(300));

        cached.invalidate_profiles();
        let fresh = cached.latest_rate_profile("dc-1", date).await.unwrap().unwrap();
        assert_eq!(fresh.hourly_rate, dec!(350));
    }

    #[tokio::test]
    async fn no_cache_always_reads_through() {
        let inner = Arc::new(InMemorySource::new());
        inner.add_rate_profile(profile(dec!(300))).await.unwrap();
        let cached = CachedRateSource::new(inner.clone(), Arc::new(NoCache));
        let date = NaiveDate::from_ymd_opt(2025, 1, 16).unwrap();
        cached.latest_rate_profile("dc-1", date).await.unwrap();
        inner.add_rate_profile(profile(dec!(350))).await.unwrap();
        let fresh = cached.latest_rate_profile("dc-1", date).await.unwrap().unwrap();
        assert_eq!(fresh.hourly_rate, dec!(350));
    }
}
