//! Entry point for the DC Wage binary.
//!
//! Running this binary starts an HTTP server exposing the wage period
//! actions over an in-memory store.  Settings come from `WAGE_*`
//! environment variables (a `.env` file is honoured); the payroll
//! rules come from the JSON file named by `WAGE_POLICY_FILE`, falling
//! back to the built-in defaults when it does not exist.

use anyhow::Result;
use dc_wage::api::{serve, AppState};
use dc_wage::cache::{CachedRateSource, RateProfileKey, TtlCache};
use dc_wage::calculator::WageCalculator;
use dc_wage::config::{ServerConfig, WagePolicy};
use dc_wage::models::DcRateProfile;
use dc_wage::retry::RetryPolicy;
use dc_wage::service::PeriodService;
use dc_wage::source::{InMemorySource, WageDataSource};
use dc_wage::store::PeriodStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run().await {
        error!("Error running server: {:#}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = ServerConfig::from_env()?;
    let policy = WagePolicy::load(&config.policy_file)?;
    info!(
        "Starting wage server (retry attempts: {}, rate cache ttl: {}s)",
        config.retry_attempts, config.rate_cache_ttl_secs
    );

    let records = Arc::new(InMemorySource::new());
    let rate_cache = (config.rate_cache_ttl_secs > 0).then(|| {
        let ttl = Duration::from_secs(config.rate_cache_ttl_secs);
        let cache = TtlCache::<RateProfileKey, DcRateProfile>::new(ttl);
        Arc::new(CachedRateSource::new(records.clone(), Arc::new(cache)))
    });
    let source: Arc<dyn WageDataSource> = match &rate_cache {
        Some(cached) => cached.clone(),
        None => records.clone(),
    };

    let service = PeriodService::new(
        source,
        Arc::new(PeriodStore::new()),
        Arc::new(WageCalculator::from_policy(policy.clone())),
        RetryPolicy {
            max_attempts: config.retry_attempts,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        },
    );
    let state = Arc::new(AppState {
        service,
        records,
        rate_cache,
        policy,
    });
    serve(&config.bind_addr, state).await
}
