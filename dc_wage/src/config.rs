//! Configuration for the wage engine.
//!
//! Two layers are configurable.  [`WagePolicy`] carries the payroll
//! rules (rounding, break window, multipliers, social security
//! bounds) and is read from a JSON file so that policy changes do not
//! require a rebuild.  [`ServerConfig`] carries process settings and
//! is read from `WAGE_`-prefixed environment variables.

use anyhow::{Context, Result};
use chrono::NaiveTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Payroll rules applied by the normalizer, detector and calculator.
///
/// Every field has a default matching the reference deployment, so a
/// policy file only needs to list the values it overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WagePolicy {
    /// Elapsed minutes are floored to a multiple of this value.
    pub rounding_minutes: u32,
    /// A regular record whose start hour is below `break_end_hour` and
    /// whose end hour is above `break_start_hour` loses `break_minutes`.
    pub break_start_hour: u32,
    pub break_end_hour: u32,
    pub break_minutes: u32,
    pub ot_multiplier: Decimal,
    /// Accommodation charged per follower per period.
    pub follower_accommodation: Decimal,
    pub social_security_rate: Decimal,
    pub social_security_min: Decimal,
    pub social_security_max: Decimal,
    /// Legacy exemption rule: employee ids starting with this prefix
    /// are exempt from social security.  `None` disables the rule and
    /// leaves only the explicit profile flag.
    pub exemption_id_prefix: Option<String>,
    pub late_threshold_minutes: u32,
    pub shift_start: NaiveTime,
    /// Discrepancies above this many hours are warnings.
    pub discrepancy_warning_hours: Decimal,
    /// Discrepancies at or below this many hours are informational.
    pub discrepancy_surface_hours: Decimal,
}

impl Default for WagePolicy {
    fn default() -> Self {
        Self {
            rounding_minutes: 5,
            break_start_hour: 12,
            break_end_hour: 13,
            break_minutes: 60,
            ot_multiplier: dec!(1.5),
            follower_accommodation: dec!(300),
            social_security_rate: dec!(0.05),
            social_security_min: dec!(83),
            social_security_max: dec!(750),
            exemption_id_prefix: Some("9".to_string()),
            late_threshold_minutes: 15,
            shift_start: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
            discrepancy_warning_hours: dec!(2.0),
            discrepancy_surface_hours: dec!(0.25),
        }
    }
}

impl WagePolicy {
    /// Load a policy from a JSON file.  A missing file yields the
    /// default policy; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            warn!("Policy file {} not found, using default policy", path.display());
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading policy file {}", path.display()))?;
        let policy: WagePolicy = serde_json::from_str(&data)
            .with_context(|| format!("parsing policy file {}", path.display()))?;
        policy.validate()?;
        info!("Loaded wage policy from {}", path.display());
        Ok(policy)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rounding_minutes == 0 || 60 % self.rounding_minutes != 0 {
            anyhow::bail!("rounding_minutes must divide 60, got {}", self.rounding_minutes);
        }
        if self.social_security_min > self.social_security_max {
            anyhow::bail!(
                "social_security_min {} exceeds social_security_max {}",
                self.social_security_min,
                self.social_security_max
            );
        }
        if self.break_start_hour >= 24 || self.break_end_hour >= 24 {
            anyhow::bail!("break window hours must be below 24");
        }
        if self.ot_multiplier <= Decimal::ZERO || self.ot_multiplier > dec!(10) {
            anyhow::bail!("ot_multiplier must be in (0, 10], got {}", self.ot_multiplier);
        }
        if self.social_security_rate < Decimal::ZERO || self.social_security_rate > Decimal::ONE {
            anyhow::bail!("social_security_rate must be in [0, 1], got {}", self.social_security_rate);
        }
        let amounts = [
            ("follower_accommodation", self.follower_accommodation),
            ("social_security_min", self.social_security_min),
            ("social_security_max", self.social_security_max),
        ];
        for (name, value) in amounts {
            if value < Decimal::ZERO || value > crate::models::max_money_amount() {
                anyhow::bail!("{} is out of range, got {}", name, value);
            }
        }
        Ok(())
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_policy_file() -> PathBuf {
    PathBuf::from("wage_policy.json")
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    200
}

fn default_rate_cache_ttl_secs() -> u64 {
    300
}

/// Process settings read from the environment, e.g. `WAGE_BIND_ADDR`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_policy_file")]
    pub policy_file: PathBuf,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Zero disables rate profile caching.
    #[serde(default = "default_rate_cache_ttl_secs")]
    pub rate_cache_ttl_secs: u64,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        envy::prefixed("WAGE_")
            .from_env::<ServerConfig>()
            .context("reading WAGE_* environment variables")
    }
}
