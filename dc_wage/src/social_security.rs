//! Social security withholding.
//!
//! The contribution is a flat share of gross wages clamped to absolute
//! bounds.  Whether a contractor is exempt is decided by an
//! [`ExemptionPolicy`], so the organisational rule can change without
//! touching the calculation itself.

use crate::config::WagePolicy;
use crate::models::{ClampBound, DcRateProfile, SocialSecurityCalculation};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Decides whether a contractor is exempt from social security.
///
/// Policies must be thread-safe (`Send + Sync`) because summaries are
/// calculated concurrently.
pub trait ExemptionPolicy: Send + Sync {
    fn name(&self) -> &str;
    fn is_exempt(&self, profile: &DcRateProfile) -> bool;
}

/// Exempt only when the rate profile carries the explicit flag.
pub struct ProfileFlagExemption;

impl ExemptionPolicy for ProfileFlagExemption {
    fn name(&self) -> &str {
        "profile-flag"
    }

    fn is_exempt(&self, profile: &DcRateProfile) -> bool {
        profile.social_security_exempt
    }
}

/// Legacy rule: employee ids beginning with `prefix` are exempt, in
/// addition to profiles flagged explicitly.
pub struct EmployeeIdPrefixExemption {
    pub prefix: String,
}

impl ExemptionPolicy for EmployeeIdPrefixExemption {
    fn name(&self) -> &str {
        "employee-id-prefix"
    }

    fn is_exempt(&self, profile: &DcRateProfile) -> bool {
        profile.social_security_exempt
            || (!self.prefix.is_empty() && profile.employee_id.starts_with(&self.prefix))
    }
}

/// Build the exemption policy a [`WagePolicy`] asks for.
pub fn exemption_from_policy(policy: &WagePolicy) -> Arc<dyn ExemptionPolicy> {
    match &policy.exemption_id_prefix {
        Some(prefix) => Arc::new(EmployeeIdPrefixExemption {
            prefix: prefix.clone(),
        }),
        None => Arc::new(ProfileFlagExemption),
    }
}

/// One-off migration: set the explicit exemption flag on every profile
/// matched by the legacy prefix rule.  Returns how many were changed.
pub fn migrate_exemption_flags(profiles: &mut [DcRateProfile], prefix: &str) -> usize {
    let mut changed = 0;
    for profile in profiles.iter_mut() {
        if !profile.social_security_exempt && !prefix.is_empty() && profile.employee_id.starts_with(prefix) {
            profile.social_security_exempt = true;
            changed += 1;
        }
    }
    changed
}

/// Contribution for `gross` wages.  The result is rounded to currency
/// precision before clamping.
pub fn contribution(gross: Decimal, exempt: bool, policy: &WagePolicy) -> SocialSecurityCalculation {
    let raw_amount = crate::calculator::round_money(gross * policy.social_security_rate);
    if exempt {
        return SocialSecurityCalculation {
            base: gross,
            rate: policy.social_security_rate,
            raw_amount,
            contribution: Decimal::ZERO,
            exempt: true,
            clamped: None,
        };
    }
    let (contribution, clamped) = if raw_amount < policy.social_security_min {
        (policy.social_security_min, Some(ClampBound::Minimum))
    } else if raw_amount > policy.social_security_max {
        (policy.social_security_max, Some(ClampBound::Maximum))
    } else {
        (raw_amount, None)
    };
    SocialSecurityCalculation {
        base: gross,
        rate: policy.social_security_rate,
        raw_amount,
        contribution,
        exempt: false,
        clamped,
    }
}
