use chrono::{DateTime, Months, Utc};
use rand::Rng;

use crate::{ProfileError, ProfileResult};

pub const REFERRAL_CODE_MIN: u32 = 100_000;
pub const REFERRAL_CODE_MAX: u32 = 999_999;

/// Free-tier subscriptions are created with an expiry this far out.
pub const FREE_TIER_DURATION_YEARS: u32 = 100;

/// Generate a referral code candidate with a thread-local RNG
pub fn generate_referral_code(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    referral_code_from_rng(prefix, &mut rng)
}

/// Generate a referral code candidate: `<prefix>-<6 digits>`
pub fn referral_code_from_rng<R: Rng + ?Sized>(prefix: &str, rng: &mut R) -> String {
    format!("{}-{}", prefix, rng.gen_range(REFERRAL_CODE_MIN..=REFERRAL_CODE_MAX))
}

/// Check that a code has the `<prefix>-<6 digits>` shape and an in-range suffix
#[cfg(test)]
fn is_valid_referral_code(code: &str, prefix: &str) -> bool {
    let Some(digits) = code
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('-'))
    else {
        return false;
    };

    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    digits
        .parse::<u32>()
        .map(|n| (REFERRAL_CODE_MIN..=REFERRAL_CODE_MAX).contains(&n))
        .unwrap_or(false)
}

/// Expiry timestamp for a subscription created at `now` on the free tier
pub fn free_tier_expiry(now: DateTime<Utc>) -> ProfileResult<DateTime<Utc>> {
    now.checked_add_months(Months::new(FREE_TIER_DURATION_YEARS * 12))
        .ok_or_else(|| ProfileError::InternalError("Subscription expiry overflowed".to_string()))
}
