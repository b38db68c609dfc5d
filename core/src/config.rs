//! Operational rule settings
//!
//! Defaults come from [`crate::constants`]. Tier thresholds, daily rates,
//! run limits and commission rates are not configurable.

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants::*;

/// Longest accepted run window (one year)
pub const MAX_COOLDOWN_HOURS: i64 = 24 * 365;
/// Longest accepted activity window, withdrawal lock or payout delay
pub const MAX_RULE_DAYS: i64 = 3650;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rules {
    /// Length of a profit run window
    pub cooldown_hours: i64,
    /// A downline member must have a ledger entry this recent to count as active
    pub active_window_days: i64,
    /// Lifetime deposits a downline member needs to count as active
    pub active_min_deposit: Decimal,
    pub signup_bonus: Decimal,
    /// Days after the last deposit or withdrawal before another withdrawal
    pub withdrawal_lock_days: i64,
    /// Days between a withdrawal request and its payout
    pub payout_days: i64,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            cooldown_hours: RUN_COOLDOWN_HOURS,
            active_window_days: ACTIVE_WINDOW_DAYS,
            active_min_deposit: ACTIVE_MIN_DEPOSIT,
            signup_bonus: SIGNUP_BONUS,
            withdrawal_lock_days: WITHDRAWAL_LOCK_DAYS,
            payout_days: WITHDRAWAL_PAYOUT_DAYS,
        }
    }
}

impl Rules {
    // The duration helpers clamp to the accepted range; `validate` reports
    // anything outside it.

    pub fn cooldown(&self) -> Duration {
        Duration::try_hours(self.cooldown_hours.clamp(1, MAX_COOLDOWN_HOURS))
            .unwrap_or_else(Duration::zero)
    }

    pub fn active_window(&self) -> Duration {
        days(self.active_window_days)
    }

    pub fn withdrawal_lock(&self) -> Duration {
        days(self.withdrawal_lock_days)
    }

    pub fn payout_delay(&self) -> Duration {
        days(self.payout_days)
    }

    /// Reject settings the engine cannot work with
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=MAX_COOLDOWN_HOURS).contains(&self.cooldown_hours) {
            return Err(format!("cooldown_hours must be between 1 and {}", MAX_COOLDOWN_HOURS));
        }
        if !(1..=MAX_RULE_DAYS).contains(&self.active_window_days) {
            return Err(format!("active_window_days must be between 1 and {}", MAX_RULE_DAYS));
        }
        if self.active_min_deposit < Decimal::ZERO || self.signup_bonus < Decimal::ZERO {
            return Err("amounts must not be negative".to_string());
        }
        for (name, value) in [
            ("withdrawal_lock_days", self.withdrawal_lock_days),
            ("payout_days", self.payout_days),
        ] {
            if !(0..=MAX_RULE_DAYS).contains(&value) {
                return Err(format!("{} must be between 0 and {}", name, MAX_RULE_DAYS));
            }
        }
        Ok(())
    }
}

fn days(value: i64) -> Duration {
    Duration::try_days(value.clamp(0, MAX_RULE_DAYS)).unwrap_or_else(Duration::zero)
}
