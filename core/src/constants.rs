//! Canonical rule table
//!
//! Every rate, threshold and limit used by the tier engine, run scheduler,
//! commission allocator and withdrawal desk lives here and nowhere else.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Credited once when an account is registered
pub const SIGNUP_BONUS: Decimal = dec!(4.00);

// Tier thresholds
pub const V1_MIN_BALANCE: Decimal = dec!(50);
pub const V2_MIN_BALANCE: Decimal = dec!(500);
pub const V3_MIN_BALANCE: Decimal = dec!(3000);
pub const V2_MIN_ACTIVE_GEN1: usize = 5;
pub const V3_MIN_ACTIVE_GEN1: usize = 15;

/// Balance labels shown for the reserved tiers (never reachable)
pub const V4_LABEL_BALANCE: Decimal = dec!(6000);
pub const V5_LABEL_BALANCE: Decimal = dec!(10000);
pub const V6_LABEL_BALANCE: Decimal = dec!(15000);
pub const V7_LABEL_BALANCE: Decimal = dec!(20000);

// Profit runs
pub const V1_DAILY_RATE: Decimal = dec!(0.0173);
pub const V2_DAILY_RATE: Decimal = dec!(0.0223);
pub const V1_RUNS_PER_WINDOW: u32 = 3;
pub const V2_RUNS_PER_WINDOW: u32 = 4;
pub const RUN_COOLDOWN_HOURS: i64 = 24;

// Active downline member rule
pub const ACTIVE_MIN_DEPOSIT: Decimal = dec!(100);
pub const ACTIVE_WINDOW_DAYS: i64 = 30;

/// Commission rate per upline generation, index 0 is generation 1
pub const COMMISSION_RATES: [Decimal; 4] = [dec!(0.20), dec!(0.04), dec!(0.02), dec!(0.01)];

/// Deepest upline generation that receives commission
pub const MAX_GENERATIONS: u8 = COMMISSION_RATES.len() as u8;

// Reward claims, each kind once per window
pub const DAILY_REWARD: Decimal = dec!(3);
/// Lucky reward is a whole amount drawn from 0..=LUCKY_REWARD_MAX
pub const LUCKY_REWARD_MAX: u32 = 8;
pub const REWARD_CLAIM_HOURS: i64 = 24;

// Withdrawals
pub const WITHDRAWAL_MIN: Decimal = dec!(20);
pub const WITHDRAWAL_FEE_RATE: Decimal = dec!(0.05);
pub const WITHDRAWAL_LOCK_DAYS: i64 = 3;
pub const WITHDRAWAL_PAYOUT_DAYS: i64 = 5;
pub const V1_MAX_WITHDRAWAL: Decimal = dec!(500);
pub const V2_MAX_WITHDRAWAL: Decimal = dec!(1000);
pub const V3_MAX_WITHDRAWAL: Decimal = dec!(2000);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commission_table() {
        assert_eq!(MAX_GENERATIONS, 4);
        let total: Decimal = COMMISSION_RATES.iter().sum();
        assert_eq!(total, dec!(0.27));
    }

    #[test]
    fn test_thresholds_ordered() {
        assert!(V1_MIN_BALANCE < V2_MIN_BALANCE);
        assert!(V2_MIN_BALANCE < V3_MIN_BALANCE);
        assert!(V2_MIN_ACTIVE_GEN1 < V3_MIN_ACTIVE_GEN1);
    }
}
