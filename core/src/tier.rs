//! Account tiers and the rules that assign them

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::*;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    V0,
    V1,
    V2,
    V3,
    // Reserved, never assigned
    V4,
    V5,
    V6,
    V7,
}

impl Tier {
    pub const ALL: [Tier; 8] = [
        Tier::V0,
        Tier::V1,
        Tier::V2,
        Tier::V3,
        Tier::V4,
        Tier::V5,
        Tier::V6,
        Tier::V7,
    ];

    /// Tiers above V3 are locked and cannot be reached
    pub fn is_open(&self) -> bool {
        matches!(self, Tier::V0 | Tier::V1 | Tier::V2 | Tier::V3)
    }

    /// Only V1 and V2 may start profit runs
    pub fn can_run(&self) -> bool {
        matches!(self, Tier::V1 | Tier::V2)
    }

    pub fn daily_rate(&self) -> Option<Decimal> {
        match self {
            Tier::V1 => Some(V1_DAILY_RATE),
            Tier::V2 => Some(V2_DAILY_RATE),
            _ => None,
        }
    }

    pub fn run_limit(&self) -> Option<u32> {
        match self {
            Tier::V1 => Some(V1_RUNS_PER_WINDOW),
            Tier::V2 => Some(V2_RUNS_PER_WINDOW),
            _ => None,
        }
    }

    pub fn requirement(&self) -> TierRequirement {
        let (min_balance, min_active_gen1) = match self {
            Tier::V0 => (Decimal::ZERO, 0),
            Tier::V1 => (V1_MIN_BALANCE, 0),
            Tier::V2 => (V2_MIN_BALANCE, V2_MIN_ACTIVE_GEN1),
            Tier::V3 => (V3_MIN_BALANCE, V3_MIN_ACTIVE_GEN1),
            Tier::V4 => (V4_LABEL_BALANCE, 0),
            Tier::V5 => (V5_LABEL_BALANCE, 0),
            Tier::V6 => (V6_LABEL_BALANCE, 0),
            Tier::V7 => (V7_LABEL_BALANCE, 0),
        };
        TierRequirement {
            min_balance,
            min_active_gen1,
        }
    }

    pub fn max_withdrawal(&self) -> Decimal {
        match self {
            Tier::V0 | Tier::V1 => V1_MAX_WITHDRAWAL,
            Tier::V2 => V2_MAX_WITHDRAWAL,
            _ => V3_MAX_WITHDRAWAL,
        }
    }

    /// Generations of team income shown for the tier
    pub fn team_income_depth(&self) -> u8 {
        match self {
            Tier::V0 => 0,
            Tier::V1 => 2,
            Tier::V2 => 3,
            _ => 4,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tier::ALL
            .iter()
            .copied()
            .find(|t| t.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown tier: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierRequirement {
    pub min_balance: Decimal,
    pub min_active_gen1: usize,
}

/// Downstream network figures the tier engine depends on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub active_gen1: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierStatus {
    pub tier: Tier,
    pub frozen: bool,
}

/// Highest satisfied tier, first match wins from V3 down.
///
/// Pure: the same balance and snapshot always give the same status.
/// Reaching V3 freezes the account pending manual review.
pub fn compute_tier(balance: Decimal, network: &NetworkSnapshot) -> TierStatus {
    let active = network.active_gen1;
    let tier = if balance >= V3_MIN_BALANCE && active >= V3_MIN_ACTIVE_GEN1 {
        Tier::V3
    } else if balance >= V2_MIN_BALANCE && active >= V2_MIN_ACTIVE_GEN1 {
        Tier::V2
    } else if balance >= V1_MIN_BALANCE {
        Tier::V1
    } else {
        Tier::V0
    };

    TierStatus {
        tier,
        frozen: tier == Tier::V3,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierBenefits {
    pub tier: Tier,
    pub open: bool,
    pub min_withdrawal: Decimal,
    pub max_withdrawal: Decimal,
    pub withdrawal_fee_rate: Decimal,
    pub team_income_depth: u8,
}

impl TierBenefits {
    pub fn for_tier(tier: Tier) -> Self {
        TierBenefits {
            tier,
            open: tier.is_open(),
            min_withdrawal: WITHDRAWAL_MIN,
            max_withdrawal: tier.max_withdrawal(),
            withdrawal_fee_rate: WITHDRAWAL_FEE_RATE,
            team_income_depth: tier.team_income_depth(),
        }
    }

    pub fn all() -> Vec<Self> {
        Tier::ALL.iter().map(|t| Self::for_tier(*t)).collect()
    }
}

/// How far an account is from a target tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelProgress {
    pub target: Tier,
    pub requirement: TierRequirement,
    pub balance_ratio: Decimal,
    pub users_ratio: Decimal,
    pub percent: u32,
    pub achieved: bool,
}

pub fn level_progress(target: Tier, balance: Decimal, active_gen1: usize) -> LevelProgress {
    let requirement = target.requirement();

    let balance_ratio = ratio(balance, requirement.min_balance);
    let users_ratio = ratio(
        Decimal::from(active_gen1 as u64),
        Decimal::from(requirement.min_active_gen1 as u64),
    );
    let percent = ((balance_ratio + users_ratio) / dec!(2) * dec!(100))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u32()
        .unwrap_or(0);

    let achieved = target.is_open() && balance_ratio >= Decimal::ONE && users_ratio >= Decimal::ONE;

    LevelProgress {
        target,
        requirement,
        balance_ratio,
        users_ratio,
        percent,
        achieved,
    }
}

fn ratio(have: Decimal, need: Decimal) -> Decimal {
    if need.is_zero() {
        return Decimal::ONE;
    }
    (have / need).clamp(Decimal::ZERO, Decimal::ONE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(active_gen1: usize) -> NetworkSnapshot {
        NetworkSnapshot { active_gen1 }
    }

    #[test]
    fn test_tier_thresholds() {
        assert_eq!(compute_tier(dec!(0), &snap(0)).tier, Tier::V0);
        assert_eq!(compute_tier(dec!(49.99), &snap(20)).tier, Tier::V0);
        assert_eq!(compute_tier(dec!(50), &snap(0)).tier, Tier::V1);
        assert_eq!(compute_tier(dec!(500), &snap(4)).tier, Tier::V1);
        assert_eq!(compute_tier(dec!(500), &snap(5)).tier, Tier::V2);
        assert_eq!(compute_tier(dec!(2999), &snap(15)).tier, Tier::V2);
        assert_eq!(compute_tier(dec!(3000), &snap(14)).tier, Tier::V2);
    }

    #[test]
    fn test_v3_freezes() {
        let status = compute_tier(dec!(3000), &snap(15));
        assert_eq!(status.tier, Tier::V3);
        assert!(status.frozen);
        assert!(!compute_tier(dec!(600), &snap(5)).frozen);
    }

    #[test]
    fn test_compute_tier_is_deterministic() {
        for (balance, active) in [(dec!(10), 0), (dec!(75), 3), (dec!(800), 6), (dec!(5000), 20)] {
            let a = compute_tier(balance, &snap(active));
            let b = compute_tier(balance, &snap(active));
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_run_eligibility() {
        assert!(!Tier::V0.can_run());
        assert!(Tier::V1.can_run());
        assert!(Tier::V2.can_run());
        assert!(!Tier::V3.can_run());
        assert_eq!(Tier::V2.run_limit(), Some(4));
        assert_eq!(Tier::V3.daily_rate(), None);
    }

    #[test]
    fn test_tier_parse() {
        assert_eq!("v2".parse::<Tier>().unwrap(), Tier::V2);
        assert_eq!(" V7 ".parse::<Tier>().unwrap(), Tier::V7);
        assert!("gold".parse::<Tier>().is_err());
    }

    #[test]
    fn test_level_progress() {
        let p = level_progress(Tier::V2, dec!(250), 5);
        assert_eq!(p.balance_ratio, dec!(0.5));
        assert_eq!(p.users_ratio, Decimal::ONE);
        assert_eq!(p.percent, 75);
        assert!(!p.achieved);

        let p = level_progress(Tier::V1, dec!(80), 0);
        assert_eq!(p.percent, 100);
        assert!(p.achieved);
    }

    #[test]
    fn test_reserved_tiers_never_achieved() {
        let p = level_progress(Tier::V5, dec!(1000000), 100);
        assert_eq!(p.percent, 100);
        assert!(!p.achieved);
        assert!(!TierBenefits::for_tier(Tier::V6).open);
    }

    #[test]
    fn test_benefits() {
        let all = TierBenefits::all();
        assert_eq!(all.len(), 8);
        assert_eq!(all[2].max_withdrawal, dec!(1000));
        assert_eq!(all[3].team_income_depth, 4);
    }
}
