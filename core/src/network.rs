//! Referral network statistics
//!
//! The network is the tree formed by `upline_id` links. Generation `g` of an
//! account is everyone exactly `g` hops below it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::config::Rules;
use crate::constants::{COMMISSION_RATES, MAX_GENERATIONS};
use crate::error::{CoreError, Result};
use crate::ledger::{checked_sum, EntryKind, LedgerEntry};
use crate::store::{AccountStore, LedgerStore};
use crate::tier::NetworkSnapshot;

/// A member counts as active with enough lifetime deposits and some recent
/// self-initiated activity. Commissions received do not count as activity.
pub fn is_active_member(entries: &[LedgerEntry], now: DateTime<Utc>, rules: &Rules) -> bool {
    let deposited = checked_sum(
        entries
            .iter()
            .filter(|e| e.kind == EntryKind::Deposit)
            .map(|e| e.amount),
    );
    // Deposits too large to add up clear any minimum
    if deposited.is_some_and(|total| total < rules.active_min_deposit) {
        return false;
    }

    let window = rules.active_window();
    entries.iter().any(|e| {
        e.kind != EntryKind::Commission && e.created_at <= now && now - e.created_at <= window
    })
}

pub fn snapshot(
    accounts: &dyn AccountStore,
    ledger: &dyn LedgerStore,
    account_id: &str,
    now: DateTime<Utc>,
    rules: &Rules,
) -> Result<NetworkSnapshot> {
    let mut active_gen1 = 0;
    for member in accounts.downline(account_id)? {
        if is_active_member(&ledger.entries_for(&member.id)?, now, rules) {
            active_gen1 += 1;
        }
    }
    Ok(NetworkSnapshot { active_gen1 })
}

/// Downline members grouped by generation, index 0 is generation 1
pub fn generations(accounts: &dyn AccountStore, account_id: &str) -> Result<Vec<Vec<Account>>> {
    let mut levels: Vec<Vec<Account>> = Vec::with_capacity(MAX_GENERATIONS as usize);
    let mut frontier = vec![account_id.to_string()];

    for _ in 0..MAX_GENERATIONS {
        let mut next = Vec::new();
        for id in &frontier {
            next.extend(accounts.downline(id)?);
        }
        frontier = next.iter().map(|a| a.id.clone()).collect();
        levels.push(next);
    }

    Ok(levels)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub generation: u8,
    pub registered: usize,
    pub active: usize,
    /// Profit earned by the generation's members in the interval
    pub team_profit: Decimal,
    pub rate: Decimal,
    /// Commission the root received from this generation in the interval
    pub commission: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkReport {
    pub account_id: String,
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub generations: Vec<GenerationStats>,
}

impl NetworkReport {
    pub fn total_registered(&self) -> usize {
        self.generations.iter().map(|g| g.registered).sum()
    }

    pub fn total_active(&self) -> usize {
        self.generations.iter().map(|g| g.active).sum()
    }

    pub fn total_inactive(&self) -> usize {
        self.total_registered().saturating_sub(self.total_active())
    }

    /// Saturates at `Decimal::MAX`
    pub fn total_team_profit(&self) -> Decimal {
        checked_sum(self.generations.iter().map(|g| g.team_profit)).unwrap_or(Decimal::MAX)
    }

    /// Saturates at `Decimal::MAX`
    pub fn total_commission(&self) -> Decimal {
        checked_sum(self.generations.iter().map(|g| g.commission)).unwrap_or(Decimal::MAX)
    }
}

pub fn generation_report(
    accounts: &dyn AccountStore,
    ledger: &dyn LedgerStore,
    account_id: &str,
    since: DateTime<Utc>,
    now: DateTime<Utc>,
    rules: &Rules,
) -> Result<NetworkReport> {
    let in_range = |e: &LedgerEntry| e.created_at >= since && e.created_at <= now;
    let own_entries = ledger.entries_for(account_id)?;

    let mut stats = Vec::with_capacity(MAX_GENERATIONS as usize);
    for (idx, members) in generations(accounts, account_id)?.into_iter().enumerate() {
        let generation = idx as u8 + 1;

        let mut active = 0;
        let mut profits = Vec::new();
        for member in &members {
            let entries = ledger.entries_for(&member.id)?;
            if is_active_member(&entries, now, rules) {
                active += 1;
            }
            profits.extend(
                entries
                    .iter()
                    .filter(|e| e.kind == EntryKind::Profit && in_range(e))
                    .map(|e| e.amount),
            );
        }
        let team_profit = checked_sum(profits).ok_or_else(|| out_of_range("team profit", generation))?;

        let commission = checked_sum(
            own_entries
                .iter()
                .filter(|e| {
                    e.kind == EntryKind::Commission && e.generation == Some(generation) && in_range(e)
                })
                .map(|e| e.amount),
        )
        .ok_or_else(|| out_of_range("commission", generation))?;

        stats.push(GenerationStats {
            generation,
            registered: members.len(),
            active,
            team_profit,
            rate: COMMISSION_RATES[idx],
            commission,
        });
    }

    Ok(NetworkReport {
        account_id: account_id.to_string(),
        since,
        until: now,
        generations: stats,
    })
}

fn out_of_range(what: &str, generation: u8) -> CoreError {
    CoreError::InvalidAmount(format!("generation {} {} is out of range", generation, what))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryAccountStore, MemoryLedgerStore};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn deposit(account_id: &str, amount: Decimal, at: DateTime<Utc>) -> LedgerEntry {
        LedgerEntry::new(account_id.to_string(), EntryKind::Deposit, amount, at)
    }

    #[test]
    fn test_active_member_rule() {
        let rules = Rules::default();
        let now = Utc::now();

        assert!(is_active_member(&[deposit("a", dec!(100), now - Duration::days(30))], now, &rules));
        // Not enough deposited
        assert!(!is_active_member(&[deposit("a", dec!(99.99), now)], now, &rules));
        // Enough deposited, but idle for too long
        assert!(!is_active_member(&[deposit("a", dec!(150), now - Duration::days(31))], now, &rules));

        // Deposits past the representable range still count as enough
        let huge = [deposit("a", Decimal::MAX, now), deposit("a", Decimal::MAX, now)];
        assert!(is_active_member(&huge, now, &rules));

        // Commission alone does not refresh activity
        let old = deposit("a", dec!(150), now - Duration::days(40));
        let commission = LedgerEntry::commission("a".into(), dec!(1), 1, "p".into(), now);
        assert!(!is_active_member(&[old, commission], now, &rules));
    }

    #[test]
    fn test_generations_walk_four_levels() {
        let accounts = MemoryAccountStore::new();
        let now = Utc::now();
        let root = Account::new(None, now);
        accounts.save_account(&root).unwrap();

        // Chain of five below root: only four are reported
        let mut parent = root.id.clone();
        for _ in 0..5 {
            let child = Account::new(Some(parent.clone()), now);
            accounts.save_account(&child).unwrap();
            parent = child.id;
        }

        let levels = generations(&accounts, &root.id).unwrap();
        assert_eq!(levels.len(), 4);
        assert!(levels.iter().all(|l| l.len() == 1));
    }

    #[test]
    fn test_snapshot_counts_only_active_direct_referrals() {
        let accounts = MemoryAccountStore::new();
        let ledger = MemoryLedgerStore::new();
        let rules = Rules::default();
        let now = Utc::now();

        let root = Account::new(None, now);
        accounts.save_account(&root).unwrap();

        for amount in [dec!(100), dec!(250), dec!(20)] {
            let child = Account::new(Some(root.id.clone()), now);
            accounts.save_account(&child).unwrap();
            ledger.append_entry(&deposit(&child.id, amount, now)).unwrap();
        }

        let snap = snapshot(&accounts, &ledger, &root.id, now, &rules).unwrap();
        assert_eq!(snap.active_gen1, 2);
    }
}
