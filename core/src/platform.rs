//! Platform facade
//!
//! Wires the stores, clock and rules into the ledger, commission allocator,
//! run scheduler, withdrawal desk and reward desk, and moves the whole state in and out
//! through [`PlatformSnapshot`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::account::{Account, AccountId};
use crate::clock::{Clock, SystemClock};
use crate::commission::CommissionAllocator;
use crate::config::Rules;
use crate::error::{CoreError, Result};
use crate::ledger::{EntryKind, Ledger, LedgerEntry, Reconciliation};
use crate::network::{self, NetworkReport};
use crate::reward::{RewardClaim, RewardDesk, RewardKind};
use crate::scheduler::{RunOutcome, RunScheduler, RunStatus, RunWindow};
use crate::store::{AccountStore, LedgerStore, MemoryAccountStore, MemoryLedgerStore};
use crate::tier::{level_progress, LevelProgress, Tier, TierStatus};
use crate::withdrawal::{WithdrawalDesk, WithdrawalRecord};

/// Complete platform state at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformSnapshot {
    pub taken_at: DateTime<Utc>,
    pub accounts: Vec<Account>,
    /// Ledger entries in append order
    pub entries: Vec<LedgerEntry>,
    pub windows: Vec<(AccountId, RunWindow)>,
    pub withdrawals: Vec<WithdrawalRecord>,
    #[serde(default)]
    pub claims: Vec<RewardClaim>,
}

pub struct Platform {
    ledger: Arc<Ledger>,
    allocator: Arc<CommissionAllocator>,
    scheduler: RunScheduler,
    desk: WithdrawalDesk,
    rewards: RewardDesk,
    clock: Arc<dyn Clock>,
}

impl Platform {
    /// In-memory platform on the wall clock
    pub fn new(rules: Rules) -> Result<Self> {
        Self::with_clock(rules, Arc::new(SystemClock))
    }

    pub fn with_clock(rules: Rules, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::with_stores(
            Arc::new(MemoryAccountStore::new()),
            Arc::new(MemoryLedgerStore::new()),
            rules,
            clock,
        )
    }

    pub fn with_stores(
        accounts: Arc<dyn AccountStore>,
        entries: Arc<dyn LedgerStore>,
        rules: Rules,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        rules.validate().map_err(CoreError::InvalidConfig)?;

        let ledger = Arc::new(Ledger::new(accounts, entries, rules));
        let allocator = Arc::new(CommissionAllocator::new(ledger.clone()));
        let scheduler = RunScheduler::new(ledger.clone(), allocator.clone());
        let desk = WithdrawalDesk::new(ledger.clone());
        let rewards = RewardDesk::new(ledger.clone());

        Ok(Self {
            ledger,
            allocator,
            scheduler,
            desk,
            rewards,
            clock,
        })
    }

    pub fn rules(&self) -> &Rules {
        self.ledger.rules()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Open an account under `upline_id` and credit the signup bonus
    pub fn register(&self, upline_id: Option<&str>) -> Result<Account> {
        let now = self.clock.now();
        let account = Account::new(upline_id.map(str::to_string), now);
        self.ledger.open_account(&account)?;

        let bonus = self.rules().signup_bonus;
        if bonus > Decimal::ZERO {
            self.ledger.post(LedgerEntry::new(
                account.id.clone(),
                EntryKind::SignupBonus,
                bonus,
                now,
            ))?;
        }

        log::info!(
            "registered {} (upline {})",
            account.id,
            upline_id.unwrap_or("none")
        );
        self.ledger.require_account(&account.id)
    }

    pub fn deposit(&self, account_id: &str, amount: Decimal) -> Result<LedgerEntry> {
        if amount <= Decimal::ZERO {
            return Err(CoreError::InvalidAmount(format!("deposit of {}", amount)));
        }
        let entry = self.ledger.post(LedgerEntry::new(
            account_id.to_string(),
            EntryKind::Deposit,
            amount,
            self.clock.now(),
        ))?;
        log::info!("deposit {} to {}", entry.amount, account_id);
        Ok(entry)
    }

    pub fn attempt_run(&self, account_id: &str) -> Result<RunOutcome> {
        self.scheduler.attempt_run(account_id, self.clock.now())
    }

    pub fn run_status(&self, account_id: &str) -> Result<RunStatus> {
        self.ledger.require_account(account_id)?;
        Ok(self.scheduler.run_status(account_id, self.clock.now()))
    }

    /// Pay (or finish paying) commissions on an existing profit entry
    pub fn allocate_commissions(&self, profit_entry_id: &str) -> Result<Vec<LedgerEntry>> {
        let profit = self
            .ledger
            .entries()
            .get_entry(profit_entry_id)?
            .ok_or_else(|| CoreError::InvalidEntry(format!("unknown entry {}", profit_entry_id)))?;
        let account = self.ledger.require_account(&profit.account_id)?;
        self.allocator.allocate(&profit, &account)
    }

    /// Current tier from committed state
    pub fn compute_tier(&self, account_id: &str) -> Result<TierStatus> {
        self.ledger.reclassify(account_id, self.clock.now())
    }

    pub fn withdraw(&self, account_id: &str, amount: Decimal, address: &str) -> Result<WithdrawalRecord> {
        self.desk.request(account_id, amount, address, self.clock.now())
    }

    pub fn settle_withdrawals(&self) -> Vec<WithdrawalRecord> {
        self.desk.settle(self.clock.now())
    }

    pub fn withdrawals_for(&self, account_id: &str) -> Vec<WithdrawalRecord> {
        self.desk.records_for(account_id)
    }

    pub fn claim_reward(&self, account_id: &str, kind: RewardKind) -> Result<RewardClaim> {
        self.rewards.claim(account_id, kind, self.clock.now())
    }

    pub fn claim_daily_reward(&self, account_id: &str) -> Result<RewardClaim> {
        self.rewards.claim_daily_reward(account_id, self.clock.now())
    }

    pub fn next_claim_at(&self, account_id: &str, kind: RewardKind) -> Option<DateTime<Utc>> {
        self.rewards.next_claim_at(account_id, kind)
    }

    pub fn network_report(&self, account_id: &str, since: DateTime<Utc>) -> Result<NetworkReport> {
        self.ledger.require_account(account_id)?;
        network::generation_report(
            self.ledger.accounts(),
            self.ledger.entries(),
            account_id,
            since,
            self.clock.now(),
            self.rules(),
        )
    }

    pub fn level_progress(&self, account_id: &str, target: Tier) -> Result<LevelProgress> {
        let account = self.ledger.require_account(account_id)?;
        let snapshot = network::snapshot(
            self.ledger.accounts(),
            self.ledger.entries(),
            account_id,
            self.clock.now(),
            self.rules(),
        )?;
        Ok(level_progress(target, account.balance, snapshot.active_gen1))
    }

    /// Account with its tier brought up to date.
    ///
    /// Referrals go idle without any entry being posted, so the stored tier
    /// can lag behind until the next read.
    pub fn account(&self, account_id: &str) -> Result<Account> {
        self.ledger.reclassify(account_id, self.clock.now())?;
        self.ledger.require_account(account_id)
    }

    pub fn accounts(&self) -> Result<Vec<Account>> {
        let now = self.clock.now();
        for account in self.ledger.accounts().all_accounts()? {
            self.ledger.reclassify(&account.id, now)?;
        }
        self.ledger.accounts().all_accounts()
    }

    pub fn entries(&self, account_id: &str) -> Result<Vec<LedgerEntry>> {
        self.ledger.require_account(account_id)?;
        self.ledger.entries_for(account_id)
    }

    /// Reconcile every account, inconsistent ones first
    pub fn audit(&self) -> Result<Vec<Reconciliation>> {
        let mut report = self
            .ledger
            .accounts()
            .all_accounts()?
            .iter()
            .map(|a| self.ledger.reconcile(&a.id))
            .collect::<Result<Vec<_>>>()?;
        report.sort_by_key(|r| r.is_consistent());
        Ok(report)
    }

    pub fn snapshot(&self) -> Result<PlatformSnapshot> {
        Ok(PlatformSnapshot {
            taken_at: self.clock.now(),
            accounts: self.ledger.accounts().all_accounts()?,
            entries: self.ledger.entries().all_entries()?,
            windows: self.scheduler.windows(),
            withdrawals: self.desk.records(),
            claims: self.rewards.claims(),
        })
    }

    /// Rebuild an in-memory platform from a snapshot.
    ///
    /// Fails if any cached balance disagrees with its ledger entries.
    pub fn restore(snapshot: PlatformSnapshot, rules: Rules, clock: Arc<dyn Clock>) -> Result<Self> {
        let platform = Self::with_clock(rules, clock)?;

        for account in &snapshot.accounts {
            platform.ledger.accounts().save_account(account)?;
        }
        for entry in &snapshot.entries {
            entry.validate()?;
            platform.ledger.entries().append_entry(entry)?;
        }
        platform.scheduler.restore_windows(snapshot.windows);
        platform.desk.restore(snapshot.withdrawals);
        platform.rewards.restore(snapshot.claims);

        for account in &snapshot.accounts {
            let check = platform.ledger.reconcile(&account.id)?;
            if !check.is_consistent() {
                return Err(CoreError::StorageError(format!(
                    "balance of {} is {} but its ledger sums to {}",
                    check.account_id, check.cached_balance, check.ledger_sum
                )));
            }
        }

        log::debug!(
            "restored {} accounts and {} entries",
            snapshot.accounts.len(),
            snapshot.entries.len()
        );
        Ok(platform)
    }
}
