//! Append-only account ledger
//!
//! Every balance change is a [`LedgerEntry`]. Posting an entry appends it to
//! the [`LedgerStore`], applies it to the cached account balance and then
//! reclassifies the account and its upline, because the entry may have moved
//! the balance or changed who counts as an active downline member.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::account::{Account, AccountId};
use crate::config::Rules;
use crate::constants::MAX_GENERATIONS;
use crate::error::{CoreError, Result};
use crate::locks::KeyedLocks;
use crate::network;
use crate::store::{AccountStore, LedgerStore};
use crate::tier::{compute_tier, Tier, TierStatus};

pub type EntryId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    SignupBonus,
    Deposit,
    Profit,
    Reward,
    Commission,
    Withdrawal,
    WithdrawalFee,
}

impl EntryKind {
    /// Credits are positive, debits negative
    pub fn is_credit(&self) -> bool {
        !matches!(self, EntryKind::Withdrawal | EntryKind::WithdrawalFee)
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntryKind::SignupBonus => "signup_bonus",
            EntryKind::Deposit => "deposit",
            EntryKind::Profit => "profit",
            EntryKind::Reward => "reward",
            EntryKind::Commission => "commission",
            EntryKind::Withdrawal => "withdrawal",
            EntryKind::WithdrawalFee => "withdrawal_fee",
        };
        write!(f, "{}", name)
    }
}

/// Immutable, signed balance change
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub account_id: AccountId,
    pub kind: EntryKind,
    pub amount: Decimal,
    /// Upline distance, commissions only
    pub generation: Option<u8>,
    pub created_at: DateTime<Utc>,
    /// Profit entry a commission was paid from
    pub related_entry_id: Option<EntryId>,
}

impl LedgerEntry {
    pub fn new(account_id: AccountId, kind: EntryKind, amount: Decimal, created_at: DateTime<Utc>) -> Self {
        LedgerEntry {
            id: Uuid::new_v4().to_string(),
            account_id,
            kind,
            amount,
            generation: None,
            created_at,
            related_entry_id: None,
        }
    }

    pub fn commission(
        account_id: AccountId,
        amount: Decimal,
        generation: u8,
        related_entry_id: EntryId,
        created_at: DateTime<Utc>,
    ) -> Self {
        LedgerEntry {
            generation: Some(generation),
            related_entry_id: Some(related_entry_id),
            ..Self::new(account_id, EntryKind::Commission, amount, created_at)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.amount.is_zero() {
            return Err(CoreError::InvalidAmount(format!("{} of zero", self.kind)));
        }
        if self.kind.is_credit() == self.amount.is_sign_negative() {
            return Err(CoreError::InvalidAmount(format!(
                "{} cannot carry amount {}",
                self.kind, self.amount
            )));
        }

        match (self.kind, self.generation, &self.related_entry_id) {
            (EntryKind::Commission, Some(g), Some(_)) if (1..=MAX_GENERATIONS).contains(&g) => Ok(()),
            (EntryKind::Commission, _, _) => Err(CoreError::InvalidEntry(
                "commission needs a generation in 1..=4 and a related profit entry".to_string(),
            )),
            (_, None, None) => Ok(()),
            (kind, _, _) => Err(CoreError::InvalidEntry(format!(
                "{} cannot carry a generation or related entry",
                kind
            ))),
        }
    }
}

/// Sum of amounts, `None` if it leaves the representable range
pub fn checked_sum(amounts: impl IntoIterator<Item = Decimal>) -> Option<Decimal> {
    amounts
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, amount| acc.checked_add(amount))
}

/// Cached balance versus the sum of recorded entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub account_id: AccountId,
    pub cached_balance: Decimal,
    pub ledger_sum: Decimal,
    pub entry_count: usize,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.cached_balance == self.ledger_sum
    }
}

pub struct Ledger {
    accounts: Arc<dyn AccountStore>,
    entries: Arc<dyn LedgerStore>,
    rules: Rules,
    balance_locks: KeyedLocks,
    /// Held for a whole run, withdrawal or claim on one account
    account_locks: KeyedLocks,
}

impl Ledger {
    pub fn new(accounts: Arc<dyn AccountStore>, entries: Arc<dyn LedgerStore>, rules: Rules) -> Self {
        Self {
            accounts,
            entries,
            rules,
            balance_locks: KeyedLocks::new(),
            account_locks: KeyedLocks::new(),
        }
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn accounts(&self) -> &dyn AccountStore {
        self.accounts.as_ref()
    }

    pub fn entries(&self) -> &dyn LedgerStore {
        self.entries.as_ref()
    }

    pub fn account(&self, id: &str) -> Result<Option<Account>> {
        self.accounts.get_account(id)
    }

    pub fn require_account(&self, id: &str) -> Result<Account> {
        self.accounts
            .get_account(id)?
            .ok_or_else(|| CoreError::AccountNotFound(id.to_string()))
    }

    pub fn entries_for(&self, account_id: &str) -> Result<Vec<LedgerEntry>> {
        self.entries.entries_for(account_id)
    }

    pub fn entries_related_to(&self, entry_id: &str) -> Result<Vec<LedgerEntry>> {
        self.entries.entries_related_to(entry_id)
    }

    /// Run `f` as the only run, withdrawal or claim in progress on `account_id`
    pub fn transaction<T>(&self, account_id: &str, f: impl FnOnce() -> T) -> T {
        self.account_locks.with(account_id, f)
    }

    /// Store a brand new account. Its upline must already exist.
    pub fn open_account(&self, account: &Account) -> Result<()> {
        if self.accounts.get_account(&account.id)?.is_some() {
            return Err(CoreError::AccountExists(account.id.clone()));
        }
        if let Some(upline) = &account.upline_id {
            if self.accounts.get_account(upline)?.is_none() {
                return Err(CoreError::UplineNotFound(upline.clone()));
            }
        }
        if !account.balance.is_zero() {
            return Err(CoreError::InvalidAmount(
                "new accounts start with a zero balance".to_string(),
            ));
        }
        self.accounts.save_account(account)
    }

    /// Append an entry and apply it to its account.
    ///
    /// The entry is rejected before anything is written if it would take the
    /// balance below zero or out of range. Once the entry is appended it is
    /// committed: a failed reclassification afterwards is only logged, the
    /// tier is recomputed on the next read.
    pub fn post(&self, entry: LedgerEntry) -> Result<LedgerEntry> {
        entry.validate()?;

        let account = self.balance_locks.with(&entry.account_id, || -> Result<Account> {
            let mut account = self.require_account(&entry.account_id)?;
            let next = account.balance.checked_add(entry.amount).ok_or_else(|| {
                CoreError::InvalidAmount(format!(
                    "{} of {} overflows the balance of {}",
                    entry.kind, entry.amount, account.id
                ))
            })?;
            if next < Decimal::ZERO {
                return Err(CoreError::InsufficientBalance {
                    requested: -entry.amount,
                    available: account.balance,
                });
            }

            self.entries.append_entry(&entry)?;
            account.balance = next;
            self.accounts.save_account(&account)?;
            Ok(account)
        })?;

        log::debug!(
            "posted {} {} to {} (balance {})",
            entry.kind,
            entry.amount,
            account.id,
            account.balance
        );

        // Tier recomputation reads committed state only
        let affected = std::iter::once(&account.id).chain(account.upline_id.as_ref());
        for id in affected {
            if let Err(e) = self.reclassify(id, entry.created_at) {
                log::warn!("tier of {} not refreshed after {}: {}", id, entry.id, e);
            }
        }

        Ok(entry)
    }

    /// Recompute and store an account's tier from its balance and network.
    ///
    /// A frozen account stays V3 until it is reviewed.
    pub fn reclassify(&self, account_id: &str, now: DateTime<Utc>) -> Result<TierStatus> {
        self.balance_locks.with(account_id, || -> Result<TierStatus> {
            let mut account = self.require_account(account_id)?;
            let current = account.status();

            let next = if account.frozen {
                if account.tier != Tier::V3 {
                    return Err(CoreError::InvalidTierTransition {
                        from: account.tier,
                        to: Tier::V3,
                    });
                }
                current
            } else {
                let snapshot = network::snapshot(
                    self.accounts.as_ref(),
                    self.entries.as_ref(),
                    account_id,
                    now,
                    &self.rules,
                )?;
                compute_tier(account.balance, &snapshot)
            };

            if !next.tier.is_open() {
                return Err(CoreError::InvalidTierTransition {
                    from: current.tier,
                    to: next.tier,
                });
            }

            if next != current {
                if next.frozen {
                    log::warn!("account {} reached {} and is frozen for review", account_id, next.tier);
                } else {
                    log::info!("account {} moved {} -> {}", account_id, current.tier, next.tier);
                }
                account.tier = next.tier;
                account.frozen = next.frozen;
                self.accounts.save_account(&account)?;
            }

            Ok(next)
        })
    }

    pub fn reconcile(&self, account_id: &str) -> Result<Reconciliation> {
        let account = self.require_account(account_id)?;
        let entries = self.entries.entries_for(account_id)?;
        let ledger_sum = checked_sum(entries.iter().map(|e| e.amount)).ok_or_else(|| {
            CoreError::InvalidAmount(format!("ledger of {} sums out of range", account_id))
        })?;
        Ok(Reconciliation {
            account_id: account.id,
            cached_balance: account.balance,
            ledger_sum,
            entry_count: entries.len(),
        })
    }
}
