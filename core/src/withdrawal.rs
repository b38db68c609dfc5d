//! Withdrawal requests and payouts
//!
//! A request debits the full amount at once, split into a `withdrawal` entry
//! for what the member receives and a `withdrawal_fee` entry. The payout is
//! tracked as a pending record until its availability date.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::account::AccountId;
use crate::constants::{WITHDRAWAL_FEE_RATE, WITHDRAWAL_MIN};
use crate::error::{CoreError, Result, WithdrawalBlocked};
use crate::ledger::{EntryKind, Ledger, LedgerEntry};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Paid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WithdrawalRecord {
    pub id: String,
    pub account_id: AccountId,
    pub amount: Decimal,
    pub fee: Decimal,
    pub received: Decimal,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub available_at: DateTime<Utc>,
    pub status: WithdrawalStatus,
}

pub fn withdrawal_fee(amount: Decimal) -> Decimal {
    (amount * WITHDRAWAL_FEE_RATE).max(Decimal::ZERO)
}

/// BEP-20 style address: `0x` followed by 40 hex digits
pub fn is_valid_address(address: &str) -> bool {
    address.len() == 42
        && address.starts_with("0x")
        && address[2..].chars().all(|c| c.is_ascii_hexdigit())
}

pub struct WithdrawalDesk {
    ledger: Arc<Ledger>,
    records: RwLock<Vec<WithdrawalRecord>>,
}

impl WithdrawalDesk {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            ledger,
            records: RwLock::new(Vec::new()),
        }
    }

    /// Earliest time the account may withdraw again, if it is locked at all
    pub fn unlocks_at(&self, account_id: &str) -> Result<Option<DateTime<Utc>>> {
        let last_gate = self
            .ledger
            .entries_for(account_id)?
            .into_iter()
            .filter(|e| matches!(e.kind, EntryKind::Deposit | EntryKind::Withdrawal))
            .map(|e| e.created_at)
            .max();
        Ok(last_gate.map(|at| at + self.ledger.rules().withdrawal_lock()))
    }

    /// Serialized with runs and claims on the same account
    pub fn request(
        &self,
        account_id: &str,
        amount: Decimal,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<WithdrawalRecord> {
        self.ledger.transaction(account_id, || -> Result<WithdrawalRecord> {
            let status = self.ledger.reclassify(account_id, now)?;
            if status.frozen {
                return Err(WithdrawalBlocked::Frozen.into());
            }

            if let Some(until) = self.unlocks_at(account_id)? {
                if now < until {
                    return Err(WithdrawalBlocked::Locked { until }.into());
                }
            }

            let address = address.trim();
            if !is_valid_address(address) {
                return Err(WithdrawalBlocked::InvalidAddress(address.to_string()).into());
            }

            if amount <= Decimal::ZERO {
                return Err(CoreError::InvalidAmount(format!("withdrawal of {}", amount)));
            }
            if amount < WITHDRAWAL_MIN {
                return Err(WithdrawalBlocked::BelowMinimum {
                    amount,
                    minimum: WITHDRAWAL_MIN,
                }
                .into());
            }
            let maximum = status.tier.max_withdrawal();
            if amount > maximum {
                return Err(WithdrawalBlocked::AboveMaximum {
                    amount,
                    maximum,
                    tier: status.tier,
                }
                .into());
            }

            let account = self.ledger.require_account(account_id)?;
            if amount > account.balance {
                return Err(CoreError::InsufficientBalance {
                    requested: amount,
                    available: account.balance,
                });
            }

            let fee = withdrawal_fee(amount);
            let received = amount - fee;

            self.ledger.post(LedgerEntry::new(
                account.id.clone(),
                EntryKind::Withdrawal,
                -received,
                now,
            ))?;
            if !fee.is_zero() {
                self.ledger.post(LedgerEntry::new(
                    account.id.clone(),
                    EntryKind::WithdrawalFee,
                    -fee,
                    now,
                ))?;
            }

            let record = WithdrawalRecord {
                id: Uuid::new_v4().to_string(),
                account_id: account.id.clone(),
                amount,
                fee,
                received,
                address: address.to_string(),
                created_at: now,
                available_at: now + self.ledger.rules().payout_delay(),
                status: WithdrawalStatus::Pending,
            };
            self.records.write().push(record.clone());

            log::info!(
                "withdrawal {} for {}: {} (fee {}) payable at {}",
                record.id,
                record.account_id,
                record.received,
                record.fee,
                record.available_at
            );

            Ok(record)
        })
    }

    /// Mark every due pending withdrawal as paid
    pub fn settle(&self, now: DateTime<Utc>) -> Vec<WithdrawalRecord> {
        let mut records = self.records.write();
        let mut settled = Vec::new();
        for record in records.iter_mut() {
            if record.status == WithdrawalStatus::Pending && record.available_at <= now {
                record.status = WithdrawalStatus::Paid;
                settled.push(record.clone());
            }
        }
        if !settled.is_empty() {
            log::info!("settled {} withdrawals", settled.len());
        }
        settled
    }

    pub fn records_for(&self, account_id: &str) -> Vec<WithdrawalRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.account_id == account_id)
            .cloned()
            .collect()
    }

    pub fn records(&self) -> Vec<WithdrawalRecord> {
        self.records.read().clone()
    }

    pub fn restore(&self, records: Vec<WithdrawalRecord>) {
        *self.records.write() = records;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Account;
    use crate::config::Rules;
    use crate::store::{MemoryAccountStore, MemoryLedgerStore};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    const ADDR: &str = "0x52908400098527886E0F7030069857D2E4169EE7";

    fn desk() -> (Arc<Ledger>, WithdrawalDesk) {
        let ledger = Arc::new(Ledger::new(
            Arc::new(MemoryAccountStore::new()),
            Arc::new(MemoryLedgerStore::new()),
            Rules::default(),
        ));
        (ledger.clone(), WithdrawalDesk::new(ledger))
    }

    fn funded(ledger: &Ledger, amount: Decimal, at: DateTime<Utc>) -> Account {
        let acct = Account::new(None, at);
        ledger.open_account(&acct).unwrap();
        ledger
            .post(LedgerEntry::new(acct.id.clone(), EntryKind::Deposit, amount, at))
            .unwrap();
        acct
    }

    #[test]
    fn test_address_format() {
        assert!(is_valid_address(ADDR));
        assert!(!is_valid_address("0x123"));
        assert!(!is_valid_address("52908400098527886E0F7030069857D2E4169EE7xx"));
        assert!(!is_valid_address("0xZZ908400098527886E0F7030069857D2E4169EE7"));
    }

    #[test]
    fn test_locked_after_deposit() {
        let (ledger, desk) = desk();
        let t0 = Utc::now();
        let acct = funded(&ledger, dec!(200), t0);

        let err = desk
            .request(&acct.id, dec!(50), ADDR, t0 + Duration::days(2))
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::WithdrawalBlocked(WithdrawalBlocked::Locked { .. })
        ));
    }

    #[test]
    fn test_withdrawal_splits_fee() {
        let (ledger, desk) = desk();
        let t0 = Utc::now();
        let acct = funded(&ledger, dec!(200), t0);
        let at = t0 + Duration::days(3);

        let record = desk.request(&acct.id, dec!(100), ADDR, at).unwrap();
        assert_eq!(record.fee, dec!(5));
        assert_eq!(record.received, dec!(95));
        assert_eq!(record.status, WithdrawalStatus::Pending);

        let stored = ledger.require_account(&acct.id).unwrap();
        assert_eq!(stored.balance, dec!(100));
        let kinds: Vec<EntryKind> = ledger
            .entries_for(&acct.id)
            .unwrap()
            .iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![EntryKind::Deposit, EntryKind::Withdrawal, EntryKind::WithdrawalFee]
        );

        // Nothing is due before the payout delay
        assert!(desk.settle(at + Duration::days(4)).is_empty());
        let paid = desk.settle(at + Duration::days(5));
        assert_eq!(paid.len(), 1);
        assert_eq!(desk.records_for(&acct.id)[0].status, WithdrawalStatus::Paid);
    }

    #[test]
    fn test_limits() {
        let (ledger, desk) = desk();
        let t0 = Utc::now();
        let acct = funded(&ledger, dec!(800), t0);
        let at = t0 + Duration::days(4);

        assert!(matches!(
            desk.request(&acct.id, dec!(19.99), ADDR, at),
            Err(CoreError::WithdrawalBlocked(WithdrawalBlocked::BelowMinimum { .. }))
        ));
        // V1 cap is 500
        assert!(matches!(
            desk.request(&acct.id, dec!(600), ADDR, at),
            Err(CoreError::WithdrawalBlocked(WithdrawalBlocked::AboveMaximum { tier: crate::tier::Tier::V1, .. }))
        ));
        assert!(matches!(
            desk.request(&acct.id, dec!(-5), ADDR, at),
            Err(CoreError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_insufficient_balance() {
        let (ledger, desk) = desk();
        let t0 = Utc::now();
        let acct = funded(&ledger, dec!(30), t0);

        assert!(matches!(
            desk.request(&acct.id, dec!(40), ADDR, t0 + Duration::days(3)),
            Err(CoreError::InsufficientBalance { .. })
        ));
        assert!(desk.records().is_empty());
    }
}
