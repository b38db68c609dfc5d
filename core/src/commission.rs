//! Multi-generation commission allocation
//!
//! A profit entry on an account pays a fixed share to each of up to four
//! ancestors, nearest first. The walk stops at the first missing ancestor.
//! Every commission links back to its profit entry, so a retried allocation
//! for the same profit entry only fills in what is missing.

use rust_decimal::Decimal;
use std::sync::Arc;

use crate::account::Account;
use crate::constants::{COMMISSION_RATES, MAX_GENERATIONS};
use crate::error::{CoreError, Result};
use crate::ledger::{EntryKind, Ledger, LedgerEntry};
use crate::locks::KeyedLocks;

/// Rate for an upline generation (1-based)
pub fn commission_rate(generation: u8) -> Option<Decimal> {
    if generation == 0 {
        return None;
    }
    COMMISSION_RATES.get(generation as usize - 1).copied()
}

pub struct CommissionAllocator {
    ledger: Arc<Ledger>,
    /// One allocation per profit entry at a time
    allocation_locks: KeyedLocks,
}

impl CommissionAllocator {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            ledger,
            allocation_locks: KeyedLocks::new(),
        }
    }

    /// Pay commissions on `profit` to the ancestors of `account`.
    ///
    /// Returns the entries written by this call. Generations that already
    /// hold a commission for `profit` are skipped, so re-running is a no-op.
    /// If a write fails, earlier generations stay committed and the failure
    /// is reported as [`CoreError::AllocationFailure`].
    pub fn allocate(&self, profit: &LedgerEntry, account: &Account) -> Result<Vec<LedgerEntry>> {
        if profit.kind != EntryKind::Profit {
            return Err(CoreError::InvalidEntry(format!(
                "commissions are paid on profit entries, not {}",
                profit.kind
            )));
        }
        if profit.account_id != account.id {
            return Err(CoreError::InvalidEntry(format!(
                "profit entry {} belongs to {}, not {}",
                profit.id, profit.account_id, account.id
            )));
        }

        self.allocation_locks.with(&profit.id, || -> Result<Vec<LedgerEntry>> {
            let existing = self.ledger.entries_related_to(&profit.id)?;
            let mut written = Vec::new();
            let mut next_upline = account.upline_id.clone();

            for generation in 1..=MAX_GENERATIONS {
                let ancestor_id = match next_upline.take() {
                    Some(id) => id,
                    None => break,
                };

                let fail = |written: Vec<LedgerEntry>, source: CoreError| {
                    log::warn!(
                        "commission allocation for {} stopped at generation {}: {}",
                        profit.id,
                        generation,
                        source
                    );
                    CoreError::AllocationFailure {
                        profit_entry_id: profit.id.clone(),
                        partial: generation > 1,
                        failed_at_generation: generation,
                        written,
                        source: Box::new(source),
                    }
                };

                let ancestor = match self.ledger.account(&ancestor_id) {
                    Ok(Some(a)) => a,
                    Ok(None) => break,
                    Err(e) => return Err(fail(written, e)),
                };
                next_upline = ancestor.upline_id.clone();

                let already_paid = existing.iter().any(|e| {
                    e.kind == EntryKind::Commission
                        && e.account_id == ancestor.id
                        && e.generation == Some(generation)
                });
                if already_paid {
                    log::debug!(
                        "generation {} commission on {} already recorded",
                        generation,
                        profit.id
                    );
                    continue;
                }

                let rate = COMMISSION_RATES[generation as usize - 1];
                let entry = LedgerEntry::commission(
                    ancestor.id.clone(),
                    profit.amount * rate,
                    generation,
                    profit.id.clone(),
                    profit.created_at,
                );

                match self.ledger.post(entry) {
                    Ok(entry) => {
                        log::debug!(
                            "generation {} commission {} to {}",
                            generation,
                            entry.amount,
                            entry.account_id
                        );
                        written.push(entry);
                    }
                    Err(e) => return Err(fail(written, e)),
                }
            }

            Ok(written)
        })
    }
}
