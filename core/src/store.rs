//! Account and ledger store abstractions with in-memory backends

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

use crate::account::{Account, AccountId};
use crate::error::{CoreError, Result};
use crate::ledger::{EntryKind, LedgerEntry};

pub trait AccountStore: Send + Sync {
    fn get_account(&self, id: &str) -> Result<Option<Account>>;

    fn save_account(&self, account: &Account) -> Result<()>;

    /// Direct (generation 1) referrals of `id`
    fn downline(&self, id: &str) -> Result<Vec<Account>>;

    fn all_accounts(&self) -> Result<Vec<Account>>;
}

/// Append-only entry log
pub trait LedgerStore: Send + Sync {
    fn append_entry(&self, entry: &LedgerEntry) -> Result<()>;

    fn entries_for(&self, account_id: &str) -> Result<Vec<LedgerEntry>>;

    fn entries_related_to(&self, entry_id: &str) -> Result<Vec<LedgerEntry>>;

    fn get_entry(&self, entry_id: &str) -> Result<Option<LedgerEntry>>;

    fn all_entries(&self) -> Result<Vec<LedgerEntry>>;
}

#[derive(Debug, Default)]
struct AccountTable {
    accounts: HashMap<AccountId, Account>,
    children: HashMap<AccountId, Vec<AccountId>>,
}

#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    inner: RwLock<AccountTable>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccountStore for MemoryAccountStore {
    fn get_account(&self, id: &str) -> Result<Option<Account>> {
        Ok(self.inner.read().accounts.get(id).cloned())
    }

    fn save_account(&self, account: &Account) -> Result<()> {
        let mut table = self.inner.write();
        let known_upline = table.accounts.get(&account.id).map(|a| a.upline_id.clone());

        match known_upline {
            Some(upline) if upline != account.upline_id => {
                return Err(CoreError::StorageError(format!(
                    "upline of {} cannot be reassigned",
                    account.id
                )));
            }
            Some(_) => {}
            None => {
                if let Some(upline) = &account.upline_id {
                    table
                        .children
                        .entry(upline.clone())
                        .or_default()
                        .push(account.id.clone());
                }
            }
        }

        table.accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    fn downline(&self, id: &str) -> Result<Vec<Account>> {
        let table = self.inner.read();
        let children = match table.children.get(id) {
            Some(c) => c,
            None => return Ok(Vec::new()),
        };
        Ok(children
            .iter()
            .filter_map(|child| table.accounts.get(child).cloned())
            .collect())
    }

    fn all_accounts(&self) -> Result<Vec<Account>> {
        let mut all: Vec<Account> = self.inner.read().accounts.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(all)
    }
}

#[derive(Debug, Default)]
struct EntryLog {
    entries: Vec<LedgerEntry>,
    by_id: HashMap<String, usize>,
    by_account: HashMap<AccountId, Vec<usize>>,
    by_related: HashMap<String, Vec<usize>>,
    // (related entry, recipient, generation)
    commission_keys: HashSet<(String, AccountId, u8)>,
}

#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    inner: RwLock<EntryLog>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn append_entry(&self, entry: &LedgerEntry) -> Result<()> {
        let mut log = self.inner.write();

        if log.by_id.contains_key(&entry.id) {
            return Err(CoreError::InvalidEntry(format!(
                "entry {} already recorded",
                entry.id
            )));
        }

        if entry.kind == EntryKind::Commission {
            let key = match (&entry.related_entry_id, entry.generation) {
                (Some(related), Some(generation)) => {
                    (related.clone(), entry.account_id.clone(), generation)
                }
                _ => {
                    return Err(CoreError::InvalidEntry(
                        "commission without related entry or generation".to_string(),
                    ))
                }
            };
            if log.commission_keys.contains(&key) {
                return Err(CoreError::DuplicateCommission {
                    related_entry_id: key.0,
                    account_id: key.1,
                    generation: key.2,
                });
            }
            log.commission_keys.insert(key);
        }

        let idx = log.entries.len();
        log.by_id.insert(entry.id.clone(), idx);
        log.by_account
            .entry(entry.account_id.clone())
            .or_default()
            .push(idx);
        if let Some(related) = &entry.related_entry_id {
            log.by_related.entry(related.clone()).or_default().push(idx);
        }
        log.entries.push(entry.clone());
        Ok(())
    }

    fn entries_for(&self, account_id: &str) -> Result<Vec<LedgerEntry>> {
        let log = self.inner.read();
        Ok(log
            .by_account
            .get(account_id)
            .map(|idxs| idxs.iter().map(|i| log.entries[*i].clone()).collect())
            .unwrap_or_default())
    }

    fn entries_related_to(&self, entry_id: &str) -> Result<Vec<LedgerEntry>> {
        let log = self.inner.read();
        Ok(log
            .by_related
            .get(entry_id)
            .map(|idxs| idxs.iter().map(|i| log.entries[*i].clone()).collect())
            .unwrap_or_default())
    }

    fn get_entry(&self, entry_id: &str) -> Result<Option<LedgerEntry>> {
        let log = self.inner.read();
        Ok(log.by_id.get(entry_id).map(|i| log.entries[*i].clone()))
    }

    fn all_entries(&self) -> Result<Vec<LedgerEntry>> {
        Ok(self.inner.read().entries.clone())
    }
}
