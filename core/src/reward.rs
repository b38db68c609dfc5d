//! Daily and lucky reward claims
//!
//! Each reward kind can be claimed once per claim window. The daily reward
//! is a fixed amount; the lucky reward is drawn at claim time and may be zero,
//! in which case the claim is recorded but nothing is posted.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::account::AccountId;
use crate::constants::{DAILY_REWARD, LUCKY_REWARD_MAX, REWARD_CLAIM_HOURS};
use crate::error::{ClaimBlocked, Result};
use crate::ledger::{EntryId, EntryKind, Ledger, LedgerEntry};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RewardKind {
    Daily,
    Lucky,
}

impl fmt::Display for RewardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RewardKind::Daily => write!(f, "daily"),
            RewardKind::Lucky => write!(f, "lucky"),
        }
    }
}

impl FromStr for RewardKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(RewardKind::Daily),
            "lucky" => Ok(RewardKind::Lucky),
            other => Err(format!("unknown reward: {}", other)),
        }
    }
}

/// Most recent claim of one reward kind by one account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RewardClaim {
    pub account_id: AccountId,
    pub kind: RewardKind,
    pub amount: Decimal,
    pub claimed_at: DateTime<Utc>,
    /// Ledger entry credited, `None` for an empty lucky draw
    pub entry_id: Option<EntryId>,
}

impl RewardClaim {
    pub fn next_claim_at(&self) -> DateTime<Utc> {
        self.claimed_at + claim_window()
    }
}

pub fn claim_window() -> Duration {
    Duration::hours(REWARD_CLAIM_HOURS)
}

pub struct RewardDesk {
    ledger: Arc<Ledger>,
    claims: DashMap<(AccountId, RewardKind), RewardClaim>,
    rng: Mutex<StdRng>,
}

impl RewardDesk {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self::with_rng(ledger, StdRng::from_os_rng())
    }

    /// Reproducible lucky draws
    pub fn with_seed(ledger: Arc<Ledger>, seed: u64) -> Self {
        Self::with_rng(ledger, StdRng::seed_from_u64(seed))
    }

    fn with_rng(ledger: Arc<Ledger>, rng: StdRng) -> Self {
        Self {
            ledger,
            claims: DashMap::new(),
            rng: Mutex::new(rng),
        }
    }

    pub fn claim(&self, account_id: &str, kind: RewardKind, now: DateTime<Utc>) -> Result<RewardClaim> {
        self.ledger.transaction(account_id, || -> Result<RewardClaim> {
            let status = self.ledger.reclassify(account_id, now)?;
            if status.frozen {
                return Err(ClaimBlocked::Frozen.into());
            }

            if let Some(retry_at) = self.next_claim_at(account_id, kind) {
                if now < retry_at {
                    return Err(ClaimBlocked::AlreadyClaimed { kind, retry_at }.into());
                }
            }

            let amount = match kind {
                RewardKind::Daily => DAILY_REWARD,
                RewardKind::Lucky => Decimal::from(self.rng.lock().random_range(0..=LUCKY_REWARD_MAX)),
            };

            let entry_id = if amount > Decimal::ZERO {
                let entry = self.ledger.post(LedgerEntry::new(
                    account_id.to_string(),
                    EntryKind::Reward,
                    amount,
                    now,
                ))?;
                Some(entry.id)
            } else {
                None
            };

            let claim = RewardClaim {
                account_id: account_id.to_string(),
                kind,
                amount,
                claimed_at: now,
                entry_id,
            };
            self.claims.insert((claim.account_id.clone(), kind), claim.clone());

            log::info!("{} reward of {} claimed by {}", kind, amount, account_id);
            Ok(claim)
        })
    }

    pub fn claim_daily_reward(&self, account_id: &str, now: DateTime<Utc>) -> Result<RewardClaim> {
        self.claim(account_id, RewardKind::Daily, now)
    }

    /// When the account may claim `kind` again, `None` if it never has
    pub fn next_claim_at(&self, account_id: &str, kind: RewardKind) -> Option<DateTime<Utc>> {
        self.claims
            .get(&(account_id.to_string(), kind))
            .map(|c| c.next_claim_at())
    }

    pub fn claims(&self) -> Vec<RewardClaim> {
        let mut all: Vec<_> = self.claims.iter().map(|c| c.value().clone()).collect();
        all.sort_by(|a, b| (&a.account_id, a.kind).cmp(&(&b.account_id, b.kind)));
        all
    }

    pub fn restore(&self, claims: impl IntoIterator<Item = RewardClaim>) {
        self.claims.clear();
        for claim in claims {
            self.claims.insert((claim.account_id.clone(), claim.kind), claim);
        }
    }
}
