//! Profit run scheduling
//!
//! Each account gets a fixed number of profit runs per cooldown window,
//! depending on its tier. A run is one transaction per account: reclassify,
//! check the window, post the profit entry, bump the counter, pay commissions.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::account::AccountId;
use crate::commission::CommissionAllocator;
use crate::error::{Result, RunBlocked};
use crate::ledger::{EntryKind, Ledger, LedgerEntry};
use crate::tier::Tier;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunWindow {
    pub window_start_at: DateTime<Utc>,
    pub tier_at_window_start: Tier,
    pub runs_used: u32,
    pub runs_allowed: u32,
}

impl RunWindow {
    pub fn open(tier: Tier, runs_allowed: u32, now: DateTime<Utc>) -> Self {
        Self {
            window_start_at: now,
            tier_at_window_start: tier,
            runs_used: 0,
            runs_allowed,
        }
    }

    pub fn ends_at(&self, cooldown: Duration) -> DateTime<Utc> {
        self.window_start_at + cooldown
    }

    pub fn is_active(&self, now: DateTime<Utc>, cooldown: Duration) -> bool {
        now < self.ends_at(cooldown)
    }

    pub fn is_exhausted(&self) -> bool {
        self.runs_used >= self.runs_allowed
    }

    pub fn runs_remaining(&self) -> u32 {
        self.runs_allowed.saturating_sub(self.runs_used)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowState {
    NoWindow,
    WindowOpen,
    WindowExhausted,
}

/// Result of a successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub profit: LedgerEntry,
    pub commissions: Vec<LedgerEntry>,
    pub runs_remaining: u32,
}

/// Read-only view of an account's run allowance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub state: WindowState,
    pub runs_used: u32,
    pub runs_allowed: u32,
    pub resets_at: Option<DateTime<Utc>>,
    /// Elapsed share of the current window, 0..=100
    pub progress_pct: u32,
}

pub struct RunScheduler {
    ledger: Arc<Ledger>,
    allocator: Arc<CommissionAllocator>,
    windows: DashMap<AccountId, RunWindow>,
    cooldown: Duration,
}

impl RunScheduler {
    pub fn new(ledger: Arc<Ledger>, allocator: Arc<CommissionAllocator>) -> Self {
        let cooldown = ledger.rules().cooldown();
        Self {
            ledger,
            allocator,
            windows: DashMap::new(),
            cooldown,
        }
    }

    /// Consume one run and post its profit.
    ///
    /// Runs inside the account's transaction lock, so a withdrawal cannot
    /// change the balance between reading it and posting the profit. If
    /// commission allocation fails after the profit entry is written, the run
    /// still counts and the allocation error is returned.
    pub fn attempt_run(&self, account_id: &str, now: DateTime<Utc>) -> Result<RunOutcome> {
        self.ledger.transaction(account_id, || -> Result<RunOutcome> {
            let status = self.ledger.reclassify(account_id, now)?;
            if status.frozen {
                log::warn!("run refused for {}: frozen", account_id);
                return Err(RunBlocked::Frozen.into());
            }

            let (rate, limit) = match (status.tier.daily_rate(), status.tier.run_limit()) {
                (Some(rate), Some(limit)) if status.tier.can_run() => (rate, limit),
                _ => {
                    log::warn!("run refused for {}: tier {}", account_id, status.tier);
                    return Err(RunBlocked::Ineligible { tier: status.tier }.into());
                }
            };

            let mut window = match self.windows.get(account_id).map(|w| w.clone()) {
                Some(w) if w.is_active(now, self.cooldown) && w.tier_at_window_start == status.tier => w,
                previous => {
                    log::debug!(
                        "opening run window for {} at {} ({} runs, previous: {:?})",
                        account_id,
                        status.tier,
                        limit,
                        previous.map(|w| w.tier_at_window_start)
                    );
                    RunWindow::open(status.tier, limit, now)
                }
            };

            if window.is_exhausted() && window.is_active(now, self.cooldown) {
                let retry_at = window.ends_at(self.cooldown);
                log::warn!("run refused for {}: cooldown until {}", account_id, retry_at);
                return Err(RunBlocked::Cooldown { retry_at }.into());
            }

            let account = self.ledger.require_account(account_id)?;
            let amount = account.balance * rate / Decimal::from(window.runs_allowed);
            let profit = self.ledger.post(LedgerEntry::new(
                account.id.clone(),
                EntryKind::Profit,
                amount,
                now,
            ))?;

            window.runs_used += 1;
            let runs_remaining = window.runs_remaining();
            self.windows.insert(account.id.clone(), window);

            log::info!(
                "run {} for {}: profit {} ({} left in window)",
                profit.id,
                account.id,
                profit.amount,
                runs_remaining
            );

            let commissions = self.allocator.allocate(&profit, &account)?;

            Ok(RunOutcome {
                profit,
                commissions,
                runs_remaining,
            })
        })
    }

    pub fn run_status(&self, account_id: &str, now: DateTime<Utc>) -> RunStatus {
        let window = self
            .windows
            .get(account_id)
            .map(|w| w.clone())
            .filter(|w| w.is_active(now, self.cooldown));

        match window {
            None => RunStatus {
                state: WindowState::NoWindow,
                runs_used: 0,
                runs_allowed: 0,
                resets_at: None,
                progress_pct: 0,
            },
            Some(w) => {
                let elapsed = (now - w.window_start_at).num_seconds().max(0);
                let total = self.cooldown.num_seconds().max(1);
                let progress_pct = (Decimal::from(elapsed) * Decimal::from(100) / Decimal::from(total))
                    .floor()
                    .to_u32()
                    .unwrap_or(0)
                    .min(100);

                RunStatus {
                    state: if w.is_exhausted() {
                        WindowState::WindowExhausted
                    } else {
                        WindowState::WindowOpen
                    },
                    runs_used: w.runs_used,
                    runs_allowed: w.runs_allowed,
                    resets_at: Some(w.ends_at(self.cooldown)),
                    progress_pct,
                }
            }
        }
    }

    pub fn windows(&self) -> Vec<(AccountId, RunWindow)> {
        let mut all: Vec<_> = self
            .windows
            .iter()
            .map(|w| (w.key().clone(), w.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn restore_windows(&self, windows: impl IntoIterator<Item = (AccountId, RunWindow)>) {
        self.windows.clear();
        for (account_id, window) in windows {
            self.windows.insert(account_id, window);
        }
    }
}
