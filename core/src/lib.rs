//! Referral Earning Core Library
//!
//! Ledger, tier engine, commission allocation, profit runs, withdrawals and
//! reward claims for the referral earning platform

pub mod account;
pub mod clock;
pub mod commission;
pub mod config;
pub mod constants;
pub mod error;
pub mod ledger;
pub mod locks;
pub mod network;
pub mod platform;
pub mod reward;
pub mod scheduler;
pub mod store;
pub mod tier;
pub mod withdrawal;

// Re-export main types
pub use account::{Account, AccountId};
pub use clock::{Clock, ManualClock, SystemClock};
pub use commission::{commission_rate, CommissionAllocator};
pub use config::Rules;
pub use error::{ClaimBlocked, CoreError, Result, RunBlocked, WithdrawalBlocked};
pub use ledger::{EntryId, EntryKind, Ledger, LedgerEntry, Reconciliation};
pub use network::{GenerationStats, NetworkReport};
pub use platform::{Platform, PlatformSnapshot};
pub use reward::{RewardClaim, RewardDesk, RewardKind};
pub use scheduler::{RunOutcome, RunScheduler, RunStatus, RunWindow, WindowState};
pub use store::{AccountStore, LedgerStore, MemoryAccountStore, MemoryLedgerStore};
pub use tier::{
    compute_tier, level_progress, LevelProgress, NetworkSnapshot, Tier, TierBenefits,
    TierRequirement, TierStatus,
};
pub use withdrawal::{WithdrawalDesk, WithdrawalRecord, WithdrawalStatus};
