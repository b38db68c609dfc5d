//! Core error types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::ledger::LedgerEntry;
use crate::reward::RewardKind;
use crate::tier::Tier;

/// Why a profit run was refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunBlocked {
    #[error("account is frozen pending review")]
    Frozen,

    #[error("tier {tier} is not eligible for profit runs")]
    Ineligible { tier: Tier },

    #[error("run allowance used up, retry at {retry_at}")]
    Cooldown { retry_at: DateTime<Utc> },
}

/// Why a withdrawal request was refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WithdrawalBlocked {
    #[error("account is frozen pending review")]
    Frozen,

    #[error("withdrawals locked until {until}")]
    Locked { until: DateTime<Utc> },

    #[error("invalid wallet address: {0}")]
    InvalidAddress(String),

    #[error("amount {amount} is below the minimum of {minimum}")]
    BelowMinimum { amount: Decimal, minimum: Decimal },

    #[error("amount {amount} exceeds the {tier} limit of {maximum}")]
    AboveMaximum {
        amount: Decimal,
        maximum: Decimal,
        tier: Tier,
    },
}

/// Why a reward claim was refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClaimBlocked {
    #[error("account is frozen pending review")]
    Frozen,

    #[error("{kind} reward already claimed, next claim at {retry_at}")]
    AlreadyClaimed {
        kind: RewardKind,
        retry_at: DateTime<Utc>,
    },
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Run blocked: {0}")]
    RunBlocked(#[from] RunBlocked),

    #[error("Withdrawal blocked: {0}")]
    WithdrawalBlocked(#[from] WithdrawalBlocked),

    #[error(
        "Commission allocation for {profit_entry_id} failed at generation {failed_at_generation} (partial: {partial}): {source}"
    )]
    AllocationFailure {
        profit_entry_id: String,
        partial: bool,
        failed_at_generation: u8,
        /// Commission entries committed before the failure
        written: Vec<LedgerEntry>,
        #[source]
        source: Box<CoreError>,
    },

    #[error("Invalid tier transition: {from} -> {to}")]
    InvalidTierTransition { from: Tier, to: Tier },

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Upline not found: {0}")]
    UplineNotFound(String),

    #[error("Account already exists: {0}")]
    AccountExists(String),

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        requested: Decimal,
        available: Decimal,
    },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid ledger entry: {0}")]
    InvalidEntry(String),

    #[error("Commission already recorded for {related_entry_id} at generation {generation} on {account_id}")]
    DuplicateCommission {
        related_entry_id: String,
        account_id: String,
        generation: u8,
    },

    #[error("Claim blocked: {0}")]
    ClaimBlocked(#[from] ClaimBlocked),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Storage error: {0}")]
    StorageError(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
