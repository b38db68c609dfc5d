//! Account records

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tier::{Tier, TierStatus};

pub type AccountId = String;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: AccountId,
    /// Cached running sum of the account's ledger entries
    pub balance: Decimal,
    pub tier: Tier,
    pub frozen: bool,
    /// Referrer, fixed at creation
    pub upline_id: Option<AccountId>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(upline_id: Option<AccountId>, created_at: DateTime<Utc>) -> Self {
        Account {
            id: Uuid::new_v4().to_string(),
            balance: Decimal::ZERO,
            tier: Tier::V0,
            frozen: false,
            upline_id,
            created_at,
        }
    }

    pub fn status(&self) -> TierStatus {
        TierStatus {
            tier: self.tier,
            frozen: self.frozen,
        }
    }
}
