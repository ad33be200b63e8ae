use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Coins;

pub type WalletId = Uuid;

/// Authenticated user id supplied by the identity provider.
pub type UserId = Uuid;

/// A per-user coin wallet. The balance is only ever changed by the ledger engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub user_id: UserId,
    pub balance: Coins,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-disable marker. Wallets are never deleted.
    pub disabled_at: Option<DateTime<Utc>>,
}

impl Wallet {
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            balance: 0,
            created_at: now,
            updated_at: now,
            disabled_at: None,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled_at.is_some()
    }

    /// Balance after applying `amount`, or `None` on overflow.
    pub fn balance_after(&self, amount: Coins) -> Option<Coins> {
        self.balance.checked_add(amount)
    }
}

/// Eventually-consistent gift counters for a wallet.
/// Derived from the ledger; never used to authorize a mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletStats {
    pub wallet_id: WalletId,
    pub gifts_sent: i64,
    pub gifts_received: i64,
    pub coins_spent: Coins,
    pub coins_earned: Coins,
}

impl WalletStats {
    pub fn empty(wallet_id: WalletId) -> Self {
        Self {
            wallet_id,
            ..Default::default()
        }
    }
}
