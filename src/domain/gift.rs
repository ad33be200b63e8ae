use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Coins, CommissionRate, CommissionSplit, TransactionEntry, WalletId};

pub type GiftTransactionId = Uuid;

/// What is being gifted and at which price. The rate is chosen by the caller's
/// commission policy; the ledger never assumes one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftRequest {
    pub gift_id: String,
    pub price: Coins,
    pub rate: CommissionRate,
    /// Retrying with the same key returns the original transfer
    pub idempotency_key: Option<GiftTransactionId>,
}

impl GiftRequest {
    pub fn new(gift_id: impl Into<String>, price: Coins, rate: CommissionRate) -> Self {
        Self {
            gift_id: gift_id.into(),
            price,
            rate,
            idempotency_key: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: GiftTransactionId) -> Self {
        self.idempotency_key = Some(key);
        self
    }
}

/// A committed two-sided gift: three ledger entries sharing one transaction id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GiftTransaction {
    pub id: GiftTransactionId,
    pub gift_id: String,
    pub sender_wallet_id: WalletId,
    pub recipient_wallet_id: WalletId,
    pub platform_wallet_id: WalletId,
    pub price: Coins,
    pub rate: CommissionRate,
    pub commission: Coins,
    pub recipient_received: Coins,
    pub sender_balance_before: Coins,
    pub sender_balance_after: Coins,
    pub recipient_balance_before: Coins,
    pub recipient_balance_after: Coins,
    pub sender_entry: TransactionEntry,
    pub recipient_entry: TransactionEntry,
    pub commission_entry: TransactionEntry,
    /// True when this result was returned for a retried idempotency key
    pub replayed: bool,
    pub created_at: DateTime<Utc>,
}

impl GiftTransaction {
    pub fn from_entries(
        id: GiftTransactionId,
        gift_id: String,
        split: CommissionSplit,
        sender_entry: TransactionEntry,
        recipient_entry: TransactionEntry,
        commission_entry: TransactionEntry,
        replayed: bool,
    ) -> Self {
        Self {
            id,
            gift_id,
            sender_wallet_id: sender_entry.wallet_id,
            recipient_wallet_id: recipient_entry.wallet_id,
            platform_wallet_id: commission_entry.wallet_id,
            price: split.price,
            rate: split.rate,
            commission: split.commission,
            recipient_received: split.recipient_amount,
            sender_balance_before: sender_entry.balance_before,
            sender_balance_after: sender_entry.balance_after,
            recipient_balance_before: recipient_entry.balance_before,
            recipient_balance_after: recipient_entry.balance_after,
            created_at: sender_entry.created_at,
            sender_entry,
            recipient_entry,
            commission_entry,
            replayed,
        }
    }

    /// `price == recipient_received + commission`, and the entries agree with it.
    pub fn is_balanced(&self) -> bool {
        self.price == self.recipient_received + self.commission
            && -self.sender_entry.amount == self.price
            && self.recipient_entry.amount == self.recipient_received
            && self.commission_entry.amount == self.commission
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EntryType, NewEntry, split};

    #[test]
    fn test_from_entries_is_balanced() {
        let (sender, recipient, platform) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let id = Uuid::new_v4();
        let s = split(100, CommissionRate::default());

        let sent = NewEntry::new(sender, -100, EntryType::GiftSent, id.to_string()).into_entry(2, 100);
        let received =
            NewEntry::new(recipient, 70, EntryType::GiftReceived, id.to_string()).into_entry(1, 0);
        let commission = NewEntry::new(platform, 30, EntryType::CommissionCollected, id.to_string())
            .into_entry(1, 0);

        let gift = GiftTransaction::from_entries(id, "rose".into(), s, sent, received, commission, false);

        assert!(gift.is_balanced());
        assert_eq!(gift.sender_balance_after, 0);
        assert_eq!(gift.recipient_balance_after, 70);
        assert_eq!(gift.platform_wallet_id, platform);
    }
}
