use anyhow::Context;
use uuid::Uuid;

use crate::domain::{
    split, CommissionSplit, EntryType, GiftRequest, GiftTransaction, Metadata, NewEntry, UserId,
    Wallet, MAX_REFERENCE_LEN,
};
use crate::storage::Repository;

use super::{AppError, LedgerEngine, WalletStore};

/// Moves coins from a sender to a recipient, minus the platform's commission.
#[derive(Clone)]
pub struct GiftTransferService {
    repo: Repository,
    wallets: WalletStore,
}

impl GiftTransferService {
    pub fn new(repo: Repository, wallets: WalletStore) -> Self {
        Self { repo, wallets }
    }

    /// Send a gift as one atomic unit of three ledger entries:
    /// sender `-price`, recipient `+recipient_amount`, platform `+commission`.
    ///
    /// If any leg fails the transaction is dropped and none of them exist.
    pub async fn send_gift(
        &self,
        sender_user: UserId,
        recipient_user: UserId,
        request: GiftRequest,
    ) -> Result<GiftTransaction, AppError> {
        if sender_user == recipient_user {
            return Err(AppError::SelfGiftNotAllowed);
        }
        if request.price <= 0 {
            return Err(AppError::InvalidAmount(format!(
                "gift price must be positive, got {}",
                request.price
            )));
        }
        let gift_id = request.gift_id.trim();
        if gift_id.is_empty() || gift_id.len() > MAX_REFERENCE_LEN {
            return Err(AppError::InvalidReference(format!(
                "gift id must be 1..={} characters",
                MAX_REFERENCE_LEN
            )));
        }
        if self.wallets.is_platform_user(sender_user) || self.wallets.is_platform_user(recipient_user)
        {
            return Err(AppError::InvalidState(
                "the platform wallet cannot send or receive gifts".to_string(),
            ));
        }

        let sender = self.wallets.get_wallet(sender_user).await?;
        let recipient = self.wallets.get_or_create_wallet(recipient_user).await?;
        let platform = self.wallets.platform_wallet().await?;

        let split = split(request.price, request.rate);
        let transaction_id = request.idempotency_key.unwrap_or_else(Uuid::new_v4);
        let reference = transaction_id.to_string();
        let metadata = Metadata::new()
            .with("gift_id", gift_id)
            .with("transaction_id", reference.as_str())
            .with("price", split.price)
            .with("commission_rate", i64::from(split.rate.percent()));

        let mut tx = self.repo.begin().await?;

        // Claim rows in ascending id order so opposite-direction gifts cannot deadlock
        let mut lock_order = [sender.id, recipient.id, platform.id];
        lock_order.sort();
        for wallet_id in lock_order {
            Repository::lock_wallet(&mut *tx, wallet_id)
                .await?
                .ok_or_else(|| AppError::wallet_not_found(wallet_id))?;
        }

        let sent = LedgerEngine::apply_in_tx(
            &mut *tx,
            NewEntry::new(sender.id, -split.price, EntryType::GiftSent, &reference)
                .with_counterparty(recipient.id)
                .with_metadata(metadata.clone()),
        )
        .await?;
        let received = LedgerEngine::apply_in_tx(
            &mut *tx,
            NewEntry::new(
                recipient.id,
                split.recipient_amount,
                EntryType::GiftReceived,
                &reference,
            )
            .with_counterparty(sender.id)
            .with_metadata(metadata.clone()),
        )
        .await?;
        let collected = LedgerEngine::apply_in_tx(
            &mut *tx,
            NewEntry::new(
                platform.id,
                split.commission,
                EntryType::CommissionCollected,
                &reference,
            )
            .with_counterparty(sender.id)
            .with_metadata(metadata),
        )
        .await?;

        let replayed = sent.replayed;
        if received.replayed != replayed || collected.replayed != replayed {
            // Some legs exist under this key and some do not: refuse rather than complete it
            return Err(AppError::DuplicateReference(format!(
                "gift transaction {} is only partially recorded",
                transaction_id
            )));
        }

        tx.commit().await.context("Failed to commit gift transfer")?;

        let gift = GiftTransaction::from_entries(
            transaction_id,
            gift_id.to_string(),
            split,
            sent.entry,
            received.entry,
            collected.entry,
            replayed,
        );

        if replayed {
            tracing::debug!(gift_transaction_id = %transaction_id, "replayed gift transfer");
        } else {
            tracing::info!(
                gift_transaction_id = %transaction_id,
                gift_id = %gift.gift_id,
                sender_wallet_id = %sender.id,
                recipient_wallet_id = %recipient.id,
                price = gift.price,
                commission = gift.commission,
                "gift transferred"
            );
            self.record_stats(&sender, &recipient, &split).await;
        }

        Ok(gift)
    }

    /// Best effort: the counters are a projection and reconciliation repairs any miss.
    async fn record_stats(&self, sender: &Wallet, recipient: &Wallet, split: &CommissionSplit) {
        if let Err(e) = self
            .repo
            .bump_gift_stats(sender.id, recipient.id, split.price, split.recipient_amount)
            .await
        {
            tracing::warn!(
                error = %e,
                sender_wallet_id = %sender.id,
                recipient_wallet_id = %recipient.id,
                "failed to update gift stats"
            );
        }
    }
}
