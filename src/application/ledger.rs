//! The ledger engine: the only code path that changes a wallet balance.
//!
//! Every change is one `TransactionEntry` written in the same SQLite transaction
//! as the balance update. The wallet row is claimed with a write before anything
//! is read, so concurrent writers to the same wallet queue up behind each other
//! and every entry's `balance_before` is the previous entry's `balance_after`.

use anyhow::Context;
use sqlx::sqlite::SqliteConnection;

use crate::domain::{
    verify_chain, AppliedEntry, ChainReport, EntryPage, IntegrityReport, NewEntry,
    TransactionEntry, WalletId, MAX_REFERENCE_LEN,
};
use crate::storage::Repository;

use super::AppError;

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 500;

#[derive(Clone)]
pub struct LedgerEngine {
    repo: Repository,
}

impl LedgerEngine {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Apply one entry as its own atomic unit.
    ///
    /// A reference id already recorded on the wallet returns the stored entry
    /// with `replayed: true` and changes nothing.
    pub async fn apply_entry(&self, request: NewEntry) -> Result<AppliedEntry, AppError> {
        let mut tx = self.repo.begin().await?;
        let applied = Self::apply_in_tx(&mut *tx, request).await?;
        tx.commit().await.context("Failed to commit ledger entry")?;
        Ok(applied)
    }

    /// Apply an entry inside a caller-owned transaction.
    ///
    /// Nothing is visible until the caller commits; if the caller drops the
    /// transaction instead, the balance change and the entry vanish together.
    pub async fn apply_in_tx(
        conn: &mut SqliteConnection,
        request: NewEntry,
    ) -> Result<AppliedEntry, AppError> {
        if !request.has_valid_reference() {
            return Err(AppError::InvalidReference(format!(
                "reference id must be 1..={} characters",
                MAX_REFERENCE_LEN
            )));
        }
        request.metadata.validate()?;

        let wallet = Repository::lock_wallet(conn, request.wallet_id)
            .await?
            .ok_or_else(|| AppError::wallet_not_found(request.wallet_id))?;

        if let Some(existing) =
            Repository::find_entry_by_reference(conn, wallet.id, &request.reference_id).await?
        {
            if !request.matches(&existing) {
                return Err(AppError::DuplicateReference(format!(
                    "reference '{}' on wallet {} already records a different entry",
                    request.reference_id, wallet.id
                )));
            }
            tracing::debug!(
                wallet_id = %wallet.id,
                reference_id = %existing.reference_id,
                sequence = existing.sequence,
                "replayed ledger entry"
            );
            return Ok(AppliedEntry {
                entry: existing,
                replayed: true,
            });
        }

        if wallet.is_disabled() {
            return Err(AppError::InvalidState(format!("wallet {} is disabled", wallet.id)));
        }

        let balance_after = wallet.balance_after(request.amount).ok_or_else(|| {
            AppError::InvalidAmount(format!("{} would overflow the balance", request.amount))
        })?;
        if balance_after < 0 {
            tracing::warn!(
                wallet_id = %wallet.id,
                balance = wallet.balance,
                amount = request.amount,
                entry_type = %request.entry_type,
                "rejected entry: insufficient funds"
            );
            return Err(AppError::InsufficientFunds {
                wallet_id: wallet.id,
                balance: wallet.balance,
                required: request.amount.saturating_neg(),
            });
        }

        let sequence = Repository::last_sequence(conn, wallet.id).await? + 1;
        let entry = request.into_entry(sequence, wallet.balance);

        Repository::update_balance(conn, wallet.id, entry.balance_after, entry.created_at).await?;
        Repository::insert_entry(conn, &entry).await?;

        tracing::debug!(
            wallet_id = %entry.wallet_id,
            sequence = entry.sequence,
            entry_type = %entry.entry_type,
            amount = entry.amount,
            balance_after = entry.balance_after,
            "applied ledger entry"
        );

        Ok(AppliedEntry {
            entry,
            replayed: false,
        })
    }

    /// Newest-first page of a wallet's history.
    ///
    /// `cursor` is the `next_cursor` of the previous page. Entries are immutable and
    /// new ones only get higher sequence numbers, so a cursor stays valid forever.
    pub async fn list_transactions(
        &self,
        wallet_id: WalletId,
        cursor: Option<i64>,
        limit: usize,
    ) -> Result<EntryPage, AppError> {
        if self.repo.get_wallet(wallet_id).await?.is_none() {
            return Err(AppError::wallet_not_found(wallet_id));
        }

        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let mut entries = self
            .repo
            .list_entries_page(wallet_id, cursor, limit as i64 + 1)
            .await?;

        let next_cursor = if entries.len() > limit {
            entries.truncate(limit);
            entries.last().map(|e| e.sequence)
        } else {
            None
        };

        Ok(EntryPage {
            entries,
            next_cursor,
        })
    }

    /// Full history of a wallet in chain order.
    pub async fn wallet_history(&self, wallet_id: WalletId) -> Result<Vec<TransactionEntry>, AppError> {
        let (_, entries) = self
            .repo
            .wallet_snapshot(wallet_id)
            .await?
            .ok_or_else(|| AppError::wallet_not_found(wallet_id))?;
        Ok(entries)
    }

    /// Replay one wallet's chain against its stored balance.
    pub async fn verify_wallet(&self, wallet_id: WalletId) -> Result<ChainReport, AppError> {
        let (wallet, entries) = self
            .repo
            .wallet_snapshot(wallet_id)
            .await?
            .ok_or_else(|| AppError::wallet_not_found(wallet_id))?;
        Ok(verify_chain(wallet.id, wallet.balance, &entries))
    }

    /// Replay every wallet. Each wallet is read from its own snapshot.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let wallets = self.repo.list_wallets().await?;
        let mut reports = Vec::with_capacity(wallets.len());
        for wallet in wallets {
            reports.push(self.verify_wallet(wallet.id).await?);
        }

        let report = IntegrityReport::from_reports(reports);
        if !report.is_healthy() {
            tracing::error!(
                invalid_wallets = report.invalid_wallets.len(),
                total_coins = report.total_coins,
                net_issued = report.net_issued,
                "ledger integrity check failed"
            );
        }
        Ok(report)
    }
}
