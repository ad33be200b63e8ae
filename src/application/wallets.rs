use chrono::Utc;

use crate::domain::{Coins, UserId, Wallet, WalletId};
use crate::storage::Repository;

use super::AppError;

/// Wallet identity and lifecycle. Balances are read here but only the ledger
/// engine writes them.
#[derive(Clone)]
pub struct WalletStore {
    repo: Repository,
    platform_user_id: UserId,
}

impl WalletStore {
    pub fn new(repo: Repository, platform_user_id: UserId) -> Self {
        Self {
            repo,
            platform_user_id,
        }
    }

    /// Return the user's wallet, creating an empty one on first access.
    ///
    /// Safe under concurrent first access: the unique `user_id` constraint lets
    /// exactly one insert win and every caller then reads that row.
    pub async fn get_or_create_wallet(&self, user_id: UserId) -> Result<Wallet, AppError> {
        if let Some(wallet) = self.repo.get_wallet_by_user(user_id).await? {
            return Ok(wallet);
        }

        let wallet = Wallet::new(user_id);
        if self.repo.insert_wallet_if_absent(&wallet).await? {
            tracing::info!(wallet_id = %wallet.id, user_id = %user_id, "created wallet");
            return Ok(wallet);
        }

        self.repo
            .get_wallet_by_user(user_id)
            .await?
            .ok_or_else(|| {
                AppError::Database(anyhow::anyhow!(
                    "wallet for user {} missing after insert conflict",
                    user_id
                ))
            })
    }

    /// Get the wallet owned by a user.
    pub async fn get_wallet(&self, user_id: UserId) -> Result<Wallet, AppError> {
        self.repo
            .get_wallet_by_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("wallet for user {}", user_id)))
    }

    pub async fn get_wallet_by_id(&self, wallet_id: WalletId) -> Result<Wallet, AppError> {
        self.repo
            .get_wallet(wallet_id)
            .await?
            .ok_or_else(|| AppError::wallet_not_found(wallet_id))
    }

    /// Current balance, for display only. Never use it to authorize a mutation:
    /// it may be stale by the time the mutation runs.
    pub async fn get_balance(&self, wallet_id: WalletId) -> Result<Coins, AppError> {
        Ok(self.get_wallet_by_id(wallet_id).await?.balance)
    }

    pub async fn list_wallets(&self) -> Result<Vec<Wallet>, AppError> {
        Ok(self.repo.list_wallets().await?)
    }

    /// The revenue wallet that collects gift commissions.
    pub async fn platform_wallet(&self) -> Result<Wallet, AppError> {
        self.get_or_create_wallet(self.platform_user_id).await
    }

    pub fn is_platform_user(&self, user_id: UserId) -> bool {
        user_id == self.platform_user_id
    }

    /// Soft-disable a wallet: it keeps its balance and history but rejects new entries.
    pub async fn disable_wallet(&self, wallet_id: WalletId) -> Result<Wallet, AppError> {
        let wallet = self.get_wallet_by_id(wallet_id).await?;
        if self.is_platform_user(wallet.user_id) {
            return Err(AppError::InvalidState(
                "the platform wallet cannot be disabled".to_string(),
            ));
        }
        if wallet.is_disabled() {
            return Ok(wallet);
        }

        self.repo
            .set_wallet_disabled(wallet_id, Some(Utc::now()))
            .await?;
        tracing::info!(wallet_id = %wallet_id, "disabled wallet");
        self.get_wallet_by_id(wallet_id).await
    }

    pub async fn enable_wallet(&self, wallet_id: WalletId) -> Result<Wallet, AppError> {
        let wallet = self.get_wallet_by_id(wallet_id).await?;
        if !wallet.is_disabled() {
            return Ok(wallet);
        }

        self.repo.set_wallet_disabled(wallet_id, None).await?;
        tracing::info!(wallet_id = %wallet_id, "enabled wallet");
        self.get_wallet_by_id(wallet_id).await
    }
}
