use crate::config::CoinConfig;
use crate::domain::{
    project_stats, AppliedEntry, ChainReport, Coins, EntryPage, EntryType, GiftRequest,
    GiftTransaction, IntegrityReport, Metadata, NewEntry, NewPurchaseRequest, PurchaseRequest,
    PurchaseRequestId, PurchaseStatus, UserId, Wallet, WalletId, WalletStats,
};
use crate::storage::Repository;

use super::{
    AppError, GiftTransferService, LedgerEngine, PurchaseRequestWorkflow, WalletStore,
};

/// Application service exposing the wallet economy to the surrounding application.
/// This is the primary interface for any client (CLI, API, workers).
pub struct CoinService {
    config: CoinConfig,
    repo: Repository,
    wallets: WalletStore,
    ledger: LedgerEngine,
    gifts: GiftTransferService,
    purchases: PurchaseRequestWorkflow,
}

/// Outcome of a stats reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub wallets_checked: usize,
    pub wallets_corrected: usize,
}

impl CoinService {
    /// Wire the components around an explicitly constructed store handle.
    pub fn new(repo: Repository, config: CoinConfig) -> Self {
        let wallets = WalletStore::new(repo.clone(), config.platform_user_id);
        let ledger = LedgerEngine::new(repo.clone());
        let gifts = GiftTransferService::new(repo.clone(), wallets.clone());
        let purchases = PurchaseRequestWorkflow::new(repo.clone(), wallets.clone());
        Self {
            config,
            repo,
            wallets,
            ledger,
            gifts,
            purchases,
        }
    }

    /// Create (or open) the database, apply the schema and make sure the
    /// platform wallet exists.
    pub async fn init(config: CoinConfig) -> Result<Self, AppError> {
        let repo = Repository::init(&config).await?;
        let service = Self::new(repo, config);
        service.wallets.platform_wallet().await?;
        Ok(service)
    }

    /// Connect to an existing database.
    pub async fn connect(config: CoinConfig) -> Result<Self, AppError> {
        let repo = Repository::connect(&config, false).await?;
        Ok(Self::new(repo, config))
    }

    pub fn config(&self) -> &CoinConfig {
        &self.config
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn ledger(&self) -> &LedgerEngine {
        &self.ledger
    }

    // ========================
    // Wallet operations
    // ========================

    /// Create the user's wallet, or return it if it already exists.
    pub async fn create_wallet(&self, user_id: UserId) -> Result<Wallet, AppError> {
        self.wallets.get_or_create_wallet(user_id).await
    }

    pub async fn get_wallet(&self, user_id: UserId) -> Result<Wallet, AppError> {
        self.wallets.get_wallet(user_id).await
    }

    pub async fn get_wallet_by_id(&self, wallet_id: WalletId) -> Result<Wallet, AppError> {
        self.wallets.get_wallet_by_id(wallet_id).await
    }

    pub async fn get_balance(&self, wallet_id: WalletId) -> Result<Coins, AppError> {
        self.wallets.get_balance(wallet_id).await
    }

    pub async fn list_wallets(&self) -> Result<Vec<Wallet>, AppError> {
        self.wallets.list_wallets().await
    }

    pub async fn platform_wallet(&self) -> Result<Wallet, AppError> {
        self.wallets.platform_wallet().await
    }

    pub async fn disable_wallet(&self, wallet_id: WalletId) -> Result<Wallet, AppError> {
        self.wallets.disable_wallet(wallet_id).await
    }

    pub async fn enable_wallet(&self, wallet_id: WalletId) -> Result<Wallet, AppError> {
        self.wallets.enable_wallet(wallet_id).await
    }

    // ========================
    // Ledger operations
    // ========================

    pub async fn list_transactions(
        &self,
        wallet_id: WalletId,
        cursor: Option<i64>,
        limit: usize,
    ) -> Result<EntryPage, AppError> {
        self.ledger.list_transactions(wallet_id, cursor, limit).await
    }

    /// Manual correction by an operator. Positive credits, negative debits;
    /// the balance still cannot go below zero.
    pub async fn admin_adjust(
        &self,
        wallet_id: WalletId,
        amount: Coins,
        reference_id: &str,
        note: Option<String>,
    ) -> Result<AppliedEntry, AppError> {
        if amount == 0 {
            return Err(AppError::InvalidAmount(
                "adjustment amount cannot be zero".to_string(),
            ));
        }
        let mut metadata = Metadata::new();
        if let Some(note) = note {
            metadata = metadata.with("note", note);
        }

        let applied = self
            .ledger
            .apply_entry(
                NewEntry::new(wallet_id, amount, EntryType::AdminAdjustment, reference_id)
                    .with_metadata(metadata),
            )
            .await?;

        if !applied.replayed {
            tracing::info!(
                wallet_id = %wallet_id,
                amount = amount,
                reference_id = %reference_id,
                balance_after = applied.entry.balance_after,
                "applied admin adjustment"
            );
        }
        Ok(applied)
    }

    pub async fn verify_wallet(&self, wallet_id: WalletId) -> Result<ChainReport, AppError> {
        self.ledger.verify_wallet(wallet_id).await
    }

    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        self.ledger.check_integrity().await
    }

    // ========================
    // Gift operations
    // ========================

    pub async fn send_gift(
        &self,
        sender: UserId,
        recipient: UserId,
        request: GiftRequest,
    ) -> Result<GiftTransaction, AppError> {
        self.gifts.send_gift(sender, recipient, request).await
    }

    /// A gift request priced at the configured default commission rate.
    pub fn gift_request(&self, gift_id: impl Into<String>, price: Coins) -> GiftRequest {
        GiftRequest::new(gift_id, price, self.config.default_commission_rate)
    }

    // ========================
    // Purchase operations
    // ========================

    pub async fn create_purchase_request(
        &self,
        new: NewPurchaseRequest,
    ) -> Result<PurchaseRequest, AppError> {
        self.purchases.create(new).await
    }

    pub async fn approve_purchase_request(
        &self,
        id: PurchaseRequestId,
        admin_note: Option<String>,
    ) -> Result<PurchaseRequest, AppError> {
        self.purchases.approve(id, admin_note).await
    }

    pub async fn reject_purchase_request(
        &self,
        id: PurchaseRequestId,
        admin_note: Option<String>,
    ) -> Result<PurchaseRequest, AppError> {
        self.purchases.reject(id, admin_note).await
    }

    pub async fn get_purchase_request(
        &self,
        id: PurchaseRequestId,
    ) -> Result<PurchaseRequest, AppError> {
        self.purchases.get(id).await
    }

    pub async fn list_purchase_requests(
        &self,
        status: Option<PurchaseStatus>,
    ) -> Result<Vec<PurchaseRequest>, AppError> {
        self.purchases.list(status).await
    }

    // ========================
    // Stats operations
    // ========================

    /// Gift counters as currently stored. May lag the ledger.
    pub async fn get_stats(&self, wallet_id: WalletId) -> Result<WalletStats, AppError> {
        self.wallets.get_wallet_by_id(wallet_id).await?;
        Ok(self
            .repo
            .get_stats(wallet_id)
            .await?
            .unwrap_or_else(|| WalletStats::empty(wallet_id)))
    }

    /// Rebuild every wallet's counters by replaying its ledger.
    ///
    /// A gift committing while this runs may be counted twice or missed until the
    /// next pass; the ledger itself is never affected.
    pub async fn reconcile_stats(&self) -> Result<ReconcileSummary, AppError> {
        let mut summary = ReconcileSummary::default();

        for wallet in self.wallets.list_wallets().await? {
            let entries = self.ledger.wallet_history(wallet.id).await?;
            let projected = project_stats(wallet.id, &entries);
            let stored = self
                .repo
                .get_stats(wallet.id)
                .await?
                .unwrap_or_else(|| WalletStats::empty(wallet.id));

            summary.wallets_checked += 1;
            if stored != projected {
                tracing::warn!(
                    wallet_id = %wallet.id,
                    stored_gifts_sent = stored.gifts_sent,
                    replayed_gifts_sent = projected.gifts_sent,
                    stored_coins_earned = stored.coins_earned,
                    replayed_coins_earned = projected.coins_earned,
                    "gift stats drifted from ledger"
                );
                self.repo.replace_stats(&projected).await?;
                summary.wallets_corrected += 1;
            }
        }

        tracing::info!(
            wallets_checked = summary.wallets_checked,
            wallets_corrected = summary.wallets_corrected,
            "reconciled gift stats"
        );
        Ok(summary)
    }
}
