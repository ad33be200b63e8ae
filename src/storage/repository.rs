use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::config::CoinConfig;
use crate::domain::{
    Coins, EntryType, Metadata, PaymentMethod, PurchaseRequest, PurchaseRequestId,
    PurchaseStatus, TransactionEntry, UserId, Wallet, WalletId, WalletStats,
};

use super::MIGRATION_001_INITIAL;

const WALLET_COLUMNS: &str = "id, user_id, balance, created_at, updated_at, disabled_at";

const ENTRY_COLUMNS: &str = "id, wallet_id, sequence, entry_type, amount, balance_before, balance_after, reference_id, counterparty_wallet_id, metadata, created_at";

const PURCHASE_COLUMNS: &str = "id, user_id, wallet_id, package_id, coin_amount, paid_amount, payment_reference, payment_method, status, admin_note, created_at, updated_at, processed_at";

/// Store handle for wallets, ledger entries, purchase requests and stats.
///
/// Cloning is cheap: clones share the same connection pool.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool for the configured database file.
    ///
    /// WAL lets display reads proceed while a writer holds the lock, and the busy
    /// timeout makes concurrent writers queue instead of failing immediately.
    pub async fn connect(config: &CoinConfig, create_if_missing: bool) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(create_if_missing)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout())
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to database {}", config.database_path))?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(config: &CoinConfig) -> Result<Self> {
        let repo = Self::connect(config, true).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start an atomic unit of work. Dropping it without commit rolls back.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .context("Failed to start transaction")
    }

    // ========================
    // Wallet operations
    // ========================

    /// Insert a wallet unless the user already owns one. Returns whether a row was written.
    pub async fn insert_wallet_if_absent(&self, wallet: &Wallet) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO wallets (id, user_id, balance, created_at, updated_at, disabled_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO NOTHING
            "#,
        )
        .bind(wallet.id.to_string())
        .bind(wallet.user_id.to_string())
        .bind(wallet.balance)
        .bind(wallet.created_at.to_rfc3339())
        .bind(wallet.updated_at.to_rfc3339())
        .bind(wallet.disabled_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await
        .context("Failed to save wallet")?;
        Ok(result.rows_affected() == 1)
    }

    /// Get a wallet by ID.
    pub async fn get_wallet(&self, id: WalletId) -> Result<Option<Wallet>> {
        let row = sqlx::query(&format!("SELECT {} FROM wallets WHERE id = ?", WALLET_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch wallet")?;

        row.as_ref().map(Self::row_to_wallet).transpose()
    }

    /// Get the wallet owned by a user.
    pub async fn get_wallet_by_user(&self, user_id: UserId) -> Result<Option<Wallet>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM wallets WHERE user_id = ?",
            WALLET_COLUMNS
        ))
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch wallet by user")?;

        row.as_ref().map(Self::row_to_wallet).transpose()
    }

    /// List all wallets, oldest first.
    pub async fn list_wallets(&self) -> Result<Vec<Wallet>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM wallets ORDER BY created_at, id",
            WALLET_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list wallets")?;

        rows.iter().map(Self::row_to_wallet).collect()
    }

    /// Set or clear the soft-disable marker. Returns false if the wallet does not exist.
    pub async fn set_wallet_disabled(
        &self,
        id: WalletId,
        disabled_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE wallets SET disabled_at = ?, updated_at = ? WHERE id = ?")
            .bind(disabled_at.map(|dt| dt.to_rfc3339()))
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to update wallet status")?;
        Ok(result.rows_affected() == 1)
    }

    /// Claim the wallet row for the rest of the transaction and return its current state.
    ///
    /// The no-op UPDATE is the first write of the transaction, so SQLite takes the
    /// write lock here; every later read in the same transaction sees settled data.
    pub async fn lock_wallet(conn: &mut SqliteConnection, id: WalletId) -> Result<Option<Wallet>> {
        let row = sqlx::query(&format!(
            "UPDATE wallets SET balance = balance WHERE id = ? RETURNING {}",
            WALLET_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to lock wallet")?;

        row.as_ref().map(Self::row_to_wallet).transpose()
    }

    pub async fn update_balance(
        conn: &mut SqliteConnection,
        id: WalletId,
        balance: Coins,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE wallets SET balance = ?, updated_at = ? WHERE id = ?")
            .bind(balance)
            .bind(updated_at.to_rfc3339())
            .bind(id.to_string())
            .execute(&mut *conn)
            .await
            .context("Failed to update wallet balance")?;
        Ok(())
    }

    fn row_to_wallet(row: &SqliteRow) -> Result<Wallet> {
        let id_str: String = row.get("id");
        let user_id_str: String = row.get("user_id");
        let disabled_at_str: Option<String> = row.get("disabled_at");

        Ok(Wallet {
            id: Uuid::parse_str(&id_str).context("Invalid wallet ID")?,
            user_id: Uuid::parse_str(&user_id_str).context("Invalid user ID")?,
            balance: row.get("balance"),
            created_at: parse_timestamp(row.get("created_at"))?,
            updated_at: parse_timestamp(row.get("updated_at"))?,
            disabled_at: disabled_at_str.map(parse_timestamp).transpose()?,
        })
    }

    // ========================
    // Ledger operations
    // ========================

    pub async fn find_entry_by_reference(
        conn: &mut SqliteConnection,
        wallet_id: WalletId,
        reference_id: &str,
    ) -> Result<Option<TransactionEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM ledger_entries WHERE wallet_id = ? AND reference_id = ?",
            ENTRY_COLUMNS
        ))
        .bind(wallet_id.to_string())
        .bind(reference_id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to look up ledger entry by reference")?;

        row.as_ref().map(Self::row_to_entry).transpose()
    }

    /// Highest sequence number recorded for the wallet, 0 if none.
    pub async fn last_sequence(conn: &mut SqliteConnection, wallet_id: WalletId) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(sequence), 0) AS last FROM ledger_entries WHERE wallet_id = ?",
        )
        .bind(wallet_id.to_string())
        .fetch_one(&mut *conn)
        .await
        .context("Failed to read last sequence")?;
        Ok(row.get("last"))
    }

    pub async fn insert_entry(conn: &mut SqliteConnection, entry: &TransactionEntry) -> Result<()> {
        let metadata_json = entry.metadata.to_json()?;

        sqlx::query(
            r#"
            INSERT INTO ledger_entries (id, wallet_id, sequence, entry_type, amount, balance_before, balance_after, reference_id, counterparty_wallet_id, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.wallet_id.to_string())
        .bind(entry.sequence)
        .bind(entry.entry_type.as_str())
        .bind(entry.amount)
        .bind(entry.balance_before)
        .bind(entry.balance_after)
        .bind(&entry.reference_id)
        .bind(entry.counterparty_wallet_id.map(|id| id.to_string()))
        .bind(&metadata_json)
        .bind(entry.created_at.to_rfc3339())
        .execute(&mut *conn)
        .await
        .context("Failed to save ledger entry")?;
        Ok(())
    }

    /// One page of a wallet's entries, newest first, strictly older than `before_sequence`.
    pub async fn list_entries_page(
        &self,
        wallet_id: WalletId,
        before_sequence: Option<i64>,
        limit: i64,
    ) -> Result<Vec<TransactionEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM ledger_entries WHERE wallet_id = ? AND sequence < ? ORDER BY sequence DESC LIMIT ?",
            ENTRY_COLUMNS
        ))
        .bind(wallet_id.to_string())
        .bind(before_sequence.unwrap_or(i64::MAX))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list ledger entries")?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    /// A wallet row and its full chain read from one snapshot, so concurrent
    /// writers cannot make them disagree.
    pub async fn wallet_snapshot(
        &self,
        wallet_id: WalletId,
    ) -> Result<Option<(Wallet, Vec<TransactionEntry>)>> {
        let mut tx = self.begin().await?;

        let wallet_row = sqlx::query(&format!("SELECT {} FROM wallets WHERE id = ?", WALLET_COLUMNS))
            .bind(wallet_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to fetch wallet")?;
        let Some(wallet_row) = wallet_row else {
            return Ok(None);
        };
        let wallet = Self::row_to_wallet(&wallet_row)?;

        let entry_rows = sqlx::query(&format!(
            "SELECT {} FROM ledger_entries WHERE wallet_id = ? ORDER BY sequence",
            ENTRY_COLUMNS
        ))
        .bind(wallet_id.to_string())
        .fetch_all(&mut *tx)
        .await
        .context("Failed to list ledger entries for wallet")?;
        let entries = entry_rows
            .iter()
            .map(Self::row_to_entry)
            .collect::<Result<Vec<_>>>()?;

        tx.commit().await.context("Failed to close snapshot")?;
        Ok(Some((wallet, entries)))
    }

    /// Every entry sharing a reference id, e.g. the three legs of one gift.
    pub async fn list_entries_by_reference(&self, reference_id: &str) -> Result<Vec<TransactionEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM ledger_entries WHERE reference_id = ? ORDER BY created_at, wallet_id",
            ENTRY_COLUMNS
        ))
        .bind(reference_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list ledger entries by reference")?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    /// Every entry in the ledger, grouped by wallet in chain order.
    pub async fn list_all_entries(&self) -> Result<Vec<TransactionEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM ledger_entries ORDER BY wallet_id, sequence",
            ENTRY_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list ledger entries")?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    pub async fn count_entries(&self, wallet_id: WalletId) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM ledger_entries WHERE wallet_id = ?")
            .bind(wallet_id.to_string())
            .fetch_one(&self.pool)
            .await
            .context("Failed to count ledger entries")?;
        Ok(row.get("count"))
    }

    fn row_to_entry(row: &SqliteRow) -> Result<TransactionEntry> {
        let id_str: String = row.get("id");
        let wallet_id_str: String = row.get("wallet_id");
        let entry_type_str: String = row.get("entry_type");
        let counterparty_str: Option<String> = row.get("counterparty_wallet_id");
        let metadata_json: String = row.get("metadata");

        Ok(TransactionEntry {
            id: Uuid::parse_str(&id_str).context("Invalid entry ID")?,
            wallet_id: Uuid::parse_str(&wallet_id_str).context("Invalid wallet ID")?,
            sequence: row.get("sequence"),
            entry_type: EntryType::from_str(&entry_type_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid entry type: {}", entry_type_str))?,
            amount: row.get("amount"),
            balance_before: row.get("balance_before"),
            balance_after: row.get("balance_after"),
            reference_id: row.get("reference_id"),
            counterparty_wallet_id: counterparty_str
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .context("Invalid counterparty wallet ID")?,
            metadata: Metadata::from_json(&metadata_json).context("Invalid entry metadata")?,
            created_at: parse_timestamp(row.get("created_at"))?,
        })
    }

    // ========================
    // Purchase request operations
    // ========================

    /// Insert a request unless its payment reference was already used.
    /// Returns false on a duplicate reference.
    pub async fn insert_purchase_request(&self, request: &PurchaseRequest) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO purchase_requests (id, user_id, wallet_id, package_id, coin_amount, paid_amount, payment_reference, payment_method, status, admin_note, created_at, updated_at, processed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(payment_reference) DO NOTHING
            "#,
        )
        .bind(request.id.to_string())
        .bind(request.user_id.to_string())
        .bind(request.wallet_id.to_string())
        .bind(&request.package_id)
        .bind(request.coin_amount)
        .bind(request.paid_amount)
        .bind(&request.payment_reference)
        .bind(request.payment_method.as_str())
        .bind(request.status.as_str())
        .bind(&request.admin_note)
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .bind(request.processed_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await
        .context("Failed to save purchase request")?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn get_purchase_request(&self, id: PurchaseRequestId) -> Result<Option<PurchaseRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM purchase_requests WHERE id = ?",
            PURCHASE_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch purchase request")?;

        row.as_ref().map(Self::row_to_purchase).transpose()
    }

    /// List requests newest first, optionally filtered by status.
    pub async fn list_purchase_requests(
        &self,
        status: Option<PurchaseStatus>,
    ) -> Result<Vec<PurchaseRequest>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {} FROM purchase_requests WHERE status = ? ORDER BY created_at DESC",
                    PURCHASE_COLUMNS
                ))
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM purchase_requests ORDER BY created_at DESC",
                    PURCHASE_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("Failed to list purchase requests")?;

        rows.iter().map(Self::row_to_purchase).collect()
    }

    /// Claim the request row for the rest of the transaction.
    pub async fn lock_purchase_request(
        conn: &mut SqliteConnection,
        id: PurchaseRequestId,
    ) -> Result<Option<PurchaseRequest>> {
        let row = sqlx::query(&format!(
            "UPDATE purchase_requests SET status = status WHERE id = ? RETURNING {}",
            PURCHASE_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to lock purchase request")?;

        row.as_ref().map(Self::row_to_purchase).transpose()
    }

    /// Persist a decision. Only a pending row is updated; returns false otherwise.
    pub async fn save_purchase_decision(
        conn: &mut SqliteConnection,
        request: &PurchaseRequest,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE purchase_requests
            SET status = ?, admin_note = ?, updated_at = ?, processed_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(request.status.as_str())
        .bind(&request.admin_note)
        .bind(request.updated_at.to_rfc3339())
        .bind(request.processed_at.map(|dt| dt.to_rfc3339()))
        .bind(request.id.to_string())
        .execute(&mut *conn)
        .await
        .context("Failed to save purchase decision")?;
        Ok(result.rows_affected() == 1)
    }

    fn row_to_purchase(row: &SqliteRow) -> Result<PurchaseRequest> {
        let id_str: String = row.get("id");
        let user_id_str: String = row.get("user_id");
        let wallet_id_str: String = row.get("wallet_id");
        let method_str: String = row.get("payment_method");
        let status_str: String = row.get("status");
        let processed_at_str: Option<String> = row.get("processed_at");

        Ok(PurchaseRequest {
            id: Uuid::parse_str(&id_str).context("Invalid purchase request ID")?,
            user_id: Uuid::parse_str(&user_id_str).context("Invalid user ID")?,
            wallet_id: Uuid::parse_str(&wallet_id_str).context("Invalid wallet ID")?,
            package_id: row.get("package_id"),
            coin_amount: row.get("coin_amount"),
            paid_amount: row.get("paid_amount"),
            payment_reference: row.get("payment_reference"),
            payment_method: PaymentMethod::from_str(&method_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid payment method: {}", method_str))?,
            status: PurchaseStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid purchase status: {}", status_str))?,
            admin_note: row.get("admin_note"),
            created_at: parse_timestamp(row.get("created_at"))?,
            updated_at: parse_timestamp(row.get("updated_at"))?,
            processed_at: processed_at_str.map(parse_timestamp).transpose()?,
        })
    }

    // ========================
    // Stats operations
    // ========================

    /// Add one gift to both sides' counters.
    pub async fn bump_gift_stats(
        &self,
        sender: WalletId,
        recipient: WalletId,
        spent: Coins,
        earned: Coins,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;

        sqlx::query(
            r#"
            INSERT INTO wallet_stats (wallet_id, gifts_sent, coins_spent, updated_at)
            VALUES (?, 1, ?, ?)
            ON CONFLICT(wallet_id) DO UPDATE SET
                gifts_sent = gifts_sent + 1,
                coins_spent = coins_spent + excluded.coins_spent,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(sender.to_string())
        .bind(spent)
        .bind(&now)
        .execute(&mut *conn)
        .await
        .context("Failed to update sender stats")?;

        sqlx::query(
            r#"
            INSERT INTO wallet_stats (wallet_id, gifts_received, coins_earned, updated_at)
            VALUES (?, 1, ?, ?)
            ON CONFLICT(wallet_id) DO UPDATE SET
                gifts_received = gifts_received + 1,
                coins_earned = coins_earned + excluded.coins_earned,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(recipient.to_string())
        .bind(earned)
        .bind(&now)
        .execute(&mut *conn)
        .await
        .context("Failed to update recipient stats")?;

        Ok(())
    }

    pub async fn get_stats(&self, wallet_id: WalletId) -> Result<Option<WalletStats>> {
        let row = sqlx::query(
            r#"
            SELECT wallet_id, gifts_sent, gifts_received, coins_spent, coins_earned
            FROM wallet_stats
            WHERE wallet_id = ?
            "#,
        )
        .bind(wallet_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch wallet stats")?;

        Ok(row.map(|row| WalletStats {
            wallet_id,
            gifts_sent: row.get("gifts_sent"),
            gifts_received: row.get("gifts_received"),
            coins_spent: row.get("coins_spent"),
            coins_earned: row.get("coins_earned"),
        }))
    }

    /// Overwrite a wallet's counters with a replayed projection.
    pub async fn replace_stats(&self, stats: &WalletStats) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO wallet_stats (wallet_id, gifts_sent, gifts_received, coins_spent, coins_earned, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(wallet_id) DO UPDATE SET
                gifts_sent = excluded.gifts_sent,
                gifts_received = excluded.gifts_received,
                coins_spent = excluded.coins_spent,
                coins_earned = excluded.coins_earned,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(stats.wallet_id.to_string())
        .bind(stats.gifts_sent)
        .bind(stats.gifts_received)
        .bind(stats.coins_spent)
        .bind(stats.coins_earned)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to replace wallet stats")?;
        Ok(())
    }
}

fn parse_timestamp(value: String) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(&value)
        .with_context(|| format!("Invalid timestamp: {}", value))?
        .with_timezone(&Utc))
}
