use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::application::CoinService;
use crate::domain::{PurchaseRequest, TransactionEntry, Wallet, WalletStats};

/// Full point-in-time dump of the coin economy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub wallets: Vec<Wallet>,
    pub entries: Vec<TransactionEntry>,
    pub purchase_requests: Vec<PurchaseRequest>,
    pub stats: Vec<WalletStats>,
}

/// Exporter for converting ledger data to CSV or JSON
pub struct Exporter<'a> {
    service: &'a CoinService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a CoinService) -> Self {
        Self { service }
    }

    /// Every ledger entry, grouped by wallet in chain order.
    pub async fn export_entries_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let entries = self.service.repository().list_all_entries().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "wallet_id",
            "sequence",
            "entry_type",
            "amount",
            "balance_before",
            "balance_after",
            "reference_id",
            "counterparty_wallet_id",
            "metadata",
            "created_at",
        ])?;

        for entry in &entries {
            csv_writer.write_record([
                entry.id.to_string(),
                entry.wallet_id.to_string(),
                entry.sequence.to_string(),
                entry.entry_type.as_str().to_string(),
                entry.amount.to_string(),
                entry.balance_before.to_string(),
                entry.balance_after.to_string(),
                entry.reference_id.clone(),
                entry
                    .counterparty_wallet_id
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
                entry.metadata.to_json()?,
                entry.created_at.to_rfc3339(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(entries.len())
    }

    pub async fn export_wallets_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let wallets = self.service.list_wallets().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["id", "user_id", "balance", "created_at", "disabled_at"])?;

        for wallet in &wallets {
            csv_writer.write_record([
                wallet.id.to_string(),
                wallet.user_id.to_string(),
                wallet.balance.to_string(),
                wallet.created_at.to_rfc3339(),
                wallet
                    .disabled_at
                    .map(|d| d.to_rfc3339())
                    .unwrap_or_default(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(wallets.len())
    }

    pub async fn export_purchases_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let requests = self.service.list_purchase_requests(None).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "user_id",
            "wallet_id",
            "package_id",
            "coin_amount",
            "paid_amount_cents",
            "payment_reference",
            "payment_method",
            "status",
            "admin_note",
            "created_at",
            "processed_at",
        ])?;

        for request in &requests {
            csv_writer.write_record([
                request.id.to_string(),
                request.user_id.to_string(),
                request.wallet_id.to_string(),
                request.package_id.clone().unwrap_or_default(),
                request.coin_amount.to_string(),
                request.paid_amount.to_string(),
                request.payment_reference.clone(),
                request.payment_method.as_str().to_string(),
                request.status.as_str().to_string(),
                request.admin_note.clone().unwrap_or_default(),
                request.created_at.to_rfc3339(),
                request
                    .processed_at
                    .map(|d| d.to_rfc3339())
                    .unwrap_or_default(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(requests.len())
    }

    /// Export everything as one JSON document
    pub async fn export_full_json<W: Write>(&self, mut writer: W) -> Result<DatabaseSnapshot> {
        let wallets = self.service.list_wallets().await?;
        let entries = self.service.repository().list_all_entries().await?;
        let purchase_requests = self.service.list_purchase_requests(None).await?;

        let mut stats = Vec::with_capacity(wallets.len());
        for wallet in &wallets {
            stats.push(self.service.get_stats(wallet.id).await?);
        }

        let snapshot = DatabaseSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            wallets,
            entries,
            purchase_requests,
            stats,
        };

        serde_json::to_writer_pretty(&mut writer, &snapshot)?;
        writer.flush()?;

        Ok(snapshot)
    }
}
