use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::application::{CoinService, DEFAULT_PAGE_SIZE};
use crate::config::CoinConfig;
use crate::domain::{
    format_cents, format_coins, parse_cents, parse_coins, CommissionRate, NewPurchaseRequest,
    PaymentMethod, PurchaseRequest, PurchaseStatus, TransactionEntry, Wallet,
};

/// Coinvault - coin wallet ledger administration
#[derive(Parser)]
#[command(name = "coinvault")]
#[command(about = "Administer coin wallets, gifts and purchase requests backed by an append-only ledger")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "COINVAULT_DB", default_value = "coinvault.db")]
    pub database: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Maximum pooled database connections
    #[arg(long, env = "COINVAULT_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    /// Milliseconds a writer waits for a busy database
    #[arg(long, env = "COINVAULT_BUSY_TIMEOUT_MS", default_value_t = 5_000)]
    pub busy_timeout_ms: u64,

    /// Default platform commission, in percent
    #[arg(long, env = "COINVAULT_COMMISSION_RATE", default_value_t = 30)]
    pub commission_rate: u8,

    /// User id owning the platform revenue wallet
    #[arg(long, env = "COINVAULT_PLATFORM_USER", default_value_t = Uuid::nil())]
    pub platform_user: Uuid,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database and the platform wallet
    Init,

    /// Wallet management commands
    #[command(subcommand)]
    Wallet(WalletCommands),

    /// Show a user's balance
    Balance {
        /// User id
        user: Uuid,
    },

    /// List a wallet's ledger entries, newest first
    Transactions {
        /// Wallet id
        wallet: Uuid,

        /// Continue after this sequence number (from a previous page)
        #[arg(long)]
        cursor: Option<i64>,

        /// Maximum number of entries to show
        #[arg(short, long, default_value_t = DEFAULT_PAGE_SIZE)]
        limit: usize,
    },

    /// Send a gift from one user to another
    Gift {
        /// Sending user id
        #[arg(long)]
        from: Uuid,

        /// Receiving user id
        #[arg(long)]
        to: Uuid,

        /// Catalog id of the gift
        #[arg(long)]
        gift_id: String,

        /// Price in coins
        #[arg(long)]
        price: String,

        /// Commission percent (defaults to the configured rate)
        #[arg(long)]
        rate: Option<u8>,

        /// Idempotency key; retrying with the same key is a no-op
        #[arg(long)]
        key: Option<Uuid>,
    },

    /// Purchase request commands
    #[command(subcommand)]
    Purchase(PurchaseCommands),

    /// Manually credit or debit a wallet
    Adjust {
        /// Wallet id
        wallet: Uuid,

        /// Signed coin amount (e.g. "500" or "-200")
        #[arg(allow_hyphen_values = true)]
        amount: String,

        /// Unique reference for this adjustment
        #[arg(long)]
        reference: String,

        /// Reason recorded with the entry
        #[arg(short, long)]
        note: Option<String>,
    },

    /// Gift statistics commands
    #[command(subcommand)]
    Stats(StatsCommands),

    /// Verify ledger integrity (one wallet, or all of them)
    Check {
        /// Wallet id (omit for all wallets)
        #[arg(long)]
        wallet: Option<Uuid>,
    },

    /// Export data to CSV or JSON
    Export {
        /// What to export: entries, wallets, purchases, full
        #[arg(short = 't', long = "type", default_value = "full")]
        export_type: String,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum WalletCommands {
    /// Create a wallet for a user (no-op if it exists)
    Create {
        /// User id
        user: Uuid,
    },

    /// List all wallets
    List,

    /// Show wallet details
    Show {
        /// User id
        user: Uuid,
    },

    /// Stop a wallet from accepting new entries
    Disable {
        /// Wallet id
        wallet: Uuid,
    },

    /// Re-enable a disabled wallet
    Enable {
        /// Wallet id
        wallet: Uuid,
    },
}

#[derive(Subcommand)]
pub enum PurchaseCommands {
    /// Record a payment awaiting admin review
    Create {
        /// Buying user id
        #[arg(long)]
        user: Uuid,

        /// Coins to credit on approval
        #[arg(long)]
        coins: String,

        /// Amount paid (e.g. "4.99")
        #[arg(long)]
        paid: String,

        /// External payment reference (must be unique)
        #[arg(long)]
        reference: String,

        /// Payment method: bank_transfer, card, mobile_money, other
        #[arg(long, default_value = "bank_transfer")]
        method: String,

        /// Coin package id
        #[arg(long)]
        package: Option<String>,
    },

    /// Approve a pending request and credit the coins
    Approve {
        /// Purchase request id
        id: Uuid,

        /// Admin note
        #[arg(short, long)]
        note: Option<String>,
    },

    /// Reject a pending request
    Reject {
        /// Purchase request id
        id: Uuid,

        /// Admin note
        #[arg(short, long)]
        note: Option<String>,
    },

    /// Show purchase request details
    Show {
        /// Purchase request id
        id: Uuid,
    },

    /// List purchase requests
    List {
        /// Filter by status: pending, approved, rejected
        #[arg(long)]
        status: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum StatsCommands {
    /// Show a wallet's gift counters
    Show {
        /// Wallet id
        wallet: Uuid,
    },

    /// Rebuild all gift counters from the ledger
    Reconcile,
}

impl Cli {
    pub fn config(&self) -> Result<CoinConfig> {
        let rate = CommissionRate::new(self.commission_rate).context("Invalid --commission-rate")?;
        Ok(CoinConfig::new(&self.database)
            .with_max_connections(self.max_connections)
            .with_busy_timeout(std::time::Duration::from_millis(self.busy_timeout_ms))
            .with_commission_rate(rate)
            .with_platform_user(self.platform_user))
    }

    pub async fn run(self) -> Result<()> {
        let config = self.config()?;

        let service = match self.command {
            Commands::Init => {
                CoinService::init(config).await?;
                println!("Database initialized: {}", self.database);
                return Ok(());
            }
            _ => CoinService::connect(config).await.with_context(|| {
                format!("Failed to open {}. Run 'coinvault init' first", self.database)
            })?,
        };

        match self.command {
            Commands::Init => {}

            Commands::Wallet(cmd) => run_wallet_command(&service, cmd).await?,

            Commands::Balance { user } => {
                let wallet = service.get_wallet(user).await?;
                println!("{}: {} coins", wallet.user_id, format_coins(wallet.balance));
            }

            Commands::Transactions {
                wallet,
                cursor,
                limit,
            } => {
                let page = service.list_transactions(wallet, cursor, limit).await?;
                if page.entries.is_empty() {
                    println!("No entries found.");
                } else {
                    print_entries(&page.entries);
                }
                if let Some(next) = page.next_cursor {
                    println!();
                    println!("More entries: --cursor {}", next);
                }
            }

            Commands::Gift {
                from,
                to,
                gift_id,
                price,
                rate,
                key,
            } => {
                let price = parse_coins(&price).context("Invalid price. Use whole coins, e.g. '100'")?;
                let mut request = service.gift_request(gift_id, price);
                if let Some(rate) = rate {
                    request.rate = CommissionRate::new(rate)?;
                }
                if let Some(key) = key {
                    request = request.with_idempotency_key(key);
                }

                let gift = service.send_gift(from, to, request).await?;
                if gift.replayed {
                    println!("Gift already recorded: {}", gift.id);
                } else {
                    println!("Gift sent: {}", gift.id);
                }
                println!(
                    "  Price:          {} coins",
                    format_coins(gift.price)
                );
                println!(
                    "  Commission:     {} coins ({})",
                    format_coins(gift.commission),
                    gift.rate
                );
                println!(
                    "  Recipient got:  {} coins",
                    format_coins(gift.recipient_received)
                );
                println!(
                    "  Sender balance: {} -> {}",
                    format_coins(gift.sender_balance_before),
                    format_coins(gift.sender_balance_after)
                );
            }

            Commands::Purchase(cmd) => run_purchase_command(&service, cmd).await?,

            Commands::Adjust {
                wallet,
                amount,
                reference,
                note,
            } => {
                let amount = parse_coins(&amount).context("Invalid amount. Use whole coins, e.g. '-200'")?;
                let applied = service.admin_adjust(wallet, amount, &reference, note).await?;
                if applied.replayed {
                    println!("Adjustment already recorded (sequence {})", applied.entry.sequence);
                } else {
                    println!(
                        "Adjusted wallet {}: {} -> {}",
                        wallet,
                        format_coins(applied.entry.balance_before),
                        format_coins(applied.entry.balance_after)
                    );
                }
            }

            Commands::Stats(cmd) => run_stats_command(&service, cmd).await?,

            Commands::Check { wallet } => run_check_command(&service, wallet).await?,

            Commands::Export {
                export_type,
                output,
            } => run_export_command(&service, &export_type, output.as_deref()).await?,
        }

        Ok(())
    }
}

async fn run_wallet_command(service: &CoinService, cmd: WalletCommands) -> Result<()> {
    match cmd {
        WalletCommands::Create { user } => {
            let wallet = service.create_wallet(user).await?;
            println!("Wallet: {} (user {})", wallet.id, wallet.user_id);
        }

        WalletCommands::List => {
            let wallets = service.list_wallets().await?;
            if wallets.is_empty() {
                println!("No wallets found.");
            } else {
                println!("{:<36}  {:<36}  {:>14}  {:<8}", "WALLET", "USER", "BALANCE", "STATUS");
                println!("{}", "-".repeat(100));
                for wallet in &wallets {
                    println!(
                        "{:<36}  {:<36}  {:>14}  {:<8}",
                        wallet.id,
                        wallet.user_id,
                        format_coins(wallet.balance),
                        wallet_status(wallet)
                    );
                }
            }
        }

        WalletCommands::Show { user } => {
            let wallet = service.get_wallet(user).await?;
            let stats = service.get_stats(wallet.id).await?;
            println!("Wallet: {}", wallet.id);
            println!("  User:           {}", wallet.user_id);
            println!("  Balance:        {} coins", format_coins(wallet.balance));
            println!("  Status:         {}", wallet_status(&wallet));
            println!(
                "  Created:        {}",
                wallet.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            if let Some(disabled) = wallet.disabled_at {
                println!("  Disabled:       {}", disabled.format("%Y-%m-%d %H:%M:%S"));
            }
            println!();
            println!("  Gifts sent:     {}", stats.gifts_sent);
            println!("  Gifts received: {}", stats.gifts_received);
            println!("  Coins spent:    {}", format_coins(stats.coins_spent));
            println!("  Coins earned:   {}", format_coins(stats.coins_earned));
        }

        WalletCommands::Disable { wallet } => {
            service.disable_wallet(wallet).await?;
            println!("Disabled wallet: {}", wallet);
        }

        WalletCommands::Enable { wallet } => {
            service.enable_wallet(wallet).await?;
            println!("Enabled wallet: {}", wallet);
        }
    }
    Ok(())
}

async fn run_purchase_command(service: &CoinService, cmd: PurchaseCommands) -> Result<()> {
    match cmd {
        PurchaseCommands::Create {
            user,
            coins,
            paid,
            reference,
            method,
            package,
        } => {
            let coin_amount = parse_coins(&coins).context("Invalid coin amount")?;
            let paid_amount =
                parse_cents(&paid).context("Invalid paid amount. Use '4.99' or '5'")?;
            let payment_method = PaymentMethod::from_str(&method).ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid payment method '{}'. Valid methods: bank_transfer, card, mobile_money, other",
                    method
                )
            })?;

            let request = service
                .create_purchase_request(NewPurchaseRequest {
                    user_id: user,
                    package_id: package,
                    coin_amount,
                    paid_amount,
                    payment_reference: reference,
                    payment_method,
                })
                .await?;
            println!("Created purchase request: {}", request.id);
        }

        PurchaseCommands::Approve { id, note } => {
            let request = service.approve_purchase_request(id, note).await?;
            println!(
                "Approved {}: credited {} coins to wallet {}",
                request.id,
                format_coins(request.coin_amount),
                request.wallet_id
            );
        }

        PurchaseCommands::Reject { id, note } => {
            let request = service.reject_purchase_request(id, note).await?;
            println!("Rejected {}", request.id);
        }

        PurchaseCommands::Show { id } => {
            let request = service.get_purchase_request(id).await?;
            print_purchase(&request);
        }

        PurchaseCommands::List { status } => {
            let status = status
                .map(|s| {
                    PurchaseStatus::from_str(&s).ok_or_else(|| {
                        anyhow::anyhow!(
                            "Invalid status '{}'. Valid statuses: pending, approved, rejected",
                            s
                        )
                    })
                })
                .transpose()?;

            let requests = service.list_purchase_requests(status).await?;
            if requests.is_empty() {
                println!("No purchase requests found.");
            } else {
                println!(
                    "{:<36}  {:<10}  {:>12}  {:>10}  {:<24}",
                    "ID", "STATUS", "COINS", "PAID", "REFERENCE"
                );
                println!("{}", "-".repeat(100));
                for request in &requests {
                    println!(
                        "{:<36}  {:<10}  {:>12}  {:>10}  {:<24}",
                        request.id,
                        request.status,
                        format_coins(request.coin_amount),
                        format_cents(request.paid_amount),
                        request.payment_reference
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_stats_command(service: &CoinService, cmd: StatsCommands) -> Result<()> {
    match cmd {
        StatsCommands::Show { wallet } => {
            let stats = service.get_stats(wallet).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }

        StatsCommands::Reconcile => {
            let summary = service.reconcile_stats().await?;
            println!(
                "Reconciled {} wallets, corrected {}",
                summary.wallets_checked, summary.wallets_corrected
            );
        }
    }
    Ok(())
}

async fn run_check_command(service: &CoinService, wallet: Option<Uuid>) -> Result<()> {
    if let Some(wallet_id) = wallet {
        let report = service.verify_wallet(wallet_id).await?;
        if report.is_valid() {
            println!(
                "Wallet {} OK: {} entries, balance {}",
                wallet_id,
                report.entry_count,
                format_coins(report.stored_balance)
            );
            return Ok(());
        }
        for issue in &report.issues {
            println!("  {:?}", issue);
        }
        anyhow::bail!("Wallet {} failed verification", wallet_id);
    }

    let report = service.check_integrity().await?;
    println!("Wallets:      {}", report.wallet_count);
    println!("Entries:      {}", report.entry_count);
    println!("Total coins:  {}", format_coins(report.total_coins));
    println!("Net issued:   {}", format_coins(report.net_issued));

    if report.is_healthy() {
        println!("Ledger OK");
        return Ok(());
    }

    println!();
    for chain in &report.invalid_wallets {
        println!("Wallet {}:", chain.wallet_id);
        for issue in &chain.issues {
            println!("  {:?}", issue);
        }
    }
    anyhow::bail!(
        "Ledger integrity check failed for {} wallets",
        report.invalid_wallets.len()
    )
}

async fn run_export_command(
    service: &CoinService,
    export_type: &str,
    output: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{stdout, Write};

    let exporter = Exporter::new(service);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match export_type {
        "entries" => {
            let count = exporter.export_entries_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} ledger entries", count);
            }
        }
        "wallets" => {
            let count = exporter.export_wallets_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} wallets", count);
            }
        }
        "purchases" => {
            let count = exporter.export_purchases_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} purchase requests", count);
            }
        }
        "full" => {
            let snapshot = exporter.export_full_json(writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported full database: {} wallets, {} entries, {} purchase requests",
                    snapshot.wallets.len(),
                    snapshot.entries.len(),
                    snapshot.purchase_requests.len()
                );
            }
        }
        _ => {
            anyhow::bail!(
                "Invalid export type '{}'. Valid types: entries, wallets, purchases, full",
                export_type
            );
        }
    }

    Ok(())
}

fn wallet_status(wallet: &Wallet) -> &'static str {
    if wallet.is_disabled() {
        "disabled"
    } else {
        "active"
    }
}

fn print_entries(entries: &[TransactionEntry]) {
    println!(
        "{:>6}  {:<19}  {:<22}  {:>12}  {:>14}  {:<36}",
        "SEQ", "DATE", "TYPE", "AMOUNT", "BALANCE", "REFERENCE"
    );
    println!("{}", "-".repeat(118));
    for entry in entries {
        println!(
            "{:>6}  {:<19}  {:<22}  {:>12}  {:>14}  {:<36}",
            entry.sequence,
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.entry_type,
            format_coins(entry.amount),
            format_coins(entry.balance_after),
            entry.reference_id
        );
    }
}

fn print_purchase(request: &PurchaseRequest) {
    println!("Purchase request: {}", request.id);
    println!("  User:           {}", request.user_id);
    println!("  Wallet:         {}", request.wallet_id);
    if let Some(package) = &request.package_id {
        println!("  Package:        {}", package);
    }
    println!("  Coins:          {}", format_coins(request.coin_amount));
    println!("  Paid:           {}", format_cents(request.paid_amount));
    println!("  Reference:      {}", request.payment_reference);
    println!("  Method:         {}", request.payment_method);
    println!("  Status:         {}", request.status);
    if let Some(note) = &request.admin_note {
        println!("  Note:           {}", note);
    }
    println!(
        "  Created:        {}",
        request.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(processed) = request.processed_at {
        println!("  Processed:      {}", processed.format("%Y-%m-%d %H:%M:%S"));
    }
}
