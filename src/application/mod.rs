// Application layer - use cases and orchestration.
// The ledger engine is the only writer of balances; gifts and purchases
// compose it inside their own transactions.

pub mod error;
pub mod gifts;
pub mod ledger;
pub mod purchases;
pub mod service;
pub mod wallets;

pub use error::*;
pub use gifts::GiftTransferService;
pub use ledger::{LedgerEngine, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use purchases::PurchaseRequestWorkflow;
pub use service::{CoinService, ReconcileSummary};
pub use wallets::WalletStore;
