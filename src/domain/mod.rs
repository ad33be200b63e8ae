mod commission;
mod entry;
mod gift;
mod ledger;
mod money;
mod purchase;
mod wallet;

pub use commission::*;
pub use entry::*;
pub use gift::*;
pub use ledger::*;
pub use money::*;
pub use purchase::*;
pub use wallet::*;
