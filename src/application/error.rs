use thiserror::Error;

use crate::domain::{
    Coins, InvalidRate, MetadataError, PurchaseRequest, PurchaseRequestId, WalletId,
};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient funds in wallet {wallet_id}: balance {balance}, required {required}")]
    InsufficientFunds {
        wallet_id: WalletId,
        balance: Coins,
        required: Coins,
    },

    #[error("Duplicate reference: {0}")]
    DuplicateReference(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Cannot send a gift to yourself")]
    SelfGiftNotAllowed,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Purchase request {} was already {}", .0.id, .0.status)]
    AlreadyProcessed(Box<PurchaseRequest>),

    #[error("Invalid commission rate: {0}")]
    InvalidRate(#[from] InvalidRate),

    #[error("Invalid metadata: {0}")]
    InvalidMetadata(#[from] MetadataError),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl AppError {
    pub fn wallet_not_found(id: impl std::fmt::Display) -> Self {
        AppError::NotFound(format!("wallet {}", id))
    }

    pub fn purchase_not_found(id: PurchaseRequestId) -> Self {
        AppError::NotFound(format!("purchase request {}", id))
    }

    /// The stored request for an `AlreadyProcessed` error, i.e. the original result.
    pub fn processed_request(&self) -> Option<&PurchaseRequest> {
        match self {
            AppError::AlreadyProcessed(request) => Some(request),
            _ => None,
        }
    }
}
