use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, Coins, UserId, WalletId};

pub type PurchaseRequestId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    /// Waiting for an admin to verify the external payment
    Pending,
    /// Payment verified, coins credited
    Approved,
    /// Payment not verified, nothing credited
    Rejected,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Approved => "approved",
            PurchaseStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(PurchaseStatus::Pending),
            "approved" => Some(PurchaseStatus::Approved),
            "rejected" => Some(PurchaseStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PurchaseStatus::Pending)
    }
}

impl std::fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    BankTransfer,
    Card,
    MobileMoney,
    Other,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Card => "card",
            PaymentMethod::MobileMoney => "mobile_money",
            PaymentMethod::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "bank_transfer" => Some(PaymentMethod::BankTransfer),
            "card" => Some(PaymentMethod::Card),
            "mobile_money" => Some(PaymentMethod::MobileMoney),
            "other" => Some(PaymentMethod::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Admin-gated request to turn a verified external payment into coins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub id: PurchaseRequestId,
    pub user_id: UserId,
    pub wallet_id: WalletId,
    pub package_id: Option<String>,
    pub coin_amount: Coins,
    pub paid_amount: Cents,
    /// Unique across all requests; guards against replaying one payment twice
    pub payment_reference: String,
    pub payment_method: PaymentMethod,
    pub status: PurchaseStatus,
    pub admin_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl PurchaseRequest {
    pub fn new(wallet_id: WalletId, new: NewPurchaseRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            wallet_id,
            package_id: new.package_id,
            coin_amount: new.coin_amount,
            paid_amount: new.paid_amount,
            payment_reference: new.payment_reference.trim().to_string(),
            payment_method: new.payment_method,
            status: PurchaseStatus::Pending,
            admin_note: None,
            created_at: now,
            updated_at: now,
            processed_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == PurchaseStatus::Pending
    }

    /// Move to a terminal state. Returns false if the request was already decided.
    pub fn decide(&mut self, status: PurchaseStatus, admin_note: Option<String>) -> bool {
        if !self.is_pending() || !status.is_terminal() {
            return false;
        }
        let now = Utc::now();
        self.status = status;
        self.admin_note = admin_note;
        self.updated_at = now;
        self.processed_at = Some(now);
        true
    }
}

/// Data required to open a purchase request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPurchaseRequest {
    pub user_id: UserId,
    pub package_id: Option<String>,
    pub coin_amount: Coins,
    pub paid_amount: Cents,
    pub payment_reference: String,
    pub payment_method: PaymentMethod,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PurchaseRequest {
        PurchaseRequest::new(
            Uuid::new_v4(),
            NewPurchaseRequest {
                user_id: Uuid::new_v4(),
                package_id: Some("gold".into()),
                coin_amount: 500,
                paid_amount: 499,
                payment_reference: " abc123 ".into(),
                payment_method: PaymentMethod::BankTransfer,
            },
        )
    }

    #[test]
    fn test_new_request_is_pending() {
        let request = sample();
        assert!(request.is_pending());
        assert_eq!(request.payment_reference, "abc123");
        assert!(request.processed_at.is_none());
    }

    #[test]
    fn test_decide_is_one_shot() {
        let mut request = sample();
        assert!(request.decide(PurchaseStatus::Approved, Some("verified".into())));
        assert_eq!(request.status, PurchaseStatus::Approved);
        assert!(request.processed_at.is_some());

        assert!(!request.decide(PurchaseStatus::Rejected, None));
        assert_eq!(request.status, PurchaseStatus::Approved);
        assert_eq!(request.admin_note.as_deref(), Some("verified"));
    }

    #[test]
    fn test_cannot_decide_back_to_pending() {
        let mut request = sample();
        assert!(!request.decide(PurchaseStatus::Pending, None));
        assert!(request.is_pending());
    }

    #[test]
    fn test_status_and_method_parsing() {
        for status in [
            PurchaseStatus::Pending,
            PurchaseStatus::Approved,
            PurchaseStatus::Rejected,
        ] {
            assert_eq!(PurchaseStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(
            PaymentMethod::from_str("mobile-money"),
            Some(PaymentMethod::MobileMoney)
        );
        assert_eq!(PaymentMethod::from_str("cheque"), None);
    }
}
