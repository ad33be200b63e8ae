use anyhow::Context;

use crate::domain::{
    EntryType, Metadata, NewEntry, NewPurchaseRequest, PurchaseRequest, PurchaseRequestId,
    PurchaseStatus, MAX_REFERENCE_LEN,
};
use crate::storage::Repository;

use super::{AppError, LedgerEngine, WalletStore};

/// `Pending -> Approved | Rejected`, decided once by an admin.
///
/// Admin authorization happens before these calls; this type only enforces
/// the state machine and the ledger side effects.
#[derive(Clone)]
pub struct PurchaseRequestWorkflow {
    repo: Repository,
    wallets: WalletStore,
}

impl PurchaseRequestWorkflow {
    pub fn new(repo: Repository, wallets: WalletStore) -> Self {
        Self { repo, wallets }
    }

    /// Open a pending request. A payment reference can only ever be used once.
    pub async fn create(&self, new: NewPurchaseRequest) -> Result<PurchaseRequest, AppError> {
        if new.coin_amount <= 0 {
            return Err(AppError::InvalidAmount(format!(
                "coin amount must be positive, got {}",
                new.coin_amount
            )));
        }
        if new.paid_amount < 0 {
            return Err(AppError::InvalidAmount(format!(
                "paid amount cannot be negative, got {}",
                new.paid_amount
            )));
        }
        let reference = new.payment_reference.trim();
        if reference.is_empty() || reference.len() > MAX_REFERENCE_LEN {
            return Err(AppError::InvalidReference(format!(
                "payment reference must be 1..={} characters",
                MAX_REFERENCE_LEN
            )));
        }

        let wallet = self.wallets.get_or_create_wallet(new.user_id).await?;
        let request = PurchaseRequest::new(wallet.id, new);

        if !self.repo.insert_purchase_request(&request).await? {
            tracing::warn!(
                payment_reference = %request.payment_reference,
                user_id = %request.user_id,
                "rejected purchase request with reused payment reference"
            );
            return Err(AppError::DuplicateReference(request.payment_reference));
        }

        tracing::info!(
            purchase_request_id = %request.id,
            wallet_id = %request.wallet_id,
            coin_amount = request.coin_amount,
            "created purchase request"
        );
        Ok(request)
    }

    /// Credit the coins and mark the request approved, in one atomic unit.
    ///
    /// The ledger reference is the request id, so even a retry that raced past the
    /// status check could not credit the wallet twice.
    pub async fn approve(
        &self,
        id: PurchaseRequestId,
        admin_note: Option<String>,
    ) -> Result<PurchaseRequest, AppError> {
        let mut tx = self.repo.begin().await?;
        let mut request = Self::lock_pending(&mut tx, id).await?;

        let mut metadata = Metadata::new()
            .with("payment_reference", request.payment_reference.as_str())
            .with("payment_method", request.payment_method.as_str())
            .with("paid_amount", request.paid_amount);
        if let Some(package_id) = &request.package_id {
            metadata = metadata.with("package_id", package_id.as_str());
        }

        let applied = LedgerEngine::apply_in_tx(
            &mut *tx,
            NewEntry::new(
                request.wallet_id,
                request.coin_amount,
                EntryType::Purchase,
                request.id.to_string(),
            )
            .with_metadata(metadata),
        )
        .await?;

        Self::decide(&mut request, PurchaseStatus::Approved, admin_note)?;
        Self::save_decision(&mut tx, &request).await?;
        tx.commit().await.context("Failed to commit purchase approval")?;

        tracing::info!(
            purchase_request_id = %request.id,
            wallet_id = %request.wallet_id,
            coin_amount = request.coin_amount,
            balance_after = applied.entry.balance_after,
            "approved purchase request"
        );
        Ok(request)
    }

    /// Mark the request rejected. No coins move.
    pub async fn reject(
        &self,
        id: PurchaseRequestId,
        admin_note: Option<String>,
    ) -> Result<PurchaseRequest, AppError> {
        let mut tx = self.repo.begin().await?;
        let mut request = Self::lock_pending(&mut tx, id).await?;

        Self::decide(&mut request, PurchaseStatus::Rejected, admin_note)?;
        Self::save_decision(&mut tx, &request).await?;
        tx.commit().await.context("Failed to commit purchase rejection")?;

        tracing::info!(purchase_request_id = %request.id, "rejected purchase request");
        Ok(request)
    }

    pub async fn get(&self, id: PurchaseRequestId) -> Result<PurchaseRequest, AppError> {
        self.repo
            .get_purchase_request(id)
            .await?
            .ok_or_else(|| AppError::purchase_not_found(id))
    }

    pub async fn list(&self, status: Option<PurchaseStatus>) -> Result<Vec<PurchaseRequest>, AppError> {
        Ok(self.repo.list_purchase_requests(status).await?)
    }

    /// Claim the request row and make sure it can still be decided.
    /// A terminal request comes back as `AlreadyProcessed` carrying the stored result.
    async fn lock_pending(
        tx: &mut sqlx::Transaction<'static, sqlx::Sqlite>,
        id: PurchaseRequestId,
    ) -> Result<PurchaseRequest, AppError> {
        let request = Repository::lock_purchase_request(&mut **tx, id)
            .await?
            .ok_or_else(|| AppError::purchase_not_found(id))?;

        if !request.is_pending() {
            tracing::debug!(
                purchase_request_id = %id,
                status = %request.status,
                "purchase request already processed"
            );
            return Err(AppError::AlreadyProcessed(Box::new(request)));
        }
        Ok(request)
    }

    fn decide(
        request: &mut PurchaseRequest,
        status: PurchaseStatus,
        admin_note: Option<String>,
    ) -> Result<(), AppError> {
        if !request.decide(status, admin_note) {
            return Err(AppError::InvalidState(format!(
                "purchase request {} cannot move from {} to {}",
                request.id, request.status, status
            )));
        }
        Ok(())
    }

    async fn save_decision(
        tx: &mut sqlx::Transaction<'static, sqlx::Sqlite>,
        request: &PurchaseRequest,
    ) -> Result<(), AppError> {
        if !Repository::save_purchase_decision(&mut **tx, request).await? {
            return Err(AppError::InvalidState(format!(
                "purchase request {} changed while being decided",
                request.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::domain::PaymentMethod;

    fn pending() -> PurchaseRequest {
        PurchaseRequest::new(
            Uuid::new_v4(),
            NewPurchaseRequest {
                user_id: Uuid::new_v4(),
                package_id: None,
                coin_amount: 500,
                paid_amount: 499,
                payment_reference: "abc123".into(),
                payment_method: PaymentMethod::Card,
            },
        )
    }

    #[test]
    fn test_decide_moves_pending_to_terminal() {
        let mut request = pending();
        PurchaseRequestWorkflow::decide(&mut request, PurchaseStatus::Rejected, None).unwrap();
        assert_eq!(request.status, PurchaseStatus::Rejected);
    }

    #[test]
    fn test_refused_transition_is_invalid_state() {
        let mut request = pending();
        PurchaseRequestWorkflow::decide(&mut request, PurchaseStatus::Approved, None).unwrap();

        let again = PurchaseRequestWorkflow::decide(
            &mut request,
            PurchaseStatus::Rejected,
            Some("late".into()),
        );
        assert!(matches!(again, Err(AppError::InvalidState(_))));
        assert_eq!(request.status, PurchaseStatus::Approved);
        assert!(request.admin_note.is_none());

        let mut fresh = pending();
        let to_pending = PurchaseRequestWorkflow::decide(&mut fresh, PurchaseStatus::Pending, None);
        assert!(matches!(to_pending, Err(AppError::InvalidState(_))));
        assert!(fresh.is_pending());
    }
}
