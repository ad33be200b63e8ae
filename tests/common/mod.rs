// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use coinvault::application::CoinService;
use coinvault::config::CoinConfig;
use coinvault::domain::{NewPurchaseRequest, PaymentMethod, UserId, Wallet};
use tempfile::TempDir;
use uuid::Uuid;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(CoinService, TempDir)> {
    test_service_with(|config| config).await
}

/// Same as `test_service`, with a chance to tweak the config first
pub async fn test_service_with(
    configure: impl FnOnce(CoinConfig) -> CoinConfig,
) -> Result<(CoinService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let config = configure(CoinConfig::new(db_path.to_str().unwrap()));
    let service = CoinService::init(config).await?;
    Ok((service, temp_dir))
}

/// Create a wallet for a fresh user and credit it through an approved purchase
pub async fn funded_user(service: &CoinService, coins: i64) -> Result<(UserId, Wallet)> {
    let user = Uuid::new_v4();
    fund(service, user, coins).await?;
    let wallet = service.get_wallet(user).await?;
    Ok((user, wallet))
}

/// Credit `coins` to a user's wallet via create + approve
pub async fn fund(service: &CoinService, user: UserId, coins: i64) -> Result<()> {
    let request = service
        .create_purchase_request(purchase(user, coins))
        .await?;
    service.approve_purchase_request(request.id, None).await?;
    Ok(())
}

/// A purchase request with a unique payment reference
pub fn purchase(user: UserId, coins: i64) -> NewPurchaseRequest {
    NewPurchaseRequest {
        user_id: user,
        package_id: None,
        coin_amount: coins,
        paid_amount: coins,
        payment_reference: format!("pay-{}", Uuid::new_v4()),
        payment_method: PaymentMethod::BankTransfer,
    }
}
