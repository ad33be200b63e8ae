mod common;

use anyhow::Result;
use coinvault::application::CoinService;
use coinvault::domain::{ChainIssue, CommissionRate};
use common::{funded_user, test_service, test_service_with};
use uuid::Uuid;

#[tokio::test]
async fn test_integrity_after_mixed_activity() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, alice_wallet) = funded_user(&service, 1_000).await?;
    let (bob, _) = funded_user(&service, 300).await?;

    service
        .send_gift(alice, bob, service.gift_request("rose", 100))
        .await?;
    service
        .send_gift(bob, alice, service.gift_request("star", 55))
        .await?;
    service
        .admin_adjust(alice_wallet.id, -45, "refund-1", None)
        .await?;

    let report = service.check_integrity().await?;
    assert!(report.is_healthy());
    assert_eq!(report.wallet_count, 3);
    // 2 funding + 2 x 3 gift legs + 1 adjustment
    assert_eq!(report.entry_count, 9);
    assert_eq!(report.total_coins, 1_255);
    assert_eq!(report.net_issued, report.total_coins);

    Ok(())
}

#[tokio::test]
async fn test_verify_detects_balance_drift() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (_, wallet) = funded_user(&service, 100).await?;

    sqlx::query("UPDATE wallets SET balance = 999 WHERE id = ?")
        .bind(wallet.id.to_string())
        .execute(service.repository().pool())
        .await?;

    let report = service.verify_wallet(wallet.id).await?;
    assert!(!report.is_valid());
    assert!(report.issues.contains(&ChainIssue::BalanceDrift {
        stored: 999,
        replayed: 100,
    }));

    let integrity = service.check_integrity().await?;
    assert!(!integrity.is_healthy());
    assert_eq!(integrity.invalid_wallets.len(), 1);
    assert_eq!(integrity.invalid_wallets[0].wallet_id, wallet.id);

    Ok(())
}

#[tokio::test]
async fn test_reconcile_repairs_drifted_stats() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, alice_wallet) = funded_user(&service, 500).await?;
    let bob = Uuid::new_v4();

    service
        .send_gift(alice, bob, service.gift_request("rose", 100))
        .await?;
    service
        .send_gift(alice, bob, service.gift_request("rose", 100))
        .await?;

    let clean = service.reconcile_stats().await?;
    assert_eq!(clean.wallets_corrected, 0);
    assert_eq!(clean.wallets_checked, 3);

    sqlx::query("UPDATE wallet_stats SET gifts_sent = 17, coins_spent = 3 WHERE wallet_id = ?")
        .bind(alice_wallet.id.to_string())
        .execute(service.repository().pool())
        .await?;
    assert_eq!(service.get_stats(alice_wallet.id).await?.gifts_sent, 17);

    let summary = service.reconcile_stats().await?;
    assert_eq!(summary.wallets_corrected, 1);

    let stats = service.get_stats(alice_wallet.id).await?;
    assert_eq!(stats.gifts_sent, 2);
    assert_eq!(stats.coins_spent, 200);

    // Missing rows are rebuilt too
    sqlx::query("DELETE FROM wallet_stats")
        .execute(service.repository().pool())
        .await?;
    let rebuilt = service.reconcile_stats().await?;
    assert_eq!(rebuilt.wallets_corrected, 2);
    let bob_wallet = service.get_wallet(bob).await?;
    assert_eq!(service.get_stats(bob_wallet.id).await?.coins_earned, 140);

    Ok(())
}

#[tokio::test]
async fn test_configured_default_rate_applies() -> Result<()> {
    let (service, _temp) =
        test_service_with(|config| config.with_commission_rate(CommissionRate::new(10).unwrap()))
            .await?;
    let (sender, _) = funded_user(&service, 100).await?;

    let gift = service
        .send_gift(sender, Uuid::new_v4(), service.gift_request("rose", 100))
        .await?;
    assert_eq!(gift.commission, 10);
    assert_eq!(gift.recipient_received, 90);

    Ok(())
}

#[tokio::test]
async fn test_reopening_database_keeps_state() -> Result<()> {
    let (service, temp) = test_service().await?;
    let (user, wallet) = funded_user(&service, 250).await?;
    let config = service.config().clone();
    drop(service);

    let reopened = CoinService::connect(config).await?;
    assert_eq!(reopened.get_wallet(user).await?.balance, 250);
    assert!(reopened.verify_wallet(wallet.id).await?.is_valid());
    drop(temp);

    Ok(())
}
