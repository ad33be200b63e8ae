mod common;

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use coinvault::application::AppError;
use common::{funded_user, test_service};
use uuid::Uuid;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_gifts_cannot_overdraw() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    let (sender, sender_wallet) = funded_user(&service, 100).await?;

    let mut handles = Vec::new();
    for _ in 0..2 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            let recipient = Uuid::new_v4();
            service
                .send_gift(sender, recipient, service.gift_request("rose", 60))
                .await
        }));
    }

    let mut succeeded = 0;
    let mut insufficient = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => succeeded += 1,
            Err(AppError::InsufficientFunds { .. }) => insufficient += 1,
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(insufficient, 1);
    assert_eq!(service.get_balance(sender_wallet.id).await?, 40);
    assert!(service.verify_wallet(sender_wallet.id).await?.is_valid());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_chain_stays_linked_under_concurrent_writes() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    let wallet = service.create_wallet(Uuid::new_v4()).await?;

    let mut handles = Vec::new();
    for i in 0..20 {
        let service = Arc::clone(&service);
        let wallet_id = wallet.id;
        handles.push(tokio::spawn(async move {
            service
                .admin_adjust(wallet_id, 10, &format!("credit-{}", i), None)
                .await
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let history = service.ledger().wallet_history(wallet.id).await?;
    assert_eq!(history.len(), 20);
    for pair in history.windows(2) {
        assert_eq!(pair[0].balance_after, pair[1].balance_before);
        assert_eq!(pair[0].sequence + 1, pair[1].sequence);
    }
    assert_eq!(service.get_balance(wallet.id).await?, 200);
    assert!(service.verify_wallet(wallet.id).await?.is_valid());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_direction_gifts_complete() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    let (alice, alice_wallet) = funded_user(&service, 1_000).await?;
    let (bob, bob_wallet) = funded_user(&service, 1_000).await?;

    let mut handles = Vec::new();
    for i in 0..10 {
        let service = Arc::clone(&service);
        let (from, to) = if i % 2 == 0 { (alice, bob) } else { (bob, alice) };
        handles.push(tokio::spawn(async move {
            service
                .send_gift(from, to, service.gift_request("rose", 10))
                .await
        }));
    }
    for handle in handles {
        handle.await??;
    }

    // Each side sent 5 x 10 and received 5 x 7
    assert_eq!(service.get_balance(alice_wallet.id).await?, 985);
    assert_eq!(service.get_balance(bob_wallet.id).await?, 985);
    assert_eq!(service.platform_wallet().await?.balance, 30);

    let report = service.check_integrity().await?;
    assert!(report.is_healthy());
    assert_eq!(report.total_coins, 2_000);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_access_creates_one_wallet() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    let user = Uuid::new_v4();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move { service.create_wallet(user).await }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        ids.insert(handle.await??.id);
    }
    assert_eq!(ids.len(), 1);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_retries_of_one_gift_apply_once() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    let (sender, sender_wallet) = funded_user(&service, 500).await?;
    let recipient = Uuid::new_v4();
    let key = Uuid::new_v4();

    let mut handles = Vec::new();
    for _ in 0..6 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            let request = service.gift_request("rose", 100).with_idempotency_key(key);
            service.send_gift(sender, recipient, request).await
        }));
    }

    let mut fresh = 0;
    for handle in handles {
        let gift = handle.await??;
        assert_eq!(gift.id, key);
        if !gift.replayed {
            fresh += 1;
        }
    }

    assert_eq!(fresh, 1);
    assert_eq!(service.get_balance(sender_wallet.id).await?, 400);
    assert_eq!(service.get_wallet(recipient).await?.balance, 70);

    Ok(())
}
