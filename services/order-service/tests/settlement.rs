//! Settlement outcomes, compensation and the deposit feed

mod common;

use common::*;
use matching_engine::events::{ClientMessage, SignatureResponse, TradeSignature};
use order_service::settlement::SettlementState;
use order_service::{
    ChainOutcome, DepositQueue, MemoryDepositQueue, OrderService, ServiceConfig, Storage,
    SubmitStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use types::deposit::{DepositStatus, DepositTransaction};
use types::errors::{ErrorCode, TransportError};
use types::numeric::Amount;
use types::order::{OrderStatus, Side};
use types::trade::TradeStatus;

/// Alice rests a sell, Bob crosses it; returns Bob's signature request
async fn cross(
    harness: &Harness,
    alice: &mut Client,
    bob: &mut Client,
    amount: u128,
) -> matching_engine::events::SignatureRequest {
    harness
        .service
        .handle(
            alice.connection,
            ClientMessage::NewOrder(order(ALICE, Side::SELL, amount, 5_000_000, 1)),
        )
        .await
        .unwrap();
    alice.expect_added().await;
    harness
        .service
        .handle(
            bob.connection,
            ClientMessage::NewOrder(order(BOB, Side::BUY, amount, 5_000_000, 1)),
        )
        .await
        .unwrap();
    bob.expect_signature_request().await
}

#[tokio::test]
async fn test_chain_rejection_compensates_and_rematches() {
    let chain = ScriptedChain::new().then(Ok(SubmitStatus::Failed {
        reason: "insufficient allowance".to_string(),
    }));
    let harness = Harness::with(config(), chain);
    let mut alice = harness.client(ALICE);
    let mut bob = harness.client(BOB);

    let request = cross(&harness, &mut alice, &mut bob, 100).await;
    let failed = request.matches[0].trade.clone();
    harness
        .service
        .handle(bob.connection, ClientMessage::SubmitSignature(sign_request(BOB, &request)))
        .await
        .unwrap();

    alice.expect_error(ErrorCode::SettlementFailed).await;
    bob.expect_error(ErrorCode::SettlementFailed).await;

    // the maker is reopened and rests again, then the taker re-enters and
    // crosses it with a fresh trade
    let reopened = alice.expect_added().await;
    assert_eq!(reopened.hash, failed.maker_order_hash);
    assert_eq!(reopened.filled_amount, Amount::ZERO);
    let retry = bob.expect_signature_request().await;
    assert_eq!(retry.matches.len(), 1);
    assert_ne!(retry.matches[0].trade.hash, failed.hash);
    assert_eq!(retry.matches[0].trade.amount, Amount::new(100));

    let stored = harness.store.get_trade_by_hash(&failed.hash).await.unwrap().unwrap();
    assert_eq!(stored.status, TradeStatus::FAILED);

    harness
        .service
        .handle(bob.connection, ClientMessage::SubmitSignature(sign_request(BOB, &retry)))
        .await
        .unwrap();
    bob.expect_pending().await;
    bob.expect_success().await;
    assert_eq!(harness.chain.submitted().len(), 2);
}

#[tokio::test]
async fn test_invalid_taker_signature_fails_trade() {
    let harness = Harness::new();
    let mut alice = harness.client(ALICE);
    let mut bob = harness.client(BOB);

    let request = cross(&harness, &mut alice, &mut bob, 50).await;
    let trade_hash = request.matches[0].trade.hash;
    harness
        .service
        .handle(
            bob.connection,
            ClientMessage::SubmitSignature(sign_request(CAROL, &request)),
        )
        .await
        .unwrap();

    bob.expect_error(ErrorCode::InvalidSignature).await;
    alice.expect_error(ErrorCode::SettlementFailed).await;

    // Bob's order is withdrawn, Alice's ask goes back on the book
    let withdrawn = bob.expect_cancelled().await;
    assert_eq!(withdrawn.hash, request.taker_order_hash);
    assert_eq!(withdrawn.filled_amount, Amount::ZERO);
    let reopened = alice.expect_added().await;
    assert_eq!(reopened.remaining(), Amount::new(50));

    let stored = harness.store.get_trade_by_hash(&trade_hash).await.unwrap().unwrap();
    assert_eq!(stored.status, TradeStatus::FAILED);
    assert!(harness.chain.submitted().is_empty());
    assert_eq!(harness.store.trade_count(), 1);
    bob.assert_quiet();
}

#[tokio::test]
async fn test_signature_from_non_taker_is_refused() {
    let harness = Harness::new();
    let mut alice = harness.client(ALICE);
    let mut bob = harness.client(BOB);

    let request = cross(&harness, &mut alice, &mut bob, 50).await;
    // the maker tries to sign on the taker's behalf
    harness
        .service
        .handle(
            alice.connection,
            ClientMessage::SubmitSignature(sign_request(ALICE, &request)),
        )
        .await
        .unwrap();
    alice.expect_error(ErrorCode::Unauthorized).await;

    // the trade is still waiting for Bob
    let trade_hash = request.matches[0].trade.hash;
    assert!(harness.service.settlement().ledger().get(&trade_hash).is_some());
    harness
        .service
        .handle(bob.connection, ClientMessage::SubmitSignature(sign_request(BOB, &request)))
        .await
        .unwrap();
    bob.expect_pending().await;
    bob.expect_success().await;
}

#[tokio::test]
async fn test_signature_for_unknown_order() {
    let harness = Harness::new();
    let mut bob = harness.client(BOB);
    let hash = types::ids::Hash::from_bytes([0x11; 32]);

    let result = harness
        .service
        .handle(
            bob.connection,
            ClientMessage::SubmitSignature(SignatureResponse {
                taker_order_hash: hash,
                trades: vec![TradeSignature {
                    trade_hash: hash,
                    signature: wallet(BOB).sign_hash(&hash),
                }],
                remaining_order: None,
            }),
        )
        .await;
    assert_eq!(result.unwrap_err().code(), ErrorCode::TradeNotFound);
    bob.expect_error(ErrorCode::TradeNotFound).await;
}

#[tokio::test]
async fn test_pending_submission_confirms_later() {
    let chain = ScriptedChain::new().then(Ok(SubmitStatus::Pending {
        tx_ref: "0xfeed".to_string(),
    }));
    let harness = Harness::with(config(), chain);
    let mut alice = harness.client(ALICE);
    let mut bob = harness.client(BOB);

    let request = cross(&harness, &mut alice, &mut bob, 100).await;
    let trade_hash = request.matches[0].trade.hash;
    harness
        .service
        .handle(bob.connection, ClientMessage::SubmitSignature(sign_request(BOB, &request)))
        .await
        .unwrap();

    let pending = bob.expect_pending().await;
    assert_eq!(pending.tx_ref.as_deref(), Some("0xfeed"));
    alice.expect_pending().await;
    let stored = harness.store.get_trade_by_hash(&trade_hash).await.unwrap().unwrap();
    assert_eq!(stored.status, TradeStatus::PENDING);
    assert_eq!(stored.tx_ref.as_deref(), Some("0xfeed"));

    harness
        .service
        .settlement()
        .on_chain_event(
            &trade_hash,
            ChainOutcome::Confirmed {
                tx_ref: "0xfeed".to_string(),
            },
        )
        .await
        .unwrap();
    bob.expect_success().await;
    alice.expect_success().await;

    let stored = harness.store.get_trade_by_hash(&trade_hash).await.unwrap().unwrap();
    assert_eq!(stored.status, TradeStatus::SUCCESS);
    assert!(harness.service.settlement().ledger().is_empty());

    // a second confirmation finds nothing to settle
    let again = harness
        .service
        .settlement()
        .on_chain_event(
            &trade_hash,
            ChainOutcome::Confirmed {
                tx_ref: "0xfeed".to_string(),
            },
        )
        .await;
    assert!(again.is_err());
}

#[tokio::test]
async fn test_reverted_submission_compensates() {
    let chain = ScriptedChain::new().then(Ok(SubmitStatus::Pending {
        tx_ref: "0xdead".to_string(),
    }));
    let harness = Harness::with(config(), chain);
    let mut alice = harness.client(ALICE);
    let mut bob = harness.client(BOB);

    let request = cross(&harness, &mut alice, &mut bob, 100).await;
    let trade_hash = request.matches[0].trade.hash;
    harness
        .service
        .handle(bob.connection, ClientMessage::SubmitSignature(sign_request(BOB, &request)))
        .await
        .unwrap();
    bob.expect_pending().await;
    alice.expect_pending().await;

    harness
        .service
        .settlement()
        .on_chain_event(
            &trade_hash,
            ChainOutcome::Reverted {
                reason: "out of gas".to_string(),
            },
        )
        .await
        .unwrap();
    alice.expect_error(ErrorCode::SettlementFailed).await;
    alice.expect_added().await;
    bob.expect_error(ErrorCode::SettlementFailed).await;
    bob.expect_signature_request().await;

    let stored = harness.store.get_trade_by_hash(&trade_hash).await.unwrap().unwrap();
    assert_eq!(stored.status, TradeStatus::FAILED);
}

#[tokio::test]
async fn test_transport_error_then_resubmit() {
    let chain = ScriptedChain::new().then(Err(TransportError::Unavailable("rpc down".to_string())));
    let harness = Harness::with(config(), chain);
    let mut alice = harness.client(ALICE);
    let mut bob = harness.client(BOB);

    let request = cross(&harness, &mut alice, &mut bob, 100).await;
    let trade_hash = request.matches[0].trade.hash;
    harness
        .service
        .handle(bob.connection, ClientMessage::SubmitSignature(sign_request(BOB, &request)))
        .await
        .unwrap();

    let chain = harness.chain.clone();
    eventually(|| {
        let chain = chain.clone();
        async move { chain.submitted().len() == 1 }
    })
    .await;
    bob.assert_quiet();
    let ledger = harness.service.settlement().ledger().clone();
    eventually(|| {
        let ledger = ledger.clone();
        async move {
            matches!(
                ledger.get(&trade_hash).map(|r| r.state),
                Some(SettlementState::Signed { .. })
            )
        }
    })
    .await;

    harness
        .service
        .settlement()
        .resubmit(&trade_hash)
        .await
        .unwrap();
    bob.expect_pending().await;
    bob.expect_success().await;
    assert_eq!(harness.chain.submitted().len(), 2);
}

#[tokio::test]
async fn test_unsigned_trades_expire() {
    let config = ServiceConfig {
        signature_timeout_secs: Some(1),
        reaper_interval_ms: 50,
        ..config()
    };
    let harness = Harness::with(config, ScriptedChain::new());
    let mut alice = harness.client(ALICE);
    let mut bob = harness.client(BOB);

    let request = cross(&harness, &mut alice, &mut bob, 100).await;
    let trade_hash = request.matches[0].trade.hash;

    // nobody signs
    alice.expect_error(ErrorCode::SettlementFailed).await;
    bob.expect_error(ErrorCode::SettlementFailed).await;
    let withdrawn = bob.expect_cancelled().await;
    assert_eq!(withdrawn.hash, request.taker_order_hash);
    let reopened = alice.expect_added().await;
    assert_eq!(reopened.hash, request.matches[0].maker_order.hash);

    let stored = harness.store.get_trade_by_hash(&trade_hash).await.unwrap().unwrap();
    assert_eq!(stored.status, TradeStatus::FAILED);

    // several reaper periods later the ask still rests and nothing re-matched
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert_eq!(harness.store.trade_count(), 1);
    assert!(harness.service.settlement().ledger().is_empty());
    let snapshot = harness.service.snapshot(&pair().name(), 10).await.unwrap();
    assert_eq!(snapshot.asks.len(), 1);
    assert_eq!(snapshot.asks[0].total_remaining, Amount::new(100));
    assert!(snapshot.bids.is_empty());
    let taker = harness
        .store
        .get_order_by_hash(&request.taker_order_hash)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(taker.status, OrderStatus::Cancelled);
    alice.assert_quiet();
    bob.assert_quiet();
}

#[tokio::test]
async fn test_signed_trade_is_not_reaped_while_submitting() {
    let gate = Arc::new(Notify::new());
    let config = ServiceConfig {
        signature_timeout_secs: Some(1),
        reaper_interval_ms: 50,
        ..config()
    };
    let harness = Harness::with(config, ScriptedChain::new().gated(gate.clone()));
    let mut alice = harness.client(ALICE);
    let mut bob = harness.client(BOB);

    let request = cross(&harness, &mut alice, &mut bob, 100).await;
    let trade_hash = request.matches[0].trade.hash;
    harness
        .service
        .handle(bob.connection, ClientMessage::SubmitSignature(sign_request(BOB, &request)))
        .await
        .unwrap();

    let chain = harness.chain.clone();
    eventually(|| {
        let chain = chain.clone();
        async move { chain.submitted().len() == 1 }
    })
    .await;

    // the chain sits on the trade past the signature timeout
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    alice.assert_quiet();
    bob.assert_quiet();
    let record = harness.service.settlement().ledger().get(&trade_hash).unwrap();
    assert!(matches!(record.state, SettlementState::Submitting { .. }));

    gate.notify_one();
    bob.expect_pending().await;
    bob.expect_success().await;
    let stored = harness.store.get_trade_by_hash(&trade_hash).await.unwrap().unwrap();
    assert_eq!(stored.status, TradeStatus::SUCCESS);
    assert_eq!(harness.store.trade_count(), 1);
}

#[tokio::test]
async fn test_confirmation_while_submission_in_flight() {
    let gate = Arc::new(Notify::new());
    let harness = Harness::with(config(), ScriptedChain::new().gated(gate.clone()));
    let mut alice = harness.client(ALICE);
    let mut bob = harness.client(BOB);

    let request = cross(&harness, &mut alice, &mut bob, 100).await;
    let trade_hash = request.matches[0].trade.hash;
    harness
        .service
        .handle(bob.connection, ClientMessage::SubmitSignature(sign_request(BOB, &request)))
        .await
        .unwrap();

    let chain = harness.chain.clone();
    eventually(|| {
        let chain = chain.clone();
        async move { chain.submitted().len() == 1 }
    })
    .await;

    // the watcher sees the transaction before submit_trade returns
    harness
        .service
        .settlement()
        .on_chain_event(
            &trade_hash,
            ChainOutcome::Confirmed {
                tx_ref: "0xbeef".to_string(),
            },
        )
        .await
        .unwrap();
    bob.expect_success().await;
    alice.expect_success().await;

    gate.notify_one();
    tokio::time::sleep(Duration::from_millis(200)).await;
    bob.assert_quiet();
    alice.assert_quiet();
    let stored = harness.store.get_trade_by_hash(&trade_hash).await.unwrap().unwrap();
    assert_eq!(stored.status, TradeStatus::SUCCESS);
    assert_eq!(stored.tx_ref.as_deref(), Some("0xbeef"));
    assert!(harness.service.settlement().ledger().is_empty());
}

#[tokio::test]
async fn test_storage_failure_leaves_book_untouched() {
    init_tracing();
    let store = Arc::new(FlakyStore::new());
    store.inner().insert_pair(pair());
    let service = OrderService::new(config(), store.clone(), Arc::new(ScriptedChain::new())).unwrap();

    let (alice_conn, _alice_events) = service.connect(wallet(ALICE).address());
    let (bob_conn, mut bob_events) = service.connect(wallet(BOB).address());

    let sell = order(ALICE, Side::SELL, 100, 5_000_000, 1);
    service
        .handle(alice_conn, ClientMessage::NewOrder(sell.clone()))
        .await
        .unwrap();
    store.fail_trades(true);
    let buy = order(BOB, Side::BUY, 60, 5_000_000, 1);
    service
        .handle(bob_conn, ClientMessage::NewOrder(buy.clone()))
        .await
        .unwrap();

    let event = tokio::time::timeout(std::time::Duration::from_secs(5), bob_events.recv())
        .await
        .unwrap()
        .unwrap()
        .event;
    match event {
        matching_engine::EngineEvent::Error(payload) => {
            assert_eq!(payload.code, ErrorCode::StorageUnavailable)
        }
        other => panic!("expected ERROR, got {other:?}"),
    }

    let snapshot = service.snapshot(&pair().name(), 10).await.unwrap();
    assert_eq!(snapshot.asks.len(), 1);
    assert_eq!(snapshot.asks[0].total_remaining, Amount::new(100));
    assert!(snapshot.bids.is_empty());
    assert_eq!(store.inner().trade_count(), 0);

    let maker = store.get_order_by_hash(&sell.hash).await.unwrap().unwrap();
    assert_eq!(maker.status, OrderStatus::Open);
    assert_eq!(maker.filled_amount, Amount::ZERO);
    let taker = store.get_order_by_hash(&buy.hash).await.unwrap().unwrap();
    assert_eq!(taker.status, OrderStatus::Rejected);
}

#[tokio::test]
async fn test_worker_hydrates_persisted_book() {
    init_tracing();
    let store = Arc::new(order_service::MemoryStore::new());
    store.insert_pair(pair());

    let mut resting = order(ALICE, Side::SELL, 25, 5_000_000, 1);
    resting.status = OrderStatus::Open;
    store.create_order(&resting).await.unwrap();

    let service = OrderService::new(config(), store.clone(), Arc::new(ScriptedChain::new())).unwrap();
    let snapshot = service.snapshot(&pair().name(), 10).await.unwrap();
    assert_eq!(snapshot.asks.len(), 1);
    assert_eq!(snapshot.asks[0].total_remaining, Amount::new(25));
    assert_eq!(service.router().worker_count(), 1);
}

#[tokio::test]
async fn test_deposits_credit_once() {
    let harness = Harness::new();
    let queue = MemoryDepositQueue::new();
    harness.service.spawn_deposit_consumer(&queue).unwrap();

    let account = wallet(ALICE).address();
    let token = pair().quote_token_address;
    let deposit = |tx_ref: &str, amount: u128| DepositTransaction {
        tx_ref: tx_ref.to_string(),
        chain: "ethereum".to_string(),
        address: account,
        token,
        amount: Amount::new(amount),
        status: DepositStatus::SUCCESS,
        created_at: 0,
    };

    queue.publish(deposit("0xaa", 70)).await.unwrap();
    queue.publish(deposit("0xaa", 70)).await.unwrap();
    queue.publish(deposit("0xbb", 30)).await.unwrap();

    let store = harness.store.clone();
    eventually(|| {
        let store = store.clone();
        async move {
            store
                .get_account(&account)
                .await
                .unwrap()
                .map(|a| a.balance(&token) == Amount::new(100))
                .unwrap_or(false)
        }
    })
    .await;

    // a late redelivery changes nothing
    queue.publish(deposit("0xbb", 30)).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let balance = harness
        .store
        .get_account(&account)
        .await
        .unwrap()
        .unwrap()
        .balance(&token);
    assert_eq!(balance, Amount::new(100));
}
