mod common;

use common::*;
use rust_decimal_macros::dec;
use stockledger::domain::{OrderId, OrderSide, OrderStatus};
use stockledger::error::TradeRejection;

/// Cancelling refunds cash only; the holding and the price impact stay.
#[tokio::test]
async fn cancel_refunds_cash_but_keeps_holding_and_price() {
    let h = harness().await;
    let order = h
        .ledger
        .engine
        .execute(ALICE, ACME, OrderSide::Buy, 10)
        .await
        .unwrap();

    let compensation = h
        .ledger
        .compensation
        .cancel(order.id.unwrap(), ADMIN, "duplicate submission")
        .await
        .unwrap();

    assert_eq!(compensation.amount, dec!(1000.00));
    assert_eq!(compensation.account_id, ALICE);
    assert_eq!(compensation.admin_id, ADMIN);
    assert_eq!(compensation.reason, "duplicate submission");
    assert!(compensation.rollback_executed);

    assert_eq!(h.balance(ALICE).await, dec!(1000.00));
    assert_eq!(h.holding(ALICE, ACME).await.unwrap().quantity, 10);
    assert_eq!(h.price(ACME).await, dec!(100.10));

    let orders = h.store.all_orders().await;
    assert_eq!(orders[0].status, OrderStatus::Cancelled);
    let stored = h.store.all_compensations().await;
    assert_eq!(stored.len(), 1);
    assert!(stored[0].rollback_executed);
}

#[tokio::test]
async fn cancel_twice_credits_once() {
    let h = harness().await;
    let order = h
        .ledger
        .engine
        .execute(ALICE, ACME, OrderSide::Buy, 10)
        .await
        .unwrap();
    let order_id = order.id.unwrap();

    h.ledger
        .compensation
        .cancel(order_id, ADMIN, "first")
        .await
        .unwrap();
    let err = h
        .ledger
        .compensation
        .cancel(order_id, ADMIN, "second")
        .await
        .unwrap_err();

    assert_eq!(
        err.rejection(),
        Some(&TradeRejection::OrderNotCompleted {
            order_id: order_id.get(),
            status: "CANCELLED".to_string()
        })
    );
    assert_eq!(h.balance(ALICE).await, dec!(1000.00));
    assert_eq!(h.store.all_compensations().await.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_cancellations_credit_once() {
    let h = harness().await;
    let order = h
        .ledger
        .engine
        .execute(ALICE, ACME, OrderSide::Buy, 10)
        .await
        .unwrap();
    let order_id = order.id.unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let ledger = h.ledger.clone();
            tokio::spawn(async move {
                ledger
                    .compensation
                    .cancel(order_id, ADMIN, &format!("attempt {i}"))
                    .await
            })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(h.balance(ALICE).await, dec!(1000.00));
}

#[tokio::test]
async fn only_admins_may_cancel() {
    let h = harness().await;
    let order = h
        .ledger
        .engine
        .execute(ALICE, ACME, OrderSide::Buy, 1)
        .await
        .unwrap();

    let err = h
        .ledger
        .compensation
        .cancel(order.id.unwrap(), BOB, "not mine")
        .await
        .unwrap_err();
    assert_eq!(
        err.rejection(),
        Some(&TradeRejection::NotAuthorized {
            account_id: BOB.get()
        })
    );
    assert_eq!(h.store.all_orders().await[0].status, OrderStatus::Completed);
}

#[tokio::test]
async fn unknown_order_is_rejected() {
    let h = harness().await;
    let err = h
        .ledger
        .compensation
        .cancel(OrderId(999), ADMIN, "typo")
        .await
        .unwrap_err();
    assert_eq!(
        err.rejection(),
        Some(&TradeRejection::OrderNotFound { order_id: 999 })
    );
}

#[tokio::test]
async fn sell_orders_refund_their_notional_too() {
    let h = harness().await;
    let engine = &h.ledger.engine;
    engine.execute(BOB, ACME, OrderSide::Buy, 5).await.unwrap();
    let sell = engine.execute(BOB, ACME, OrderSide::Sell, 5).await.unwrap();
    let balance = h.balance(BOB).await;

    let compensation = h
        .ledger
        .compensation
        .cancel(sell.id.unwrap(), ADMIN, "reversal")
        .await
        .unwrap();

    // 5 x 100.05
    assert_eq!(compensation.amount, dec!(500.25));
    assert_eq!(h.balance(BOB).await, balance + dec!(500.25));
}
