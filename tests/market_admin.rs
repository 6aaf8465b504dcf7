mod common;

use common::*;
use rust_decimal_macros::dec;
use stockledger::domain::OrderSide;
use stockledger::error::TradeRejection;

#[tokio::test]
async fn suspended_instrument_refuses_trades_until_resumed() {
    let h = harness().await;
    let admin = &h.ledger.admin;

    let suspended = admin.suspend(ACME, ADMIN, "earnings pending").await.unwrap();
    assert!(suspended.suspended);

    let err = h
        .ledger
        .engine
        .execute(ALICE, ACME, OrderSide::Buy, 1)
        .await
        .unwrap_err();
    assert_eq!(
        err.rejection(),
        Some(&TradeRejection::InstrumentSuspended {
            symbol: "ACME".to_string(),
            reason: "earnings pending".to_string()
        })
    );
    assert_eq!(h.balance(ALICE).await, dec!(1000.00));

    // Other instruments are unaffected
    assert!(h
        .ledger
        .engine
        .execute(ALICE, GLOBEX, OrderSide::Buy, 1)
        .await
        .is_ok());

    let resumed = admin.resume(ACME, ADMIN).await.unwrap();
    assert!(!resumed.suspended);
    assert!(resumed.suspension_reason.is_none());
    assert!(h
        .ledger
        .engine
        .execute(ALICE, ACME, OrderSide::Buy, 1)
        .await
        .is_ok());
}

#[tokio::test]
async fn suspend_and_resume_reject_redundant_calls() {
    let h = harness().await;
    let admin = &h.ledger.admin;

    let err = admin.resume(ACME, ADMIN).await.unwrap_err();
    assert_eq!(
        err.rejection(),
        Some(&TradeRejection::InstrumentNotSuspended {
            symbol: "ACME".to_string()
        })
    );

    admin.suspend(ACME, ADMIN, "halt").await.unwrap();
    let err = admin.suspend(ACME, ADMIN, "again").await.unwrap_err();
    assert!(matches!(
        err.rejection(),
        Some(TradeRejection::InstrumentSuspended { .. })
    ));
}

#[tokio::test]
async fn set_price_reports_change() {
    let h = harness().await;
    let change = h
        .ledger
        .admin
        .set_price(ACME, ADMIN, dec!(105.23), "news")
        .await
        .unwrap();

    assert_eq!(change.old_price, dec!(100.00));
    assert_eq!(change.new_price, dec!(105.23));
    assert_eq!(change.change_pct, dec!(5.23));
    assert_eq!(h.price(ACME).await, dec!(105.23));

    // Next trade executes at the new price
    let order = h
        .ledger
        .engine
        .execute(ALICE, ACME, OrderSide::Buy, 1)
        .await
        .unwrap();
    assert_eq!(order.price, dec!(105.23));
}

#[tokio::test]
async fn set_price_below_floor_is_rejected() {
    let h = harness().await;
    let err = h
        .ledger
        .admin
        .set_price(ACME, ADMIN, dec!(0.001), "crash")
        .await
        .unwrap_err();
    assert_eq!(
        err.rejection(),
        Some(&TradeRejection::InvalidPrice {
            price: dec!(0.001),
            floor: dec!(0.01)
        })
    );
    assert_eq!(h.price(ACME).await, dec!(100.00));
}

#[tokio::test]
async fn admin_actions_require_admin_role() {
    let h = harness().await;
    let admin = &h.ledger.admin;
    let not_authorized = Some(TradeRejection::NotAuthorized {
        account_id: ALICE.get(),
    });

    let err = admin.suspend(ACME, ALICE, "mine now").await.unwrap_err();
    assert_eq!(err.rejection().cloned(), not_authorized);
    let err = admin
        .set_price(ACME, ALICE, dec!(1), "cheap")
        .await
        .unwrap_err();
    assert_eq!(err.rejection().cloned(), not_authorized);
    assert_eq!(h.price(ACME).await, dec!(100.00));
}

#[tokio::test]
async fn instruments_are_listed_and_found_by_symbol() {
    let h = harness().await;
    h.ledger
        .admin
        .suspend(GLOBEX, ADMIN, "halted")
        .await
        .unwrap();
    h.ledger
        .engine
        .execute(ALICE, ACME, OrderSide::Buy, 2)
        .await
        .unwrap();

    let listed = h.ledger.market.instruments().await.unwrap();
    let symbols: Vec<&str> = listed.iter().map(|i| i.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["ACME", "GLBX"]);
    assert!(listed[1].suspended, "suspended instruments are still listed");

    let acme = h.ledger.market.instrument("acme").await.unwrap();
    assert_eq!(acme.id, ACME);
    assert_eq!(acme.price, dec!(100.02));

    let err = h.ledger.market.instrument("NOPE").await.unwrap_err();
    assert_eq!(
        err.rejection(),
        Some(&TradeRejection::SymbolNotFound {
            symbol: "NOPE".to_string()
        })
    );
}
