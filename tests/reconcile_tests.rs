use chrono::NaiveDate;
use pocket_ledger::core::{
    reconcile, LedgerEngine, TransactionDraft, TransactionKind, Wallet, WalletKind,
};
use pocket_ledger::stores::{LedgerStore, MemoryStore};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn engine_managed_balances_audit_clean() {
    let store = MemoryStore::new();
    let wallet = Wallet::new("owner", "main", WalletKind::Bank, "IDR", 250_000);
    let wallet_id = wallet.id;
    store.insert_wallet(wallet).unwrap();
    let engine = LedgerEngine::new(store);

    let tx = engine
        .create(TransactionDraft {
            owner: "owner".into(),
            wallet_id,
            amount: 60_000,
            kind: TransactionKind::Expense,
            category: Some("food".into()),
            classification: None,
            date: date(2024, 6, 2),
            note: None,
        })
        .unwrap();
    engine.delete(tx.id).unwrap();

    assert!(reconcile::audit(engine.store(), "owner").unwrap().is_empty());
}

#[test]
fn out_of_band_balance_writes_are_detected_and_repaired() {
    let store = MemoryStore::new();
    let wallet = Wallet::new("owner", "main", WalletKind::Bank, "IDR", 250_000);
    let wallet_id = wallet.id;
    store.insert_wallet(wallet).unwrap();

    // Simulate a writer that bypassed the ledger engine and moved the cached
    // balance without recording any transaction.
    store
        .atomically(|scope| {
            scope.apply_delta(&wallet_id, -40_000)?;
            Ok(())
        })
        .unwrap();

    let drifts = reconcile::audit(&store, "owner").unwrap();
    assert_eq!(drifts.len(), 1);
    assert_eq!(drifts[0].wallet_id, wallet_id);
    assert_eq!(drifts[0].cached, 210_000);
    assert_eq!(drifts[0].computed, 250_000);
    assert_eq!(drifts[0].delta(), 40_000);

    let repaired = reconcile::repair(&store, "owner").unwrap();
    assert_eq!(repaired.len(), 1);
    assert_eq!(store.wallet(&wallet_id).unwrap().balance, 250_000);
    assert!(reconcile::audit(&store, "owner").unwrap().is_empty());
}

#[test]
fn repair_accounts_for_transfers_into_the_wallet() {
    let store = MemoryStore::new();
    let source = Wallet::new("owner", "checking", WalletKind::Bank, "IDR", 500_000);
    let target = Wallet::new("owner", "savings", WalletKind::Savings, "IDR", 0);
    let (source_id, target_id) = (source.id, target.id);
    store.insert_wallet(source).unwrap();
    store.insert_wallet(target).unwrap();
    let engine = LedgerEngine::new(store);

    engine
        .create(TransactionDraft {
            owner: "owner".into(),
            wallet_id: source_id,
            amount: 125_000,
            kind: TransactionKind::Transfer { target: target_id },
            category: None,
            classification: None,
            date: date(2024, 6, 2),
            note: None,
        })
        .unwrap();

    engine
        .store()
        .atomically(|scope| {
            scope.apply_delta(&target_id, 7_000)?;
            Ok(())
        })
        .unwrap();

    let repaired = reconcile::repair(engine.store(), "owner").unwrap();
    assert_eq!(repaired.len(), 1);
    assert_eq!(repaired[0].wallet_id, target_id);
    assert_eq!(engine.store().wallet(&target_id).unwrap().balance, 125_000);
    assert_eq!(engine.store().wallet(&source_id).unwrap().balance, 375_000);
}
