use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use pocket_ledger::core::recurring::{RecurringRule, RuleId};
use pocket_ledger::core::{
    CategoryBudget, LedgerEngine, LedgerError, Transaction, TransactionDraft, TransactionId,
    TransactionKind, Wallet, WalletId, WalletKind, WalletState,
};
use pocket_ledger::stores::{AtomicScope, LedgerStore, MemoryStore, RetryingStore, StoreError};

/// Store double whose atomic scopes fail a configured number of times before
/// succeeding against the wrapped in-memory store.
struct FlakyStore {
    inner: MemoryStore,
    fail_times: usize,
    error: StoreError,
    calls: Arc<AtomicUsize>,
}

impl FlakyStore {
    fn new(fail_times: usize, error: StoreError, calls: Arc<AtomicUsize>) -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_times,
            error,
            calls,
        }
    }
}

impl LedgerStore for FlakyStore {
    fn atomically<T, F>(&self, f: F) -> Result<T, LedgerError>
    where
        F: FnMut(&mut dyn AtomicScope) -> Result<T, LedgerError>,
    {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.fail_times {
            return Err(LedgerError::Store(self.error.clone()));
        }
        self.inner.atomically(f)
    }

    fn insert_wallet(&self, wallet: Wallet) -> Result<(), StoreError> {
        self.inner.insert_wallet(wallet)
    }

    fn wallet(&self, id: &WalletId) -> Result<Wallet, StoreError> {
        self.inner.wallet(id)
    }

    fn wallets_for_owner(&self, _owner: &str) -> Result<Vec<Wallet>, StoreError> {
        unimplemented!()
    }

    fn set_wallet_state(&self, _id: &WalletId, _state: WalletState) -> Result<(), StoreError> {
        unimplemented!()
    }

    fn transaction(&self, _id: &TransactionId) -> Result<Transaction, StoreError> {
        unimplemented!()
    }

    fn transactions_for_owner(&self, owner: &str) -> Result<Vec<Transaction>, StoreError> {
        self.inner.transactions_for_owner(owner)
    }

    fn insert_rule(&self, _rule: RecurringRule) -> Result<(), StoreError> {
        unimplemented!()
    }

    fn rule(&self, _id: &RuleId) -> Result<RecurringRule, StoreError> {
        unimplemented!()
    }

    fn rules_for_owner(&self, _owner: &str) -> Result<Vec<RecurringRule>, StoreError> {
        unimplemented!()
    }

    fn due_rules(&self, _owner: &str, _today: NaiveDate) -> Result<Vec<RecurringRule>, StoreError> {
        unimplemented!()
    }

    fn set_rule_active(&self, _id: &RuleId, _active: bool) -> Result<(), StoreError> {
        unimplemented!()
    }

    fn upsert_budget(&self, _budget: CategoryBudget) -> Result<(), StoreError> {
        unimplemented!()
    }

    fn budgets_for_month(
        &self,
        _owner: &str,
        _year: i32,
        _month: u32,
    ) -> Result<Vec<CategoryBudget>, StoreError> {
        unimplemented!()
    }
}

fn expense(wallet_id: WalletId, amount: i64) -> TransactionDraft {
    TransactionDraft {
        owner: "owner".into(),
        wallet_id,
        amount,
        kind: TransactionKind::Expense,
        category: None,
        classification: None,
        date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        note: None,
    }
}

#[test]
fn transient_failures_are_retried_until_the_scope_commits() {
    let calls = Arc::new(AtomicUsize::new(0));
    let flaky = FlakyStore::new(2, StoreError::Transient("network".into()), Arc::clone(&calls));
    let wallet = Wallet::new("owner", "main", WalletKind::Bank, "IDR", 50_000);
    let wallet_id = wallet.id;
    flaky.insert_wallet(wallet).unwrap();

    let engine = LedgerEngine::new(RetryingStore::new(flaky, 3, Duration::from_millis(1)));
    engine.create(expense(wallet_id, 10_000)).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(engine.store().wallet(&wallet_id).unwrap().balance, 40_000);
    assert_eq!(engine.store().transactions_for_owner("owner").unwrap().len(), 1);
}

#[test]
fn conflicts_are_retryable() {
    let calls = Arc::new(AtomicUsize::new(0));
    let flaky = FlakyStore::new(1, StoreError::Conflict, Arc::clone(&calls));
    let wallet = Wallet::new("owner", "main", WalletKind::Bank, "IDR", 50_000);
    let wallet_id = wallet.id;
    flaky.insert_wallet(wallet).unwrap();

    let engine = LedgerEngine::new(RetryingStore::new(flaky, 3, Duration::from_millis(1)));
    engine.create(expense(wallet_id, 10_000)).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn gives_up_after_max_retries() {
    let calls = Arc::new(AtomicUsize::new(0));
    let flaky = FlakyStore::new(5, StoreError::Transient("network".into()), Arc::clone(&calls));
    let wallet = Wallet::new("owner", "main", WalletKind::Bank, "IDR", 50_000);
    let wallet_id = wallet.id;
    flaky.insert_wallet(wallet).unwrap();

    let engine = LedgerEngine::new(RetryingStore::new(flaky, 3, Duration::from_millis(1)));
    let err = engine.create(expense(wallet_id, 10_000)).unwrap_err();

    assert_eq!(err, LedgerError::Store(StoreError::Transient("network".into())));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(engine.store().wallet(&wallet_id).unwrap().balance, 50_000);
}

#[test]
fn permanent_failures_pass_straight_through() {
    let calls = Arc::new(AtomicUsize::new(0));
    let flaky = FlakyStore::new(1, StoreError::Permanent("schema".into()), Arc::clone(&calls));
    let wallet = Wallet::new("owner", "main", WalletKind::Bank, "IDR", 50_000);
    let wallet_id = wallet.id;
    flaky.insert_wallet(wallet).unwrap();

    let engine = LedgerEngine::new(RetryingStore::new(flaky, 3, Duration::from_millis(1)));
    let err = engine.create(expense(wallet_id, 10_000)).unwrap_err();

    assert_eq!(err, LedgerError::Store(StoreError::Permanent("schema".into())));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
