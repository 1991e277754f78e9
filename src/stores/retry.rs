use std::thread::sleep;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::debug;

use crate::core::recurring::{RecurringRule, RuleId};
use crate::core::{
    CategoryBudget, LedgerError, Transaction, TransactionId, Wallet, WalletId, WalletState,
};

use super::{AtomicScope, LedgerStore, StoreError};

/// Wrapper that adds retry logic with exponential backoff to a store.
///
/// Retryable errors (conflicts and transient failures) are retried until
/// `max_retries` is reached; the delay starts at `base_delay` and doubles
/// after each failed attempt. Atomic scopes are re-executed from the top,
/// which is safe because a failed scope leaves no effects behind and scope
/// bodies re-read everything they depend on.
pub struct RetryingStore<S> {
    inner: S,
    max_retries: u32,
    base_delay: Duration,
}

impl<S> RetryingStore<S> {
    /// Create a new `RetryingStore` wrapping `inner`.
    pub fn new(inner: S, max_retries: u32, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
        }
    }

    fn with_retry<T, F>(&self, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut(&S) -> Result<T, StoreError>,
    {
        let mut attempt = 0;
        loop {
            match op(&self.inner) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let factor = 2f64.powi(attempt as i32);
                    debug!(attempt, error = %e, "retrying store operation");
                    sleep(self.base_delay.mul_f64(factor));
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<S: LedgerStore> LedgerStore for RetryingStore<S> {
    fn atomically<T, F>(&self, mut f: F) -> Result<T, LedgerError>
    where
        F: FnMut(&mut dyn AtomicScope) -> Result<T, LedgerError>,
    {
        let mut attempt = 0;
        loop {
            match self.inner.atomically(&mut f) {
                Ok(value) => return Ok(value),
                Err(LedgerError::Store(e)) if e.is_retryable() && attempt < self.max_retries => {
                    let factor = 2f64.powi(attempt as i32);
                    debug!(attempt, error = %e, "retrying atomic scope");
                    sleep(self.base_delay.mul_f64(factor));
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn insert_wallet(&self, wallet: Wallet) -> Result<(), StoreError> {
        self.with_retry(|inner| inner.insert_wallet(wallet.clone()))
    }

    fn wallet(&self, id: &WalletId) -> Result<Wallet, StoreError> {
        self.with_retry(|inner| inner.wallet(id))
    }

    fn wallets_for_owner(&self, owner: &str) -> Result<Vec<Wallet>, StoreError> {
        self.with_retry(|inner| inner.wallets_for_owner(owner))
    }

    fn set_wallet_state(&self, id: &WalletId, state: WalletState) -> Result<(), StoreError> {
        self.with_retry(|inner| inner.set_wallet_state(id, state))
    }

    fn transaction(&self, id: &TransactionId) -> Result<Transaction, StoreError> {
        self.with_retry(|inner| inner.transaction(id))
    }

    fn transactions_for_owner(&self, owner: &str) -> Result<Vec<Transaction>, StoreError> {
        self.with_retry(|inner| inner.transactions_for_owner(owner))
    }

    fn insert_rule(&self, rule: RecurringRule) -> Result<(), StoreError> {
        self.with_retry(|inner| inner.insert_rule(rule.clone()))
    }

    fn rule(&self, id: &RuleId) -> Result<RecurringRule, StoreError> {
        self.with_retry(|inner| inner.rule(id))
    }

    fn rules_for_owner(&self, owner: &str) -> Result<Vec<RecurringRule>, StoreError> {
        self.with_retry(|inner| inner.rules_for_owner(owner))
    }

    fn due_rules(&self, owner: &str, today: NaiveDate) -> Result<Vec<RecurringRule>, StoreError> {
        self.with_retry(|inner| inner.due_rules(owner, today))
    }

    fn set_rule_active(&self, id: &RuleId, active: bool) -> Result<(), StoreError> {
        self.with_retry(|inner| inner.set_rule_active(id, active))
    }

    fn upsert_budget(&self, budget: CategoryBudget) -> Result<(), StoreError> {
        self.with_retry(|inner| inner.upsert_budget(budget.clone()))
    }

    fn budgets_for_month(
        &self,
        owner: &str,
        year: i32,
        month: u32,
    ) -> Result<Vec<CategoryBudget>, StoreError> {
        self.with_retry(|inner| inner.budgets_for_month(owner, year, month))
    }
}
