use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::core::recurring::{RecurringRule, RuleId};
use crate::core::{
    CategoryBudget, LedgerError, Transaction, TransactionId, Wallet, WalletId, WalletState,
};

use super::{AtomicScope, LedgerStore, StoreError};

/// The full document set a store hosts. Shared with the file store, which
/// persists it as one JSON snapshot.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub(crate) struct Documents {
    pub(crate) wallets: HashMap<WalletId, Wallet>,
    pub(crate) transactions: HashMap<TransactionId, Transaction>,
    pub(crate) rules: HashMap<RuleId, RecurringRule>,
    pub(crate) budgets: Vec<CategoryBudget>,
}

impl Documents {
    fn wallet(&self, id: &WalletId) -> Result<Wallet, StoreError> {
        self.wallets.get(id).cloned().ok_or(StoreError::WalletNotFound)
    }
}

/// In-memory store. Scopes are serialized by a mutex and made all-or-nothing
/// by snapshotting the document set before running the scope body and
/// restoring the snapshot if it fails.
#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<Documents>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_documents(docs: Documents) -> Self {
        Self {
            docs: Mutex::new(docs),
        }
    }

    pub(crate) fn snapshot(&self) -> Result<Documents, StoreError> {
        Ok(self.lock()?.clone())
    }

    pub(crate) fn lock(&self) -> Result<std::sync::MutexGuard<'_, Documents>, StoreError> {
        self.docs
            .lock()
            .map_err(|_| StoreError::Permanent("store lock poisoned".into()))
    }
}

pub(crate) struct DocumentScope<'a> {
    docs: &'a mut Documents,
}

impl AtomicScope for DocumentScope<'_> {
    fn wallet(&mut self, id: &WalletId) -> Result<Wallet, StoreError> {
        self.docs.wallet(id)
    }

    fn apply_delta(&mut self, id: &WalletId, delta: i64) -> Result<i64, StoreError> {
        let wallet = self.docs.wallets.get_mut(id).ok_or(StoreError::WalletNotFound)?;
        wallet.balance = wallet
            .balance
            .checked_add(delta)
            .ok_or_else(|| StoreError::Permanent("balance overflow".into()))?;
        wallet.updated_at = Utc::now();
        Ok(wallet.balance)
    }

    fn transaction(&mut self, id: &TransactionId) -> Result<Transaction, StoreError> {
        self.docs
            .transactions
            .get(id)
            .cloned()
            .ok_or(StoreError::TransactionNotFound)
    }

    fn transactions_for_wallet(&mut self, id: &WalletId) -> Result<Vec<Transaction>, StoreError> {
        Ok(self
            .docs
            .transactions
            .values()
            .filter(|tx| tx.effects().iter().any(|(wallet, _)| wallet == id))
            .cloned()
            .collect())
    }

    fn insert_transaction(&mut self, tx: Transaction) -> Result<(), StoreError> {
        self.docs.transactions.insert(tx.id, tx);
        Ok(())
    }

    fn update_transaction(&mut self, tx: Transaction) -> Result<(), StoreError> {
        match self.docs.transactions.get_mut(&tx.id) {
            Some(stored) => {
                *stored = tx;
                Ok(())
            }
            None => Err(StoreError::TransactionNotFound),
        }
    }

    fn remove_transaction(&mut self, id: &TransactionId) -> Result<(), StoreError> {
        self.docs
            .transactions
            .remove(id)
            .map(|_| ())
            .ok_or(StoreError::TransactionNotFound)
    }

    fn rule(&mut self, id: &RuleId) -> Result<RecurringRule, StoreError> {
        self.docs.rules.get(id).cloned().ok_or(StoreError::RuleNotFound)
    }

    fn update_rule_schedule(&mut self, id: &RuleId, next: NaiveDate) -> Result<(), StoreError> {
        let rule = self.docs.rules.get_mut(id).ok_or(StoreError::RuleNotFound)?;
        rule.next_execution_date = next;
        Ok(())
    }
}

/// Runs a scope against a document set with snapshot rollback. Shared with
/// the file store.
pub(crate) fn run_scope<T, F>(docs: &mut Documents, f: &mut F) -> Result<T, LedgerError>
where
    F: FnMut(&mut dyn AtomicScope) -> Result<T, LedgerError>,
{
    let snapshot = docs.clone();
    let result = {
        let mut scope = DocumentScope { docs: &mut *docs };
        f(&mut scope)
    };
    match result {
        Ok(value) => Ok(value),
        Err(e) => {
            *docs = snapshot;
            Err(e)
        }
    }
}

impl LedgerStore for MemoryStore {
    fn atomically<T, F>(&self, mut f: F) -> Result<T, LedgerError>
    where
        F: FnMut(&mut dyn AtomicScope) -> Result<T, LedgerError>,
    {
        let mut docs = self.lock().map_err(LedgerError::from)?;
        run_scope(&mut docs, &mut f)
    }

    fn insert_wallet(&self, wallet: Wallet) -> Result<(), StoreError> {
        self.lock()?.wallets.insert(wallet.id, wallet);
        Ok(())
    }

    fn wallet(&self, id: &WalletId) -> Result<Wallet, StoreError> {
        self.lock()?.wallet(id)
    }

    fn wallets_for_owner(&self, owner: &str) -> Result<Vec<Wallet>, StoreError> {
        Ok(self
            .lock()?
            .wallets
            .values()
            .filter(|w| w.owner == owner)
            .cloned()
            .collect())
    }

    fn set_wallet_state(&self, id: &WalletId, state: WalletState) -> Result<(), StoreError> {
        let mut docs = self.lock()?;
        let wallet = docs.wallets.get_mut(id).ok_or(StoreError::WalletNotFound)?;
        wallet.state = state;
        wallet.updated_at = Utc::now();
        Ok(())
    }

    fn transaction(&self, id: &TransactionId) -> Result<Transaction, StoreError> {
        self.lock()?
            .transactions
            .get(id)
            .cloned()
            .ok_or(StoreError::TransactionNotFound)
    }

    fn transactions_for_owner(&self, owner: &str) -> Result<Vec<Transaction>, StoreError> {
        Ok(self
            .lock()?
            .transactions
            .values()
            .filter(|tx| tx.owner == owner)
            .cloned()
            .collect())
    }

    fn insert_rule(&self, rule: RecurringRule) -> Result<(), StoreError> {
        self.lock()?.rules.insert(rule.id, rule);
        Ok(())
    }

    fn rule(&self, id: &RuleId) -> Result<RecurringRule, StoreError> {
        self.lock()?.rules.get(id).cloned().ok_or(StoreError::RuleNotFound)
    }

    fn rules_for_owner(&self, owner: &str) -> Result<Vec<RecurringRule>, StoreError> {
        Ok(self
            .lock()?
            .rules
            .values()
            .filter(|r| r.owner == owner)
            .cloned()
            .collect())
    }

    fn due_rules(&self, owner: &str, today: NaiveDate) -> Result<Vec<RecurringRule>, StoreError> {
        Ok(self
            .lock()?
            .rules
            .values()
            .filter(|r| r.owner == owner && r.active && r.next_execution_date <= today)
            .cloned()
            .collect())
    }

    fn set_rule_active(&self, id: &RuleId, active: bool) -> Result<(), StoreError> {
        let mut docs = self.lock()?;
        let rule = docs.rules.get_mut(id).ok_or(StoreError::RuleNotFound)?;
        rule.active = active;
        Ok(())
    }

    fn upsert_budget(&self, budget: CategoryBudget) -> Result<(), StoreError> {
        let mut docs = self.lock()?;
        match docs.budgets.iter_mut().find(|b| {
            b.owner == budget.owner
                && b.category == budget.category
                && b.year == budget.year
                && b.month == budget.month
        }) {
            Some(stored) => *stored = budget,
            None => docs.budgets.push(budget),
        }
        Ok(())
    }

    fn budgets_for_month(
        &self,
        owner: &str,
        year: i32,
        month: u32,
    ) -> Result<Vec<CategoryBudget>, StoreError> {
        Ok(self
            .lock()?
            .budgets
            .iter()
            .filter(|b| b.owner == owner && b.year == year && b.month == month)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::WalletKind;

    #[test]
    fn failed_scope_rolls_back_every_mutation() {
        let store = MemoryStore::new();
        let wallet = Wallet::new("owner", "cash", WalletKind::Cash, "IDR", 1_000);
        let id = wallet.id;
        store.insert_wallet(wallet).unwrap();

        let result: Result<(), LedgerError> = store.atomically(|scope| {
            scope.apply_delta(&id, -400)?;
            Err(LedgerError::Store(StoreError::Transient("boom".into())))
        });

        assert!(result.is_err());
        assert_eq!(store.wallet(&id).unwrap().balance, 1_000);
    }

    #[test]
    fn committed_scope_is_visible_as_a_whole() {
        let store = MemoryStore::new();
        let wallet = Wallet::new("owner", "cash", WalletKind::Cash, "IDR", 1_000);
        let id = wallet.id;
        store.insert_wallet(wallet).unwrap();

        store
            .atomically(|scope| {
                scope.apply_delta(&id, -400)?;
                scope.apply_delta(&id, 150)?;
                Ok(())
            })
            .unwrap();

        assert_eq!(store.wallet(&id).unwrap().balance, 750);
    }

    #[test]
    fn overflowing_delta_fails_instead_of_wrapping() {
        let store = MemoryStore::new();
        let wallet = Wallet::new("owner", "cash", WalletKind::Cash, "IDR", i64::MAX - 10);
        let id = wallet.id;
        store.insert_wallet(wallet).unwrap();

        let err = store
            .atomically(|scope| {
                scope.apply_delta(&id, 100)?;
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err, LedgerError::Store(StoreError::Permanent(_))));
        assert_eq!(store.wallet(&id).unwrap().balance, i64::MAX - 10);
    }

    #[test]
    fn delta_on_missing_wallet_fails() {
        let store = MemoryStore::new();
        let err = store
            .atomically(|scope| {
                scope.apply_delta(&WalletId::new(), 10)?;
                Ok(())
            })
            .unwrap_err();
        assert_eq!(err, LedgerError::WalletNotFound);
    }
}
