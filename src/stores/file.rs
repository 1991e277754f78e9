use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::core::recurring::{RecurringRule, RuleId};
use crate::core::{
    CategoryBudget, LedgerError, Transaction, TransactionId, Wallet, WalletId, WalletState,
};

use super::memory::{run_scope, Documents, MemoryStore};
use super::{AtomicScope, LedgerStore, StoreError};

/// Store persisted as a single JSON document set on local disk.
///
/// Scopes run against the in-memory document set under its lock and the full
/// set is rewritten through a temp-file-then-rename before the scope is
/// considered committed. A failed write rolls the in-memory set back to its
/// pre-scope state, so memory and disk never disagree and a retried scope
/// re-executes against unchanged state.
pub struct FileStore {
    inner: MemoryStore,
    path: PathBuf,
}

impl FileStore {
    /// Opens the store at `path`, creating an empty document set if the file
    /// does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let inner = if path.exists() {
            let data = fs::read_to_string(&path)
                .map_err(|e| StoreError::Transient(e.to_string()))?;
            let docs = serde_json::from_str(&data)
                .map_err(|e| StoreError::Permanent(format!("corrupt store file: {e}")))?;
            MemoryStore::from_documents(docs)
        } else {
            MemoryStore::new()
        };
        Ok(Self { inner, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_documents(&self, docs: &Documents) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(docs)
            .map_err(|e| StoreError::Permanent(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data).map_err(|e| StoreError::Transient(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| StoreError::Transient(e.to_string()))
    }

    fn persisted<T>(&self, value: T) -> Result<T, StoreError> {
        let docs = self.inner.snapshot()?;
        self.write_documents(&docs)?;
        Ok(value)
    }
}

impl LedgerStore for FileStore {
    fn atomically<T, F>(&self, mut f: F) -> Result<T, LedgerError>
    where
        F: FnMut(&mut dyn AtomicScope) -> Result<T, LedgerError>,
    {
        let mut docs = self.inner.lock().map_err(LedgerError::from)?;
        let snapshot = docs.clone();
        let value = run_scope(&mut docs, &mut f)?;
        if let Err(e) = self.write_documents(&docs) {
            *docs = snapshot;
            return Err(e.into());
        }
        Ok(value)
    }

    fn insert_wallet(&self, wallet: Wallet) -> Result<(), StoreError> {
        self.inner.insert_wallet(wallet)?;
        self.persisted(())
    }

    fn wallet(&self, id: &WalletId) -> Result<Wallet, StoreError> {
        self.inner.wallet(id)
    }

    fn wallets_for_owner(&self, owner: &str) -> Result<Vec<Wallet>, StoreError> {
        self.inner.wallets_for_owner(owner)
    }

    fn set_wallet_state(&self, id: &WalletId, state: WalletState) -> Result<(), StoreError> {
        self.inner.set_wallet_state(id, state)?;
        self.persisted(())
    }

    fn transaction(&self, id: &TransactionId) -> Result<Transaction, StoreError> {
        self.inner.transaction(id)
    }

    fn transactions_for_owner(&self, owner: &str) -> Result<Vec<Transaction>, StoreError> {
        self.inner.transactions_for_owner(owner)
    }

    fn insert_rule(&self, rule: RecurringRule) -> Result<(), StoreError> {
        self.inner.insert_rule(rule)?;
        self.persisted(())
    }

    fn rule(&self, id: &RuleId) -> Result<RecurringRule, StoreError> {
        self.inner.rule(id)
    }

    fn rules_for_owner(&self, owner: &str) -> Result<Vec<RecurringRule>, StoreError> {
        self.inner.rules_for_owner(owner)
    }

    fn due_rules(&self, owner: &str, today: NaiveDate) -> Result<Vec<RecurringRule>, StoreError> {
        self.inner.due_rules(owner, today)
    }

    fn set_rule_active(&self, id: &RuleId, active: bool) -> Result<(), StoreError> {
        self.inner.set_rule_active(id, active)?;
        self.persisted(())
    }

    fn upsert_budget(&self, budget: CategoryBudget) -> Result<(), StoreError> {
        self.inner.upsert_budget(budget)?;
        self.persisted(())
    }

    fn budgets_for_month(
        &self,
        owner: &str,
        year: i32,
        month: u32,
    ) -> Result<Vec<CategoryBudget>, StoreError> {
        self.inner.budgets_for_month(owner, year, month)
    }
}
