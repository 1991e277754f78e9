//! Collaborator interfaces for the document store, plus the bundled
//! in-memory, file, and retrying adapters.

mod file;
mod memory;
mod retry;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use retry::RetryingStore;

use chrono::NaiveDate;

use crate::core::recurring::{RecurringRule, RuleId};
use crate::core::{
    CategoryBudget, LedgerError, Transaction, TransactionId, Wallet, WalletId, WalletState,
};

/// Errors surfaced by a document store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The referenced wallet document does not exist.
    WalletNotFound,
    /// The referenced transaction document does not exist.
    TransactionNotFound,
    /// The referenced recurring-rule document does not exist.
    RuleNotFound,
    /// An atomic scope lost a race with a concurrent writer.
    Conflict,
    /// A transient failure (network, timeout); safe to retry.
    Transient(String),
    /// A permanent failure; retrying will not help.
    Permanent(String),
}

impl StoreError {
    /// Whether retrying the failed operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict | StoreError::Transient(_))
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::WalletNotFound => write!(f, "wallet document not found"),
            StoreError::TransactionNotFound => write!(f, "transaction document not found"),
            StoreError::RuleNotFound => write!(f, "recurring-rule document not found"),
            StoreError::Conflict => write!(f, "atomic write lost a race"),
            StoreError::Transient(msg) => write!(f, "transient store failure: {msg}"),
            StoreError::Permanent(msg) => write!(f, "permanent store failure: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// The view a store exposes inside one atomic unit of work. Every mutation
/// performed through a scope commits together or not at all, and scopes on
/// the same store are serialized, so read-modify-write cycles accumulate
/// deltas instead of last-writer-wins on the balance field.
pub trait AtomicScope {
    /// Reads a wallet document regardless of its lifecycle state.
    fn wallet(&mut self, id: &WalletId) -> Result<Wallet, StoreError>;

    /// Applies a signed delta to a wallet balance and returns the new
    /// balance. The store never overwrites the balance field directly.
    fn apply_delta(&mut self, id: &WalletId, delta: i64) -> Result<i64, StoreError>;

    fn transaction(&mut self, id: &TransactionId) -> Result<Transaction, StoreError>;

    /// All transactions whose source or target is the given wallet.
    fn transactions_for_wallet(&mut self, id: &WalletId) -> Result<Vec<Transaction>, StoreError>;

    fn insert_transaction(&mut self, tx: Transaction) -> Result<(), StoreError>;

    /// Replaces the stored record that shares `tx.id`.
    fn update_transaction(&mut self, tx: Transaction) -> Result<(), StoreError>;

    fn remove_transaction(&mut self, id: &TransactionId) -> Result<(), StoreError>;

    fn rule(&mut self, id: &RuleId) -> Result<RecurringRule, StoreError>;

    fn update_rule_schedule(&mut self, id: &RuleId, next: NaiveDate) -> Result<(), StoreError>;
}

/// A document store hosting wallets, transactions, recurring rules, and
/// category budgets for the ledger.
pub trait LedgerStore {
    /// Runs `f` against an atomic scope. If `f` returns an error, none of
    /// the scope's mutations are visible to any reader; otherwise all of
    /// them become visible together. `f` may be re-invoked by retrying
    /// wrappers, so it must re-read all state it depends on.
    fn atomically<T, F>(&self, f: F) -> Result<T, LedgerError>
    where
        F: FnMut(&mut dyn AtomicScope) -> Result<T, LedgerError>;

    fn insert_wallet(&self, wallet: Wallet) -> Result<(), StoreError>;

    fn wallet(&self, id: &WalletId) -> Result<Wallet, StoreError>;

    fn wallets_for_owner(&self, owner: &str) -> Result<Vec<Wallet>, StoreError>;

    /// Archive/unarchive or soft-delete a wallet. Deletion never cascades to
    /// transactions.
    fn set_wallet_state(&self, id: &WalletId, state: WalletState) -> Result<(), StoreError>;

    fn transaction(&self, id: &TransactionId) -> Result<Transaction, StoreError>;

    fn transactions_for_owner(&self, owner: &str) -> Result<Vec<Transaction>, StoreError>;

    fn insert_rule(&self, rule: RecurringRule) -> Result<(), StoreError>;

    fn rule(&self, id: &RuleId) -> Result<RecurringRule, StoreError>;

    fn rules_for_owner(&self, owner: &str) -> Result<Vec<RecurringRule>, StoreError>;

    /// Active rules with `next_execution_date <= today`, in no particular
    /// order.
    fn due_rules(&self, owner: &str, today: NaiveDate) -> Result<Vec<RecurringRule>, StoreError>;

    /// Deactivation preserves the rule and its history; rules are never
    /// removed.
    fn set_rule_active(&self, id: &RuleId, active: bool) -> Result<(), StoreError>;

    /// Inserts or replaces the budget for (owner, category, year, month).
    fn upsert_budget(&self, budget: CategoryBudget) -> Result<(), StoreError>;

    fn budgets_for_month(
        &self,
        owner: &str,
        year: i32,
        month: u32,
    ) -> Result<Vec<CategoryBudget>, StoreError>;
}
