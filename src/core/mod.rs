//! Core domain types for the wallet ledger.

pub mod budget;
pub mod ledger;
pub mod reconcile;
pub mod recurring;
pub mod schedule;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use budget::{CategoryBudget, SafeToSpend};
pub use ledger::LedgerEngine;
pub use reconcile::BalanceDrift;
pub use recurring::{ProcessReport, RecurringRule, RuleId, RuleKind};
pub use schedule::Frequency;

use crate::stores::StoreError;

/// Identifier of a wallet document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WalletId(Uuid);

/// Identifier of a transaction document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(Uuid);

impl WalletId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WalletId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WalletId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransactionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// What kind of account a wallet represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WalletKind {
    Cash,
    Bank,
    EWallet,
    CreditCard,
    Savings,
    Other,
}

impl fmt::Display for WalletKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WalletKind::Cash => "cash",
            WalletKind::Bank => "bank",
            WalletKind::EWallet => "e-wallet",
            WalletKind::CreditCard => "credit-card",
            WalletKind::Savings => "savings",
            WalletKind::Other => "other",
        };
        write!(f, "{name}")
    }
}

impl FromStr for WalletKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(WalletKind::Cash),
            "bank" => Ok(WalletKind::Bank),
            "e-wallet" | "ewallet" => Ok(WalletKind::EWallet),
            "credit-card" | "credit" => Ok(WalletKind::CreditCard),
            "savings" => Ok(WalletKind::Savings),
            "other" => Ok(WalletKind::Other),
            _ => Err(format!("unknown wallet kind: {s}")),
        }
    }
}

/// Lifecycle state of a wallet. Wallets are never physically removed, so
/// transactions keep resolvable (if possibly deleted) wallet references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletState {
    Active,
    Archived,
    Deleted,
}

/// A wallet document. `balance` is a cached aggregate: it always equals
/// `initial_balance` plus the signed effects of every stored transaction
/// referencing this wallet, and is only ever mutated through the ledger
/// engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub owner: String,
    pub name: String,
    pub kind: WalletKind,
    pub state: WalletState,
    /// ISO 4217 currency code for the balance (e.g., IDR).
    pub currency: String,
    /// Balance at creation time, in minor currency units.
    pub initial_balance: i64,
    /// Current balance in minor currency units. May legitimately be negative.
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Creates an active wallet with the given opening balance.
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        kind: WalletKind,
        currency: impl Into<String>,
        initial_balance: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: WalletId::new(),
            owner: owner.into(),
            name: name.into(),
            kind,
            state: WalletState::Active,
            currency: currency.into(),
            initial_balance,
            balance: initial_balance,
            created_at: now,
            updated_at: now,
        }
    }

    /// Display label; deleted wallets render with a sentinel so readers never
    /// have to special-case dangling references.
    pub fn label(&self) -> &str {
        match self.state {
            WalletState::Deleted => "deleted wallet",
            _ => &self.name,
        }
    }
}

/// The kind of a transaction, which fully determines its signed effect on
/// wallet balances. A transfer carries its target wallet inside the variant
/// so it cannot exist without one, and an adjustment carries its direction
/// so `amount` stays a non-negative magnitude for every kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
    Transfer { target: WalletId },
    Adjustment { increase: bool },
}

impl TransactionKind {
    pub fn is_expense(&self) -> bool {
        matches!(self, TransactionKind::Expense)
    }

    pub fn is_transfer(&self) -> bool {
        matches!(self, TransactionKind::Transfer { .. })
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
            TransactionKind::Transfer { .. } => "transfer",
            TransactionKind::Adjustment { .. } => "adjustment",
        };
        write!(f, "{name}")
    }
}

/// Need/want classification, meaningful for expenses only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Need,
    Want,
}

impl FromStr for Classification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "need" => Ok(Classification::Need),
            "want" => Ok(Classification::Want),
            _ => Err(format!("unknown classification: {s}")),
        }
    }
}

/// A transaction document. `amount` is always a positive magnitude; the sign
/// of its balance effect is derived from `kind`, never stored, so reversing
/// an effect can never double-negate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub owner: String,
    pub wallet_id: WalletId,
    pub amount: i64,
    pub kind: TransactionKind,
    pub category: Option<String>,
    pub classification: Option<Classification>,
    /// The date the transaction occurred, not the date it was recorded.
    pub date: NaiveDate,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// The signed balance deltas this transaction applies, per wallet.
    pub fn effects(&self) -> Vec<(WalletId, i64)> {
        match self.kind {
            TransactionKind::Income => vec![(self.wallet_id, self.amount)],
            TransactionKind::Expense => vec![(self.wallet_id, -self.amount)],
            TransactionKind::Transfer { target } => {
                vec![(self.wallet_id, -self.amount), (target, self.amount)]
            }
            TransactionKind::Adjustment { increase } => {
                let delta = if increase { self.amount } else { -self.amount };
                vec![(self.wallet_id, delta)]
            }
        }
    }

    /// The inverse deltas, applied to undo this transaction's prior effect
    /// before a new effect replaces it.
    pub fn reversal(&self) -> Vec<(WalletId, i64)> {
        self.effects()
            .into_iter()
            .map(|(wallet, delta)| (wallet, -delta))
            .collect()
    }
}

/// The payload for creating or updating a transaction: everything except the
/// generated id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDraft {
    pub owner: String,
    pub wallet_id: WalletId,
    pub amount: i64,
    pub kind: TransactionKind,
    pub category: Option<String>,
    pub classification: Option<Classification>,
    pub date: NaiveDate,
    pub note: Option<String>,
}

impl TransactionDraft {
    /// Validates the draft and clears fields that are meaningless for its
    /// kind: classification is expense-only, category never applies to
    /// transfers or adjustments. A self-transfer is rejected before the
    /// store is ever touched.
    pub fn normalized(mut self) -> Result<Self, LedgerError> {
        if self.amount <= 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if let TransactionKind::Transfer { target } = self.kind {
            if target == self.wallet_id {
                return Err(LedgerError::InvalidTransfer);
            }
        }
        if !self.kind.is_expense() {
            self.classification = None;
        }
        if matches!(
            self.kind,
            TransactionKind::Transfer { .. } | TransactionKind::Adjustment { .. }
        ) {
            self.category = None;
        }
        Ok(self)
    }

    /// Builds a transaction record from this draft.
    pub fn build(&self, id: TransactionId, created_at: DateTime<Utc>) -> Transaction {
        Transaction {
            id,
            owner: self.owner.clone(),
            wallet_id: self.wallet_id,
            amount: self.amount,
            kind: self.kind,
            category: self.category.clone(),
            classification: self.classification,
            date: self.date,
            note: self.note.clone(),
            created_at,
            updated_at: created_at,
        }
    }
}

/// Errors raised by the ledger engine and recurring processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The referenced wallet does not exist (or has been deleted).
    WalletNotFound,
    /// The referenced wallet is archived and rejects writes.
    WalletArchived,
    /// The referenced transaction does not exist.
    TransactionNotFound,
    /// The referenced recurring rule does not exist.
    RuleNotFound,
    /// A transfer named the same wallet as source and target.
    InvalidTransfer,
    /// The amount is zero or negative; magnitudes must be positive.
    InvalidAmount,
    /// The underlying store failed; retryable store errors only surface here
    /// once retries are exhausted.
    Store(StoreError),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::WalletNotFound => write!(f, "wallet not found"),
            LedgerError::WalletArchived => write!(f, "wallet is archived"),
            LedgerError::TransactionNotFound => write!(f, "transaction not found"),
            LedgerError::RuleNotFound => write!(f, "recurring rule not found"),
            LedgerError::InvalidTransfer => {
                write!(f, "transfer source and target wallets must differ")
            }
            LedgerError::InvalidAmount => write!(f, "amount must be a positive magnitude"),
            LedgerError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for LedgerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LedgerError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::WalletNotFound => LedgerError::WalletNotFound,
            StoreError::TransactionNotFound => LedgerError::TransactionNotFound,
            StoreError::RuleNotFound => LedgerError::RuleNotFound,
            other => LedgerError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(kind: TransactionKind, amount: i64) -> TransactionDraft {
        TransactionDraft {
            owner: "owner".into(),
            wallet_id: WalletId::new(),
            amount,
            kind,
            category: Some("groceries".into()),
            classification: Some(Classification::Need),
            date: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
            note: None,
        }
    }

    #[test]
    fn income_effect_is_positive() {
        let tx = draft(TransactionKind::Income, 500)
            .normalized()
            .unwrap()
            .build(TransactionId::new(), Utc::now());
        assert_eq!(tx.effects(), vec![(tx.wallet_id, 500)]);
    }

    #[test]
    fn expense_effect_is_negative_and_reversal_undoes_it() {
        let tx = draft(TransactionKind::Expense, 500)
            .normalized()
            .unwrap()
            .build(TransactionId::new(), Utc::now());
        assert_eq!(tx.effects(), vec![(tx.wallet_id, -500)]);
        assert_eq!(tx.reversal(), vec![(tx.wallet_id, 500)]);
    }

    #[test]
    fn transfer_debits_source_and_credits_target() {
        let target = WalletId::new();
        let tx = draft(TransactionKind::Transfer { target }, 500)
            .normalized()
            .unwrap()
            .build(TransactionId::new(), Utc::now());
        assert_eq!(tx.effects(), vec![(tx.wallet_id, -500), (target, 500)]);
    }

    #[test]
    fn adjustment_carries_its_direction() {
        let up = draft(TransactionKind::Adjustment { increase: true }, 300)
            .normalized()
            .unwrap()
            .build(TransactionId::new(), Utc::now());
        let down = draft(TransactionKind::Adjustment { increase: false }, 300)
            .normalized()
            .unwrap()
            .build(TransactionId::new(), Utc::now());
        assert_eq!(up.effects(), vec![(up.wallet_id, 300)]);
        assert_eq!(down.effects(), vec![(down.wallet_id, -300)]);
    }

    #[test]
    fn normalization_clears_classification_outside_expenses() {
        let normalized = draft(TransactionKind::Income, 100).normalized().unwrap();
        assert_eq!(normalized.classification, None);
        assert_eq!(normalized.category.as_deref(), Some("groceries"));
    }

    #[test]
    fn normalization_clears_category_for_transfers() {
        let normalized = draft(TransactionKind::Transfer { target: WalletId::new() }, 100)
            .normalized()
            .unwrap();
        assert_eq!(normalized.category, None);
        assert_eq!(normalized.classification, None);
    }

    #[test]
    fn zero_amount_is_rejected() {
        let err = draft(TransactionKind::Expense, 0).normalized().unwrap_err();
        assert_eq!(err, LedgerError::InvalidAmount);
    }

    #[test]
    fn self_transfer_is_rejected() {
        let mut d = draft(TransactionKind::Income, 100);
        d.kind = TransactionKind::Transfer { target: d.wallet_id };
        assert_eq!(d.normalized().unwrap_err(), LedgerError::InvalidTransfer);
    }

    #[test]
    fn deleted_wallet_renders_with_sentinel_label() {
        let mut wallet = Wallet::new("owner", "BCA", WalletKind::Bank, "IDR", 0);
        assert_eq!(wallet.label(), "BCA");
        wallet.state = WalletState::Deleted;
        assert_eq!(wallet.label(), "deleted wallet");
    }
}
