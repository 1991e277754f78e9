//! The write side of the ledger: every wallet-balance mutation in the crate
//! goes through this engine, inside exactly one atomic store scope per
//! operation, so a balance and its transaction record can never disagree.

use chrono::{NaiveDate, Utc};

use crate::stores::{AtomicScope, LedgerStore, StoreError};

use super::{
    LedgerError, Transaction, TransactionDraft, TransactionId, TransactionKind, Wallet, WalletId,
    WalletState,
};

/// Applies transaction effects and record mutations through a [`LedgerStore`].
///
/// Each operation either fully succeeds or returns one error with no balance
/// or record changed; callers never need compensating logic.
pub struct LedgerEngine<S> {
    store: S,
}

impl<S: LedgerStore> LedgerEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The underlying store, for read paths and administration.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Records a new transaction and applies its balance effect.
    ///
    /// Self-transfers and non-positive amounts are rejected before the store
    /// is touched; a missing or deleted wallet (source or transfer target)
    /// fails the whole scope with nothing applied.
    pub fn create(&self, draft: TransactionDraft) -> Result<Transaction, LedgerError> {
        let draft = draft.normalized()?;
        self.store.atomically(|scope| create_in_scope(scope, &draft))
    }

    /// Replaces a stored transaction with the draft, applying the reversal of
    /// the old effect and the forward effect of the new one in the same
    /// scope. Correct even when the wallet, kind, and amount all changed.
    pub fn update(
        &self,
        id: TransactionId,
        draft: TransactionDraft,
    ) -> Result<Transaction, LedgerError> {
        let draft = draft.normalized()?;
        self.store.atomically(|scope| {
            let old = scope.transaction(&id)?;
            apply_effects(scope, &old.reversal())?;
            let mut tx = draft.build(id, old.created_at);
            tx.updated_at = Utc::now();
            apply_effects(scope, &tx.effects())?;
            scope.update_transaction(tx.clone())?;
            Ok(tx)
        })
    }

    /// Removes a transaction, undoing its balance effect.
    pub fn delete(&self, id: TransactionId) -> Result<(), LedgerError> {
        self.store.atomically(|scope| {
            let old = scope.transaction(&id)?;
            apply_effects(scope, &old.reversal())?;
            scope.remove_transaction(&id)?;
            Ok(())
        })
    }

    /// Manual balance correction, recorded as a synthetic adjustment
    /// transaction with `delta = new - old` rather than an overwrite of the
    /// balance field, so corrections stay inside the balance invariant and
    /// the audit trail. Returns `None` when the balance already matches.
    pub fn set_balance(
        &self,
        wallet_id: WalletId,
        new_balance: i64,
        date: NaiveDate,
        note: Option<String>,
    ) -> Result<Option<Transaction>, LedgerError> {
        self.store.atomically(|scope| {
            let wallet = active_wallet(scope, &wallet_id)?;
            let delta = new_balance - wallet.balance;
            if delta == 0 {
                return Ok(None);
            }
            let draft = TransactionDraft {
                owner: wallet.owner.clone(),
                wallet_id,
                amount: delta.abs(),
                kind: TransactionKind::Adjustment { increase: delta > 0 },
                category: None,
                classification: None,
                date,
                note: note.clone(),
            };
            create_in_scope(scope, &draft).map(Some)
        })
    }
}

/// Creates a transaction inside an existing scope. Used by [`LedgerEngine`]
/// and by the recurring processor, which shares one scope between the create
/// and the schedule advance. Expects a normalized draft.
pub(crate) fn create_in_scope(
    scope: &mut dyn AtomicScope,
    draft: &TransactionDraft,
) -> Result<Transaction, LedgerError> {
    let tx = draft.build(TransactionId::new(), Utc::now());
    apply_effects(scope, &tx.effects())?;
    scope.insert_transaction(tx.clone())?;
    Ok(tx)
}

/// Applies each signed delta after checking that its wallet accepts writes.
fn apply_effects(
    scope: &mut dyn AtomicScope,
    effects: &[(WalletId, i64)],
) -> Result<(), LedgerError> {
    for (wallet_id, delta) in effects {
        active_wallet(scope, wallet_id)?;
        scope.apply_delta(wallet_id, *delta)?;
    }
    Ok(())
}

/// Resolves a wallet that may be written to. Deleted wallets are treated as
/// absent; archived wallets are frozen.
fn active_wallet(scope: &mut dyn AtomicScope, id: &WalletId) -> Result<Wallet, LedgerError> {
    let wallet = scope.wallet(id).map_err(|e| match e {
        StoreError::WalletNotFound => LedgerError::WalletNotFound,
        other => LedgerError::Store(other),
    })?;
    match wallet.state {
        WalletState::Active => Ok(wallet),
        WalletState::Archived => Err(LedgerError::WalletArchived),
        WalletState::Deleted => Err(LedgerError::WalletNotFound),
    }
}
