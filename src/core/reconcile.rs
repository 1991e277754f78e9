//! Reconciliation of the cached wallet balances against the transaction log.
//!
//! The balance field is a materialized aggregate; this job recomputes it
//! from `initial_balance` plus the signed effects of every stored
//! transaction and reports (or repairs) any drift, e.g. after an
//! out-of-band edit to the underlying store.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::stores::LedgerStore;

use super::{LedgerError, WalletId};

/// A wallet whose cached balance disagrees with its transaction log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceDrift {
    pub wallet_id: WalletId,
    /// The cached balance currently stored on the wallet.
    pub cached: i64,
    /// The balance recomputed from the transaction log.
    pub computed: i64,
}

impl BalanceDrift {
    pub fn delta(&self) -> i64 {
        self.computed - self.cached
    }
}

/// Recomputes every wallet balance for `owner` from the transaction log and
/// returns the wallets that have drifted. Read-only.
pub fn audit<S: LedgerStore>(store: &S, owner: &str) -> Result<Vec<BalanceDrift>, LedgerError> {
    let wallets = store.wallets_for_owner(owner)?;
    let transactions = store.transactions_for_owner(owner)?;
    info!(
        owner,
        wallets = wallets.len(),
        transactions = transactions.len(),
        "auditing wallet balances"
    );

    let mut sums: HashMap<WalletId, i64> = HashMap::new();
    for tx in &transactions {
        for (wallet_id, delta) in tx.effects() {
            *sums.entry(wallet_id).or_insert(0) += delta;
        }
    }

    let mut drifted = Vec::new();
    for wallet in &wallets {
        let computed = wallet.initial_balance + sums.get(&wallet.id).copied().unwrap_or(0);
        if computed != wallet.balance {
            debug!(wallet = %wallet.id, cached = wallet.balance, computed, "balance drift");
            drifted.push(BalanceDrift {
                wallet_id: wallet.id,
                cached: wallet.balance,
                computed,
            });
        }
    }
    info!(drifted = drifted.len(), "balance audit complete");
    Ok(drifted)
}

/// Repairs every drifted wallet by rewriting its cached balance to the value
/// recomputed from the log. Each repair recomputes inside its own atomic
/// scope, so a write that raced the audit is never clobbered. Returns the
/// drifts that were repaired.
pub fn repair<S: LedgerStore>(store: &S, owner: &str) -> Result<Vec<BalanceDrift>, LedgerError> {
    let mut repaired = Vec::new();
    for drift in audit(store, owner)? {
        let wallet_id = drift.wallet_id;
        let applied = store.atomically(|scope| {
            let wallet = scope.wallet(&wallet_id)?;
            let transactions = scope.transactions_for_wallet(&wallet_id)?;
            let computed = wallet.initial_balance
                + transactions
                    .iter()
                    .flat_map(|tx| tx.effects())
                    .filter(|(id, _)| *id == wallet_id)
                    .map(|(_, delta)| delta)
                    .sum::<i64>();
            if computed == wallet.balance {
                return Ok(None);
            }
            scope.apply_delta(&wallet_id, computed - wallet.balance)?;
            Ok(Some(BalanceDrift {
                wallet_id,
                cached: wallet.balance,
                computed,
            }))
        })?;
        if let Some(drift) = applied {
            warn!(wallet = %drift.wallet_id, delta = drift.delta(), "repaired drifted balance");
            repaired.push(drift);
        }
    }
    Ok(repaired)
}
