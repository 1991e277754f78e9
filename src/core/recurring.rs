//! Recurring rules and the processor that materializes them when due.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::stores::LedgerStore;

use super::ledger::create_in_scope;
use super::schedule::Frequency;
use super::{
    Classification, LedgerEngine, LedgerError, Transaction, TransactionDraft, TransactionKind,
    WalletId,
};

/// Identifier of a recurring-rule document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(Uuid);

impl RuleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RuleId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The transaction kind a rule materializes. Rules cover incomes (salary)
/// and expenses (bills); transfers are not scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Income,
    Expense,
}

impl From<RuleKind> for TransactionKind {
    fn from(kind: RuleKind) -> Self {
        match kind {
            RuleKind::Income => TransactionKind::Income,
            RuleKind::Expense => TransactionKind::Expense,
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::Income => write!(f, "income"),
            RuleKind::Expense => write!(f, "expense"),
        }
    }
}

impl FromStr for RuleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(RuleKind::Income),
            "expense" => Ok(RuleKind::Expense),
            _ => Err(format!("unknown rule kind: {s}")),
        }
    }
}

/// A recurring transaction rule. `next_execution_date` only ever moves
/// forward, by exactly one frequency step per materialized transaction, and
/// only after that transaction has durably committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringRule {
    pub id: RuleId,
    pub owner: String,
    pub wallet_id: WalletId,
    pub amount: i64,
    pub kind: RuleKind,
    pub category: Option<String>,
    pub classification: Option<Classification>,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub next_execution_date: NaiveDate,
    /// Deactivated rules are kept for history, never deleted.
    pub active: bool,
    pub note: Option<String>,
}

impl RecurringRule {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        owner: impl Into<String>,
        wallet_id: WalletId,
        amount: i64,
        kind: RuleKind,
        category: Option<String>,
        classification: Option<Classification>,
        frequency: Frequency,
        start_date: NaiveDate,
        note: Option<String>,
    ) -> Self {
        Self {
            id: RuleId::new(),
            owner: owner.into(),
            wallet_id,
            amount,
            kind,
            category,
            classification,
            frequency,
            start_date,
            next_execution_date: start_date,
            active: true,
            note,
        }
    }

    /// The transaction payload for one occurrence of this rule, dated at the
    /// occurrence's scheduled date and annotated as automatic.
    fn draft_for(&self, date: NaiveDate) -> TransactionDraft {
        let note = match &self.note {
            Some(n) => format!("{n} (auto)"),
            None => "(auto)".to_string(),
        };
        TransactionDraft {
            owner: self.owner.clone(),
            wallet_id: self.wallet_id,
            amount: self.amount,
            kind: self.kind.into(),
            category: self.category.clone(),
            classification: self.classification,
            date,
            note: Some(note),
        }
    }
}

/// Outcome of one processor invocation.
#[derive(Debug, Default)]
pub struct ProcessReport {
    /// Transactions created during this invocation.
    pub materialized: Vec<Transaction>,
    /// Rules that looked due when listed but had already been handled by a
    /// concurrent invocation.
    pub skipped: usize,
    /// Rules that failed to materialize. Their schedules were not advanced;
    /// they remain due and will be retried on the next invocation.
    pub failures: Vec<(RuleId, LedgerError)>,
}

impl ProcessReport {
    pub fn materialized_count(&self) -> usize {
        self.materialized.len()
    }
}

/// Materializes every active rule of `owner` due at or before `today`.
///
/// Each rule is handled in its own atomic scope that re-checks the due
/// condition, creates the transaction dated at the rule's scheduled date,
/// and advances the schedule by one frequency step from that scheduled date
/// (not from `today`, so a late invocation cannot drift the cadence). An
/// overdue rule therefore catches up one period per invocation; callers can
/// re-invoke until nothing materializes. One rule's failure never aborts the
/// rest.
pub fn process_due<S: LedgerStore>(
    engine: &LedgerEngine<S>,
    owner: &str,
    today: NaiveDate,
) -> Result<ProcessReport, LedgerError> {
    let due = engine.store().due_rules(owner, today)?;
    info!(owner, due = due.len(), "processing recurring rules");

    let mut report = ProcessReport::default();
    for rule in due {
        let rule_id = rule.id;
        let outcome = engine.store().atomically(|scope| {
            let current = scope.rule(&rule_id)?;
            if !current.active || current.next_execution_date > today {
                // A concurrent invocation committed this occurrence first.
                return Ok(None);
            }
            let due_date = current.next_execution_date;
            let draft = current.draft_for(due_date).normalized()?;
            let tx = create_in_scope(scope, &draft)?;
            scope.update_rule_schedule(&rule_id, current.frequency.advance(due_date))?;
            Ok(Some(tx))
        });
        match outcome {
            Ok(Some(tx)) => {
                info!(rule = %rule_id, transaction = %tx.id, date = %tx.date, "materialized recurring transaction");
                report.materialized.push(tx);
            }
            Ok(None) => report.skipped += 1,
            Err(e) => {
                warn!(rule = %rule_id, error = %e, "recurring rule failed; it stays due for the next run");
                report.failures.push((rule_id, e));
            }
        }
    }
    Ok(report)
}
