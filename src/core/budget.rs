//! Read-only derivations over ledger data: category budgets and the daily
//! Safe-to-Spend figure. Nothing here writes; these consume the balance
//! invariant the engine maintains.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::recurring::{RecurringRule, RuleKind};
use super::{Transaction, Wallet, WalletKind, WalletState};

/// Spending limit for one category in one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryBudget {
    pub owner: String,
    pub category: String,
    pub year: i32,
    pub month: u32,
    /// Limit in minor currency units.
    pub limit: i64,
}

impl CategoryBudget {
    /// Amount left under the limit; negative once overspent.
    pub fn remaining(&self, transactions: &[Transaction]) -> i64 {
        self.limit - spent_in_category(transactions, &self.category, self.year, self.month)
    }
}

/// Total expense magnitude recorded for a category in a calendar month.
/// Transfers and adjustments never count as spending.
pub fn spent_in_category(
    transactions: &[Transaction],
    category: &str,
    year: i32,
    month: u32,
) -> i64 {
    transactions
        .iter()
        .filter(|tx| {
            tx.kind.is_expense()
                && tx.date.year() == year
                && tx.date.month() == month
                && tx.category.as_deref() == Some(category)
        })
        .map(|tx| tx.amount)
        .sum()
}

/// Derived daily disposable-spend figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafeToSpend {
    /// Spendable balance across active non-credit wallets.
    pub spendable: i64,
    /// Every remaining occurrence of recurring expenses through the end of
    /// the month.
    pub reserved: i64,
    /// Days remaining in the month, including today.
    pub days_left: i64,
    /// (spendable - reserved) / days_left; negative when overcommitted.
    pub per_day: i64,
}

/// Computes the daily disposable spend for the rest of `today`'s month.
///
/// Active cash-like wallets contribute their balance (credit cards are debt,
/// not funds); each remaining occurrence of an active expense rule through
/// month-end is reserved off the top, so a daily bill reserves one amount
/// per remaining day rather than one in total.
pub fn safe_to_spend(
    wallets: &[Wallet],
    rules: &[RecurringRule],
    today: NaiveDate,
) -> SafeToSpend {
    let spendable: i64 = wallets
        .iter()
        .filter(|w| w.state == WalletState::Active && w.kind != WalletKind::CreditCard)
        .map(|w| w.balance)
        .sum();

    let end = month_end(today);
    let reserved: i64 = rules
        .iter()
        .filter(|r| r.active && r.kind == RuleKind::Expense)
        .map(|r| r.amount * occurrences_through(r, end))
        .sum();

    let days_left = (end - today).num_days() + 1;
    SafeToSpend {
        spendable,
        reserved,
        days_left,
        per_day: (spendable - reserved) / days_left,
    }
}

/// How many times a rule fires from its next scheduled date through `end`.
fn occurrences_through(rule: &RecurringRule, end: NaiveDate) -> i64 {
    let mut count = 0;
    let mut next = rule.next_execution_date;
    while next <= end {
        count += 1;
        next = rule.frequency.advance(next);
    }
    count
}

/// Last day of the month containing `date`.
fn month_end(date: NaiveDate) -> NaiveDate {
    let (next_year, next_month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schedule::Frequency;
    use crate::core::{TransactionDraft, TransactionId, TransactionKind, WalletId};
    use chrono::Utc;

    fn expense(category: &str, amount: i64, date: NaiveDate) -> Transaction {
        TransactionDraft {
            owner: "owner".into(),
            wallet_id: WalletId::new(),
            amount,
            kind: TransactionKind::Expense,
            category: Some(category.into()),
            classification: None,
            date,
            note: None,
        }
        .build(TransactionId::new(), Utc::now())
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn spend_only_counts_matching_month_and_category() {
        let transactions = vec![
            expense("food", 40_000, date(2024, 6, 3)),
            expense("food", 25_000, date(2024, 6, 21)),
            expense("food", 90_000, date(2024, 5, 30)),
            expense("transport", 15_000, date(2024, 6, 10)),
        ];
        assert_eq!(spent_in_category(&transactions, "food", 2024, 6), 65_000);
    }

    #[test]
    fn remaining_goes_negative_when_overspent() {
        let budget = CategoryBudget {
            owner: "owner".into(),
            category: "food".into(),
            year: 2024,
            month: 6,
            limit: 50_000,
        };
        let transactions = vec![expense("food", 65_000, date(2024, 6, 3))];
        assert_eq!(budget.remaining(&transactions), -15_000);
    }

    #[test]
    fn safe_to_spend_reserves_bills_and_skips_credit_cards() {
        let mut checking = Wallet::new("owner", "bank", WalletKind::Bank, "IDR", 0);
        checking.balance = 310_000;
        let mut card = Wallet::new("owner", "card", WalletKind::CreditCard, "IDR", 0);
        card.balance = -500_000;

        let rent = RecurringRule::new(
            "owner",
            checking.id,
            100_000,
            RuleKind::Expense,
            Some("rent".into()),
            None,
            Frequency::Monthly,
            date(2024, 6, 28),
            None,
        );

        // June 21st: 10 days left in the month including today.
        let figure = safe_to_spend(&[checking, card], &[rent], date(2024, 6, 21));
        assert_eq!(figure.spendable, 310_000);
        assert_eq!(figure.reserved, 100_000);
        assert_eq!(figure.days_left, 10);
        assert_eq!(figure.per_day, 21_000);
    }

    #[test]
    fn daily_rules_reserve_one_amount_per_remaining_day() {
        let mut checking = Wallet::new("owner", "bank", WalletKind::Bank, "IDR", 0);
        checking.balance = 300_000;

        let coffee = RecurringRule::new(
            "owner",
            checking.id,
            10_000,
            RuleKind::Expense,
            Some("coffee".into()),
            None,
            Frequency::Daily,
            date(2024, 6, 21),
            None,
        );

        // Fires on each of the 10 remaining days of June.
        let figure = safe_to_spend(&[checking], &[coffee], date(2024, 6, 21));
        assert_eq!(figure.reserved, 100_000);
        assert_eq!(figure.per_day, 20_000);
    }

    #[test]
    fn weekly_rules_reserve_each_remaining_occurrence() {
        let mut checking = Wallet::new("owner", "bank", WalletKind::Bank, "IDR", 0);
        checking.balance = 500_000;

        let groceries = RecurringRule::new(
            "owner",
            checking.id,
            80_000,
            RuleKind::Expense,
            Some("groceries".into()),
            None,
            Frequency::Weekly,
            date(2024, 6, 3),
            None,
        );

        // June 3, 10, 17, 24 remain ahead of June 1st.
        let figure = safe_to_spend(&[checking], &[groceries], date(2024, 6, 1));
        assert_eq!(figure.reserved, 320_000);
    }
}
