use std::path::PathBuf;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pocket_ledger::config;
use pocket_ledger::core::{
    budget, reconcile, recurring, Classification, Frequency, LedgerEngine, RecurringRule, RuleId,
    RuleKind, TransactionDraft, TransactionId, TransactionKind, Wallet, WalletId, WalletKind,
    WalletState,
};
use pocket_ledger::core::CategoryBudget;
use pocket_ledger::stores::{FileStore, LedgerStore, RetryingStore};

#[derive(Parser)]
#[command(name = "pocket-ledger", about = "Track wallets, transactions, and recurring bills")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, default_value = "pocket-ledger.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage wallets
    Wallet {
        #[command(subcommand)]
        command: WalletCommands,
    },
    /// Manage transactions
    Tx {
        #[command(subcommand)]
        command: TxCommands,
    },
    /// Move money between two wallets
    Transfer {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: i64,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        note: Option<String>,
    },
    /// Manage recurring rules
    Recurring {
        #[command(subcommand)]
        command: RecurringCommands,
    },
    /// Manage category budgets
    Budget {
        #[command(subcommand)]
        command: BudgetCommands,
    },
    /// Show the daily disposable-spend figure
    SafeToSpend,
    /// Audit cached balances against the transaction log
    Reconcile {
        /// Rewrite drifted balances instead of only reporting them
        #[arg(long)]
        repair: bool,
    },
}

#[derive(Subcommand)]
enum WalletCommands {
    /// Create a wallet with an opening balance
    Add {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "cash")]
        kind: String,
        #[arg(long, default_value = "IDR")]
        currency: String,
        #[arg(long, default_value_t = 0)]
        initial: i64,
    },
    /// List wallets
    List,
    /// Freeze a wallet against further writes
    Archive {
        #[arg(long)]
        id: String,
    },
    /// Reactivate an archived wallet
    Unarchive {
        #[arg(long)]
        id: String,
    },
    /// Soft-delete a wallet; its transactions are kept
    Remove {
        #[arg(long)]
        id: String,
    },
    /// Correct a balance via a synthetic adjustment transaction
    SetBalance {
        #[arg(long)]
        id: String,
        #[arg(long)]
        balance: i64,
        #[arg(long)]
        note: Option<String>,
    },
}

#[derive(Subcommand)]
enum TxCommands {
    /// Record an income or expense
    Add {
        #[arg(long)]
        wallet: String,
        #[arg(long)]
        amount: i64,
        #[arg(long)]
        kind: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        classification: Option<String>,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        note: Option<String>,
    },
    /// Edit fields of an existing transaction
    Edit {
        #[arg(long)]
        id: String,
        #[arg(long)]
        wallet: Option<String>,
        #[arg(long)]
        amount: Option<i64>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        classification: Option<String>,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        note: Option<String>,
    },
    /// Delete a transaction, undoing its balance effect
    Rm {
        #[arg(long)]
        id: String,
    },
    /// List transactions
    List,
}

#[derive(Subcommand)]
enum RecurringCommands {
    /// Schedule a recurring income or expense
    Add {
        #[arg(long)]
        wallet: String,
        #[arg(long)]
        amount: i64,
        #[arg(long)]
        kind: String,
        #[arg(long)]
        frequency: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        classification: Option<String>,
        #[arg(long)]
        note: Option<String>,
    },
    /// List recurring rules
    List,
    /// Deactivate a rule, keeping its history
    Pause {
        #[arg(long)]
        id: String,
    },
    /// Reactivate a rule
    Resume {
        #[arg(long)]
        id: String,
    },
    /// Materialize every rule due today
    Process {
        #[arg(long)]
        date: Option<String>,
    },
}

#[derive(Subcommand)]
enum BudgetCommands {
    /// Set the monthly limit for a category
    Set {
        #[arg(long)]
        category: String,
        #[arg(long)]
        limit: i64,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        month: Option<u32>,
    },
    /// Show spend against each budget for a month
    Status {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        month: Option<u32>,
    },
}

fn parse_date(s: Option<&str>) -> Result<NaiveDate, Box<dyn std::error::Error>> {
    match s {
        Some(s) => Ok(NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| format!("invalid date (expected YYYY-MM-DD): {s}"))?),
        None => Ok(Local::now().date_naive()),
    }
}

fn parse_tx_kind(s: &str) -> Result<TransactionKind, String> {
    match s {
        "income" => Ok(TransactionKind::Income),
        "expense" => Ok(TransactionKind::Expense),
        _ => Err(format!("unknown transaction kind: {s} (use income or expense)")),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = config::load(&cli.config)?;
    let owner = cfg.owner.as_str();

    let file_store = FileStore::open(&cfg.store.data_path)?;
    let store = RetryingStore::new(
        file_store,
        cfg.store.max_retries.unwrap_or(3),
        Duration::from_millis(cfg.store.retry_base_ms.unwrap_or(50)),
    );
    let engine = LedgerEngine::new(store);

    match cli.command {
        Commands::Wallet { command } => match command {
            WalletCommands::Add {
                name,
                kind,
                currency,
                initial,
            } => {
                let wallet = Wallet::new(owner, name, kind.parse::<WalletKind>()?, currency, initial);
                println!("{} {}", wallet.id, wallet.name);
                engine.store().insert_wallet(wallet)?;
            }
            WalletCommands::List => {
                let mut wallets = engine.store().wallets_for_owner(owner)?;
                wallets.sort_by(|a, b| a.name.cmp(&b.name));
                for w in wallets {
                    println!(
                        "{} | {} | {} | {} {} | {:?}",
                        w.id,
                        w.label(),
                        w.kind,
                        w.balance,
                        w.currency,
                        w.state
                    );
                }
            }
            WalletCommands::Archive { id } => {
                engine
                    .store()
                    .set_wallet_state(&id.parse::<WalletId>()?, WalletState::Archived)?;
            }
            WalletCommands::Unarchive { id } => {
                engine
                    .store()
                    .set_wallet_state(&id.parse::<WalletId>()?, WalletState::Active)?;
            }
            WalletCommands::Remove { id } => {
                engine
                    .store()
                    .set_wallet_state(&id.parse::<WalletId>()?, WalletState::Deleted)?;
            }
            WalletCommands::SetBalance { id, balance, note } => {
                let today = Local::now().date_naive();
                match engine.set_balance(id.parse::<WalletId>()?, balance, today, note)? {
                    Some(tx) => println!("adjusted by {} ({})", tx.amount, tx.id),
                    None => println!("balance already matches"),
                }
            }
        },
        Commands::Tx { command } => match command {
            TxCommands::Add {
                wallet,
                amount,
                kind,
                category,
                classification,
                date,
                note,
            } => {
                let draft = TransactionDraft {
                    owner: owner.to_string(),
                    wallet_id: wallet.parse::<WalletId>()?,
                    amount,
                    kind: parse_tx_kind(&kind)?,
                    category,
                    classification: classification
                        .map(|c| c.parse::<Classification>())
                        .transpose()?,
                    date: parse_date(date.as_deref())?,
                    note,
                };
                let tx = engine.create(draft)?;
                println!("{}", tx.id);
            }
            TxCommands::Edit {
                id,
                wallet,
                amount,
                category,
                classification,
                date,
                note,
            } => {
                let id = id.parse::<TransactionId>()?;
                let old = engine.store().transaction(&id)?;
                let draft = TransactionDraft {
                    owner: old.owner.clone(),
                    wallet_id: match wallet {
                        Some(w) => w.parse::<WalletId>()?,
                        None => old.wallet_id,
                    },
                    amount: amount.unwrap_or(old.amount),
                    kind: old.kind,
                    category: category.or(old.category),
                    classification: match classification {
                        Some(c) => Some(c.parse::<Classification>()?),
                        None => old.classification,
                    },
                    date: match date {
                        Some(d) => parse_date(Some(&d))?,
                        None => old.date,
                    },
                    note: note.or(old.note),
                };
                engine.update(id, draft)?;
            }
            TxCommands::Rm { id } => {
                engine.delete(id.parse::<TransactionId>()?)?;
            }
            TxCommands::List => {
                let mut transactions = engine.store().transactions_for_owner(owner)?;
                transactions.sort_by_key(|tx| tx.date);
                for tx in transactions {
                    println!(
                        "{} | {} | {} | {} | {} | {}",
                        tx.id,
                        tx.date,
                        tx.kind,
                        tx.amount,
                        tx.category.as_deref().unwrap_or("-"),
                        tx.note.as_deref().unwrap_or("-")
                    );
                }
            }
        },
        Commands::Transfer {
            from,
            to,
            amount,
            date,
            note,
        } => {
            let draft = TransactionDraft {
                owner: owner.to_string(),
                wallet_id: from.parse::<WalletId>()?,
                amount,
                kind: TransactionKind::Transfer {
                    target: to.parse::<WalletId>()?,
                },
                category: None,
                classification: None,
                date: parse_date(date.as_deref())?,
                note,
            };
            let tx = engine.create(draft)?;
            println!("{}", tx.id);
        }
        Commands::Recurring { command } => match command {
            RecurringCommands::Add {
                wallet,
                amount,
                kind,
                frequency,
                start,
                category,
                classification,
                note,
            } => {
                let rule = RecurringRule::new(
                    owner,
                    wallet.parse::<WalletId>()?,
                    amount,
                    kind.parse::<RuleKind>()?,
                    category,
                    classification
                        .map(|c| c.parse::<Classification>())
                        .transpose()?,
                    frequency.parse::<Frequency>()?,
                    parse_date(Some(&start))?,
                    note,
                );
                println!("{}", rule.id);
                engine.store().insert_rule(rule)?;
            }
            RecurringCommands::List => {
                let mut rules = engine.store().rules_for_owner(owner)?;
                rules.sort_by_key(|r| r.next_execution_date);
                for r in rules {
                    println!(
                        "{} | {} | {} | {} | next {} | {}",
                        r.id,
                        r.kind,
                        r.amount,
                        r.frequency,
                        r.next_execution_date,
                        if r.active { "active" } else { "paused" }
                    );
                }
            }
            RecurringCommands::Pause { id } => {
                engine.store().set_rule_active(&id.parse::<RuleId>()?, false)?;
            }
            RecurringCommands::Resume { id } => {
                engine.store().set_rule_active(&id.parse::<RuleId>()?, true)?;
            }
            RecurringCommands::Process { date } => {
                let today = parse_date(date.as_deref())?;
                let report = recurring::process_due(&engine, owner, today)?;
                println!(
                    "materialized {} transaction(s), {} skipped, {} failed",
                    report.materialized_count(),
                    report.skipped,
                    report.failures.len()
                );
                for (rule_id, error) in &report.failures {
                    eprintln!("rule {rule_id} failed: {error}");
                }
            }
        },
        Commands::Budget { command } => match command {
            BudgetCommands::Set {
                category,
                limit,
                year,
                month,
            } => {
                let today = Local::now().date_naive();
                engine.store().upsert_budget(CategoryBudget {
                    owner: owner.to_string(),
                    category,
                    year: year.unwrap_or_else(|| chrono::Datelike::year(&today)),
                    month: month.unwrap_or_else(|| chrono::Datelike::month(&today)),
                    limit,
                })?;
            }
            BudgetCommands::Status { year, month } => {
                let today = Local::now().date_naive();
                let year = year.unwrap_or_else(|| chrono::Datelike::year(&today));
                let month = month.unwrap_or_else(|| chrono::Datelike::month(&today));
                let budgets = engine.store().budgets_for_month(owner, year, month)?;
                let transactions = engine.store().transactions_for_owner(owner)?;
                for b in budgets {
                    let spent = budget::spent_in_category(&transactions, &b.category, year, month);
                    println!(
                        "{} | limit {} | spent {} | remaining {}",
                        b.category,
                        b.limit,
                        spent,
                        b.remaining(&transactions)
                    );
                }
            }
        },
        Commands::SafeToSpend => {
            let wallets = engine.store().wallets_for_owner(owner)?;
            let rules = engine.store().rules_for_owner(owner)?;
            let figure = budget::safe_to_spend(&wallets, &rules, Local::now().date_naive());
            println!(
                "spendable {} | reserved {} | {} day(s) left | {} per day",
                figure.spendable, figure.reserved, figure.days_left, figure.per_day
            );
        }
        Commands::Reconcile { repair } => {
            let drifts = if repair {
                reconcile::repair(engine.store(), owner)?
            } else {
                reconcile::audit(engine.store(), owner)?
            };
            if drifts.is_empty() {
                println!("all balances consistent");
            }
            for drift in drifts {
                println!(
                    "{} | cached {} | computed {} | delta {}",
                    drift.wallet_id,
                    drift.cached,
                    drift.computed,
                    drift.delta()
                );
            }
        }
    }

    Ok(())
}
