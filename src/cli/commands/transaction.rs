use chrono::Utc;
use uuid::Uuid;

use super::{parse_date, resolve_account, CommandDefinition};
use crate::cli::core::{usage, CommandError, CommandResult, ShellContext};
use crate::cli::output;
use crate::currency::Money;
use crate::ledger::{day_start, NewTransaction, TimeRange, Transaction};
use crate::reconcile::import::parse_timestamp;

pub(crate) fn definitions() -> Vec<CommandDefinition> {
    vec![
        CommandDefinition::new(
            "record",
            "Record a transaction (negative amounts are spending)",
            "record <account> <amount> [date|timestamp] [memo]",
            cmd_record,
        ),
        CommandDefinition::new(
            "recategorize",
            "Move a transaction to another category",
            "recategorize <transaction-id> <category|none>",
            cmd_recategorize,
        ),
        CommandDefinition::new(
            "delete",
            "Soft-delete a transaction",
            "delete <transaction-id>",
            cmd_delete,
        ),
        CommandDefinition::new(
            "history",
            "List an account's transactions with running balances",
            "history <account> [from] [to]",
            cmd_history,
        ),
    ]
}

fn parse_id(text: &str) -> Result<Uuid, CommandError> {
    Uuid::parse_str(text.trim())
        .map_err(|_| CommandError::InvalidArguments(format!("`{text}` is not a transaction id")))
}

fn current(context: &ShellContext, text: &str) -> Result<Transaction, CommandError> {
    Ok(context.manager.transaction(parse_id(text)?)?)
}

fn cmd_record(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    const USAGE: &str = "record <account> <amount> [date|timestamp] [memo]";
    let (reference, amount) = match args {
        [reference, amount, ..] => (*reference, *amount),
        _ => return Err(usage(USAGE)),
    };
    let account = resolve_account(context, reference)?;
    let amount = Money::parse(amount, account.currency.clone())?;
    let timestamp = match args.get(2) {
        Some(text) => parse_timestamp(text)
            .ok_or_else(|| CommandError::InvalidArguments(format!("`{text}` is not a date")))?,
        None => Utc::now(),
    };
    let memo = args.get(3..).map(|rest| rest.join(" ")).unwrap_or_default();

    let txn = context
        .manager
        .record(NewTransaction::new(account.id, amount, timestamp).with_memo(memo))?;
    let category = txn
        .category_id
        .and_then(|id| context.manager.store().category_tree().path_name(id))
        .map(|path| format!(" in `{path}`"))
        .unwrap_or_default();
    output::success(format!("Recorded {} on `{}`{category}.", txn.amount, account.name));
    output::row(format!("id: {}", txn.id));
    Ok(())
}

fn cmd_recategorize(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let [id, category] = args else {
        return Err(usage("recategorize <transaction-id> <category|none>"));
    };
    let txn = current(context, id)?;
    let category_id = if category.eq_ignore_ascii_case("none") {
        None
    } else {
        let found = context
            .manager
            .store()
            .category_by_name(category)
            .ok_or_else(|| CommandError::InvalidArguments(format!("Unknown category `{category}`.")))?;
        Some(found.id)
    };
    let updated = context.manager.recategorize(txn.id, category_id, txn.version)?;
    output::success(format!("Transaction {} is now at version {}.", updated.id, updated.version));
    Ok(())
}

fn cmd_delete(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let [id] = args else {
        return Err(usage("delete <transaction-id>"));
    };
    let txn = current(context, id)?;
    context.manager.soft_delete(txn.id, txn.version)?;
    output::success(format!("Transaction {} deleted.", txn.id));
    Ok(())
}

fn cmd_history(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let Some(reference) = args.first() else {
        return Err(usage("history <account> [from] [to]"));
    };
    let account = resolve_account(context, reference)?;
    let range = match (args.get(1), args.get(2)) {
        (Some(from), Some(to)) => TimeRange::days(parse_date(from)?, parse_date(to)?),
        (Some(from), None) => TimeRange::from(day_start(parse_date(from)?)),
        _ => TimeRange::all(),
    };
    let rows = context.manager.balances().running_balances(account.id, range)?;
    output::section(format!("History of {}", account.name));
    if rows.is_empty() {
        output::info("No transactions in range.");
        return Ok(());
    }
    for row in rows {
        output::row(format!(
            "{}  {:>14}  {:>14}  {}",
            row.timestamp.format("%Y-%m-%d %H:%M"),
            row.amount.to_string(),
            row.balance.to_string(),
            row.transaction_id
        ));
    }
    Ok(())
}
