use chrono::{Datelike, NaiveDate, Utc};

use super::{end_of_day, parse_date, resolve_account, CommandDefinition};
use crate::cli::core::{usage, CommandError, CommandResult, ShellContext};
use crate::cli::output;
use crate::ledger::{BudgetPeriod, PeriodKey};

pub(crate) fn definitions() -> Vec<CommandDefinition> {
    vec![
        CommandDefinition::new(
            "balance",
            "Show an account balance, optionally as of the end of a date",
            "balance <account> [date]",
            cmd_balance,
        ),
        CommandDefinition::new(
            "spend",
            "Spending by category for a month",
            "spend [YYYY-MM]",
            cmd_spend,
        ),
        CommandDefinition::new(
            "budgets",
            "Budget status for the periods containing a date",
            "budgets [date]",
            cmd_budgets,
        ),
        CommandDefinition::new(
            "networth",
            "Net worth at the close of each period",
            "networth <from> <to> [weekly|monthly|quarterly|yearly]",
            cmd_networth,
        ),
        CommandDefinition::new(
            "activity",
            "Inflow and outflow of an account for a month",
            "activity <account> [YYYY-MM]",
            cmd_activity,
        ),
    ]
}

fn parse_month(arg: Option<&&str>) -> Result<PeriodKey, CommandError> {
    let date = match arg {
        Some(text) => NaiveDate::parse_from_str(&format!("{text}-01"), "%Y-%m-%d")
            .map_err(|_| CommandError::InvalidArguments(format!("`{text}` is not a YYYY-MM month")))?,
        None => {
            let today = Utc::now().date_naive();
            today.with_day(1).unwrap_or(today)
        }
    };
    Ok(PeriodKey::containing(BudgetPeriod::Monthly, date))
}

fn cmd_balance(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let Some(reference) = args.first() else {
        return Err(usage("balance <account> [date]"));
    };
    let account = resolve_account(context, reference)?;
    match args.get(1) {
        Some(date) => {
            let date = parse_date(date)?;
            let balance = context
                .manager
                .reports()
                .balance_as_of(account.id, end_of_day(date))?;
            output::info(format!("{} balance as of {date}: {balance}", account.name));
        }
        None => {
            let balance = context.manager.closing_balance(account.id)?;
            output::info(format!("{} balance: {balance}", account.name));
        }
    }
    Ok(())
}

fn cmd_spend(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let month = parse_month(args.first())?;
    let currency = context.manager.config().base_currency.clone();
    let report = context.manager.reports().spend_by_category(month.range(), &currency)?;
    output::section(format!("Spending {month}"));
    if report.categories.is_empty() {
        output::info("No spending recorded.");
        return Ok(());
    }
    for entry in &report.categories {
        output::row(format!(
            "{:<28} {:>14}  ({} txn)",
            entry.name,
            entry.spent.to_string(),
            entry.transaction_count
        ));
    }
    output::row(format!("{:<28} {:>14}", "Total", report.total.to_string()));
    if report.excluded_foreign > 0 {
        output::warning(format!(
            "{} transaction(s) in other currencies were left out.",
            report.excluded_foreign
        ));
    }
    Ok(())
}

fn cmd_budgets(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let date = match args.first() {
        Some(text) => parse_date(text)?,
        None => Utc::now().date_naive(),
    };
    let statuses = context.manager.budget_statuses(date)?;
    if statuses.is_empty() {
        output::info("No budgets configured. Use `budget-set` to add one.");
        return Ok(());
    }
    output::section(format!("Budgets on {date}"));
    for status in statuses {
        let line = format!(
            "{:<20} {:<8} spent {:>12} of {:>12}, {} left",
            status.name,
            status.period.to_string(),
            status.consumed.to_string(),
            status.limit.to_string(),
            status.remaining
        );
        if status.over_budget {
            output::warning(line);
        } else {
            output::row(line);
        }
    }
    Ok(())
}

fn cmd_networth(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    const USAGE: &str = "networth <from> <to> [weekly|monthly|quarterly|yearly]";
    let (from, to) = match args {
        [from, to, ..] => (parse_date(from)?, parse_date(to)?),
        _ => return Err(usage(USAGE)),
    };
    let period = match args.get(2) {
        Some(text) => text.parse::<BudgetPeriod>()?,
        None => BudgetPeriod::Monthly,
    };
    let currency = context.manager.config().base_currency.clone();
    let series = context
        .manager
        .reports()
        .net_worth_series(from, to, period, &currency)?;
    output::section(format!("Net worth ({currency})"));
    for (key, point) in &series {
        output::row(format!("{:<10} {:>16}", key.label(), point.total.to_string()));
    }
    if let Some((_, point)) = series.first() {
        if point.excluded_accounts > 0 {
            output::warning(format!(
                "{} account(s) in other currencies were left out.",
                point.excluded_accounts
            ));
        }
    }
    Ok(())
}

fn cmd_activity(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let Some(reference) = args.first() else {
        return Err(usage("activity <account> [YYYY-MM]"));
    };
    let account = resolve_account(context, reference)?;
    let month = parse_month(args.get(1))?;
    let activity = context
        .manager
        .reports()
        .account_activity(account.id, month.range())?;
    output::section(format!("{} {month}", account.name));
    output::row(format!("opening  {:>14}", activity.opening.to_string()));
    output::row(format!("inflow   {:>14}", activity.inflow.to_string()));
    output::row(format!("outflow  {:>14}", activity.outflow.to_string()));
    output::row(format!("closing  {:>14}", activity.closing.to_string()));
    output::row(format!("{} transaction(s)", activity.transaction_count));
    Ok(())
}
