use super::{resolve_account, CommandDefinition};
use crate::cli::core::{usage, CommandResult, ShellContext};
use crate::cli::output;
use crate::currency::{CurrencyCode, Money};
use crate::ledger::AccountKind;

pub(crate) fn definitions() -> Vec<CommandDefinition> {
    vec![
        CommandDefinition::new(
            "account-add",
            "Open an account",
            "account-add <name> <cash|bank|credit|other> [opening] [currency]",
            cmd_account_add,
        ),
        CommandDefinition::new("accounts", "List accounts with balances", "accounts", cmd_accounts),
        CommandDefinition::new(
            "account-archive",
            "Archive an account, keeping its history",
            "account-archive <account>",
            cmd_account_archive,
        ),
    ]
}

fn cmd_account_add(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    const USAGE: &str = "account-add <name> <cash|bank|credit|other> [opening] [currency]";
    let (name, kind) = match args {
        [name, kind, ..] => (*name, kind.parse::<AccountKind>()?),
        _ => return Err(usage(USAGE)),
    };
    let currency = args
        .get(3)
        .map(|code| CurrencyCode::new(*code))
        .unwrap_or_else(|| context.manager.config().base_currency.clone());
    let opening = match args.get(2) {
        Some(text) => Money::parse(text, currency)?,
        None => Money::zero(currency),
    };
    let account = context.manager.open_account(name, kind, opening)?;
    output::success(format!(
        "Account `{}` opened ({}, {}).",
        account.name, account.kind, account.opening_balance
    ));
    Ok(())
}

fn cmd_accounts(context: &mut ShellContext, _args: &[&str]) -> CommandResult {
    let accounts = context.manager.accounts();
    if accounts.is_empty() {
        output::info("No accounts yet. Use `account-add` to open one.");
        return Ok(());
    }
    output::section("Accounts");
    for account in accounts {
        let balance = context.manager.closing_balance(account.id)?;
        let status = if account.archived { " (archived)" } else { "" };
        output::row(format!(
            "{:<20} {:<7} {:>16}{status}",
            account.name,
            account.kind.to_string(),
            balance.to_string()
        ));
    }
    Ok(())
}

fn cmd_account_archive(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let [reference] = args else {
        return Err(usage("account-archive <account>"));
    };
    let account = resolve_account(context, reference)?;
    let archived = context.manager.archive_account(account.id, account.version)?;
    output::success(format!("Account `{}` archived.", archived.name));
    Ok(())
}
