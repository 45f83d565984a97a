use std::path::Path;

use super::CommandDefinition;
use crate::cli::core::{usage, CommandError, CommandResult, ShellContext};
use crate::cli::output;
use crate::errors::LedgerError;
use crate::reconcile::{ReconcileConflict, Resolution};

pub(crate) fn definitions() -> Vec<CommandDefinition> {
    vec![
        CommandDefinition::new(
            "import",
            "Reconcile a JSON import file into the ledger",
            "import <file.json>",
            cmd_import,
        ),
        CommandDefinition::new(
            "conflicts",
            "List conflicts left by the last import",
            "conflicts",
            cmd_conflicts,
        ),
        CommandDefinition::new(
            "resolve",
            "Resolve a pending import conflict",
            "resolve <number> <accept|keep>",
            cmd_resolve,
        ),
    ]
}

fn cmd_import(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let [path] = args else {
        return Err(usage("import <file.json>"));
    };
    let report = match context.manager.import_file(Path::new(path)) {
        Ok(report) => report,
        Err(LedgerError::BatchInterrupted { batch, processed, source }) => {
            output::warning(format!(
                "Import `{batch}` stopped after {processed} records: {source}. Run it again to resume."
            ));
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    output::section(format!("Import {}", report.batch_id));
    if report.resumed_from > 0 {
        output::info(format!("Resumed at record {}.", report.resumed_from));
    }
    let totals = &report.totals;
    output::row(format!("matched    : {} ({} refreshed)", totals.matched, totals.refreshed));
    output::row(format!("inserted   : {}", totals.inserted));
    output::row(format!("conflicted : {}", totals.conflicted));
    output::row(format!("writes     : {}", report.ledger_writes));

    context.pending_conflicts = report.conflicts().into_iter().cloned().collect();
    if !context.pending_conflicts.is_empty() {
        output::warning(format!(
            "{} record(s) conflict with local edits. Use `conflicts` and `resolve`.",
            context.pending_conflicts.len()
        ));
    }
    Ok(())
}

fn describe(number: usize, conflict: &ReconcileConflict) {
    output::row(format!(
        "#{number} record {} of `{}` vs transaction {}",
        conflict.index, conflict.batch_id, conflict.transaction_id
    ));
    for diff in &conflict.differences {
        output::row(format!("    {:<9} local `{}` imported `{}`", diff.field.to_string(), diff.local, diff.imported));
    }
}

fn cmd_conflicts(context: &mut ShellContext, _args: &[&str]) -> CommandResult {
    if context.pending_conflicts.is_empty() {
        output::info("No pending conflicts.");
        return Ok(());
    }
    output::section("Pending conflicts");
    for (index, conflict) in context.pending_conflicts.iter().enumerate() {
        describe(index + 1, conflict);
    }
    Ok(())
}

fn cmd_resolve(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    const USAGE: &str = "resolve <number> <accept|keep>";
    let [number, choice] = args else {
        return Err(usage(USAGE));
    };
    let position = number
        .parse::<usize>()
        .ok()
        .filter(|n| (1..=context.pending_conflicts.len()).contains(n))
        .ok_or_else(|| CommandError::InvalidArguments(format!("No pending conflict #{number}.")))?;
    let resolution = match choice.to_ascii_lowercase().as_str() {
        "accept" => Resolution::AcceptImported,
        "keep" => Resolution::KeepLocal,
        _ => return Err(usage(USAGE)),
    };

    let conflict = context.pending_conflicts.remove(position - 1);
    match context.manager.resolve_conflict(&conflict, resolution) {
        Ok(txn) => {
            output::success(format!("Transaction {} kept at version {}.", txn.id, txn.version));
            Ok(())
        }
        Err(err) => {
            context.pending_conflicts.insert(position - 1, conflict);
            Err(err.into())
        }
    }
}
