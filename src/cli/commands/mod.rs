use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};

pub mod account;
pub mod category;
pub mod import;
pub mod report;
pub mod system;
pub mod transaction;

use crate::cli::core::{CommandError, CommandResult, ShellContext};
use crate::ledger::{day_start, Account};

pub(crate) fn all_definitions() -> Vec<CommandDefinition> {
    let mut commands = Vec::new();
    commands.extend(system::definitions());
    commands.extend(account::definitions());
    commands.extend(category::definitions());
    commands.extend(transaction::definitions());
    commands.extend(import::definitions());
    commands.extend(report::definitions());
    commands
}

pub type CommandHandler = fn(&mut ShellContext, &[&str]) -> CommandResult;

#[derive(Clone)]
pub struct CommandDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub usage: &'static str,
    pub handler: CommandHandler,
}

impl CommandDefinition {
    pub const fn new(
        name: &'static str,
        description: &'static str,
        usage: &'static str,
        handler: CommandHandler,
    ) -> Self {
        Self {
            name,
            description,
            usage,
            handler,
        }
    }
}

pub struct CommandRegistry {
    commands: HashMap<&'static str, CommandDefinition>,
    order: Vec<&'static str>,
}

impl CommandRegistry {
    pub fn new(definitions: Vec<CommandDefinition>) -> Self {
        let mut commands = HashMap::new();
        let mut order = Vec::new();
        for definition in definitions {
            order.push(definition.name);
            commands.insert(definition.name, definition);
        }
        Self { commands, order }
    }

    pub fn get(&self, name: &str) -> Option<&CommandDefinition> {
        self.commands.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandDefinition> {
        self.order
            .iter()
            .filter_map(move |name| self.commands.get(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.order.iter().copied()
    }
}

pub(crate) fn parse_date(text: &str) -> Result<NaiveDate, CommandError> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .map_err(|_| CommandError::InvalidArguments(format!("`{text}` is not a YYYY-MM-DD date")))
}

/// Last instant of `date`.
pub(crate) fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    match date.succ_opt() {
        Some(next) => day_start(next) - chrono::Duration::nanoseconds(1),
        None => DateTime::<Utc>::MAX_UTC,
    }
}

pub(crate) fn resolve_account(context: &ShellContext, reference: &str) -> Result<Account, CommandError> {
    context
        .manager
        .store()
        .resolve_account(reference)
        .map_err(|_| CommandError::InvalidArguments(format!("Unknown account `{reference}`.")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_keeps_definition_order() {
        let registry = CommandRegistry::new(all_definitions());
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(names.first(), Some(&"version"));
        assert!(registry.get("import").is_some());
        assert_eq!(registry.iter().count(), names.len());
    }

    #[test]
    fn end_of_day_is_inclusive() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        let last = end_of_day(date);
        assert_eq!(last.date_naive(), date);
        assert!(last + chrono::Duration::nanoseconds(1) == day_start(date.succ_opt().unwrap()));
    }
}
