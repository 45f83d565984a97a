use std::io;

use strsim::levenshtein;
use thiserror::Error;

use crate::config::ConfigManager;
use crate::core::LedgerManager;
use crate::errors::LedgerError;
use crate::reconcile::ReconcileConflict;

use super::commands::{all_definitions, CommandDefinition, CommandRegistry};
use super::output;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliMode {
    Interactive,
    Script,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Exit,
}

/// Failures that end the shell.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] LedgerError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Invalid input: {0}")]
    Input(String),
}

/// Failures of a single command; reported and the shell carries on.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0}")]
    InvalidArguments(String),
    #[error(transparent)]
    Core(#[from] LedgerError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("exit requested")]
    ExitRequested,
}

pub type CommandResult = Result<(), CommandError>;

pub(crate) fn usage(text: &str) -> CommandError {
    CommandError::InvalidArguments(format!("Usage: {text}"))
}

pub struct ShellContext {
    pub mode: CliMode,
    pub manager: LedgerManager,
    pub registry: CommandRegistry,
    pub running: bool,
    pub last_command: Option<String>,
    /// Conflicts left by the most recent `import`, awaiting `resolve`.
    pub pending_conflicts: Vec<ReconcileConflict>,
}

impl ShellContext {
    pub fn new(mode: CliMode) -> Result<Self, CliError> {
        let configs = ConfigManager::new()?;
        let manager = LedgerManager::from_config(&configs)?;
        Ok(Self::with_manager(mode, manager))
    }

    pub fn with_manager(mode: CliMode, manager: LedgerManager) -> Self {
        Self {
            mode,
            manager,
            registry: CommandRegistry::new(all_definitions()),
            running: true,
            last_command: None,
            pending_conflicts: Vec::new(),
        }
    }

    pub fn prompt(&self) -> String {
        "money> ".to_string()
    }

    pub fn command(&self, name: &str) -> Option<&CommandDefinition> {
        self.registry.get(name)
    }

    pub(crate) fn dispatch(&mut self, command: &str, raw: &str, args: &[&str]) -> Result<LoopControl, CommandError> {
        let Some(definition) = self.registry.get(command) else {
            self.suggest_command(raw);
            return Ok(LoopControl::Continue);
        };
        let handler = definition.handler;
        match handler(self, args) {
            Ok(()) => Ok(LoopControl::Continue),
            Err(CommandError::ExitRequested) => Ok(LoopControl::Exit),
            Err(err) => Err(err),
        }
    }

    pub(crate) fn suggest_command(&self, input: &str) {
        output::warning(format!(
            "Unknown command `{input}`. Type `help` to see available commands."
        ));
        let best = self
            .registry
            .names()
            .map(|name| (levenshtein(name, input), name))
            .min_by_key(|(distance, _)| *distance);
        if let Some((distance, name)) = best {
            if distance <= 3 {
                output::info(format!("Suggestion: `{name}`?"));
            }
        }
    }

    pub(crate) fn report_error(&self, err: CommandError) {
        match err {
            CommandError::ExitRequested => {}
            CommandError::InvalidArguments(message) => {
                output::error(message);
                output::hint("Use `help <command>` for usage details.");
            }
            other => output::error(other),
        }
    }
}
